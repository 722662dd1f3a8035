//! One independent playback session
//!
//! The command boundary: each inbound command (join, play, skip, pause,
//! resume, stop, leave, show-queue) maps to one method here. A session owns
//! its queue, its voice connection, and its lazily started consumer loop.

use crate::playback::{PlayableItem, PlaybackEngine, SessionQueue, StreamFactory};
use crate::source::{MediaFetcher, PlayRequest, SourceResolver};
use crate::temp::TempFileTracker;
use crate::transport::{ConnectionManager, VoiceGateway};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use voiceq_common::events::SessionEvent;
use voiceq_common::{ChannelId, PlayerConfig, Result, SessionId, UserId};

/// Capacity of the per-session event channel
const EVENT_BUFFER: usize = 100;

/// An independent playback context: one queue, one connection, one consumer
pub struct Session {
    id: SessionId,
    queue: Arc<SessionQueue>,
    connection: ConnectionManager,
    gateway: Arc<dyn VoiceGateway>,
    resolver: SourceResolver,
    fetcher: Arc<dyn MediaFetcher>,
    streams: Arc<dyn StreamFactory>,
    temp: Arc<TempFileTracker>,
    config: Arc<PlayerConfig>,
    events: broadcast::Sender<SessionEvent>,
    /// At-most-one-consumer invariant: the running loop's handle
    consumer: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    last_activity: RwLock<Instant>,
}

impl Session {
    pub fn new(
        id: SessionId,
        gateway: Arc<dyn VoiceGateway>,
        resolver: SourceResolver,
        fetcher: Arc<dyn MediaFetcher>,
        streams: Arc<dyn StreamFactory>,
        config: Arc<PlayerConfig>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (shutdown, _) = watch::channel(false);
        Self {
            id,
            queue: Arc::new(SessionQueue::new()),
            connection: ConnectionManager::new(
                Arc::clone(&gateway),
                config.connect_timeout(),
                config.settle_delay(),
            ),
            gateway,
            resolver,
            fetcher,
            streams,
            temp: Arc::new(TempFileTracker::new()),
            config,
            events,
            consumer: Mutex::new(None),
            shutdown,
            last_activity: RwLock::new(Instant::now()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Join (or move to) the requester's voice channel
    pub async fn join(&self, user: UserId) -> Result<ChannelId> {
        self.touch().await;
        let channel = self.connection.ensure(user).await?;
        self.broadcast(SessionEvent::Connected {
            session_id: self.id,
            channel_id: channel,
            timestamp: chrono::Utc::now(),
        });
        Ok(channel)
    }

    /// Resolve a request and enqueue it, connecting to the requester's
    /// channel and lazily starting the consumer loop.
    ///
    /// Connection and resolution failures return synchronously; everything
    /// downstream of the queue is absorbed by the loop.
    pub async fn play(&self, user: UserId, request: PlayRequest) -> Result<PlayableItem> {
        self.touch().await;
        self.connection.ensure(user).await?;

        let item = self.resolver.resolve(request).await?;
        self.enqueue(item.clone()).await;
        Ok(item)
    }

    /// Enqueue an already-resolved item and make sure a consumer runs
    pub async fn enqueue(&self, item: PlayableItem) {
        self.touch().await;
        if item.is_temporary {
            if let Some(path) = item.local_path() {
                self.temp.register(item.id, path.to_path_buf()).await;
            }
        }

        self.broadcast(SessionEvent::TrackEnqueued {
            session_id: self.id,
            item_id: item.id,
            title: item.title.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.queue.enqueue(item).await;
        self.ensure_consumer().await;
    }

    /// Stop the currently streaming item; the next queued item follows
    pub async fn skip(&self) {
        self.touch().await;
        if self.gateway.is_playing().await || self.gateway.is_paused().await {
            debug!(session = %self.id, "Skipping current item");
            self.gateway.stop().await;
        }
    }

    pub async fn pause(&self) {
        self.touch().await;
        if self.gateway.is_playing().await {
            self.gateway.pause().await;
        }
    }

    pub async fn resume(&self) {
        self.touch().await;
        if self.gateway.is_paused().await {
            self.gateway.resume().await;
        }
    }

    /// Drain the pending queue and stop the current stream. The loop stays
    /// alive and accepts new enqueues immediately.
    pub async fn stop(&self) {
        self.touch().await;
        let drained = self.queue.clear().await;
        for item in &drained {
            self.temp.release(item).await;
        }
        if !drained.is_empty() {
            self.broadcast(SessionEvent::QueueCleared {
                session_id: self.id,
                dropped: drained.len(),
                timestamp: chrono::Utc::now(),
            });
        }

        if self.gateway.is_playing().await || self.gateway.is_paused().await {
            self.gateway.stop().await;
        }
        info!(session = %self.id, dropped = drained.len(), "Stopped and cleared");
    }

    /// Leave the voice channel. Items still queued are abandoned by the
    /// loop as they come up, until a new connection is made.
    pub async fn leave(&self) {
        self.touch().await;
        self.connection.teardown().await;
        self.broadcast(SessionEvent::Disconnected {
            session_id: self.id,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Display snapshot: now-playing first, then pending in enqueue order
    pub async fn queue_snapshot(&self) -> Vec<PlayableItem> {
        self.queue.snapshot().await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Spawn the consumer loop unless one is already alive
    async fn ensure_consumer(&self) {
        let mut consumer = self.consumer.lock().await;
        let alive = consumer.as_ref().map(|h| !h.is_finished()).unwrap_or(false);
        if alive {
            return;
        }

        debug!(session = %self.id, "Starting playback loop");
        let engine = PlaybackEngine::new(
            self.id,
            Arc::clone(&self.queue),
            Arc::clone(&self.gateway),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.streams),
            Arc::clone(&self.temp),
            Arc::clone(&self.config),
            self.events.clone(),
            self.shutdown.subscribe(),
        );
        *consumer = Some(engine.spawn());
    }

    /// True when the session holds no work and has been quiet long enough
    /// to evict
    pub async fn is_idle(&self, idle_after: Duration) -> bool {
        if self.gateway.is_connected().await
            || self.gateway.is_playing().await
            || self.gateway.is_paused().await
        {
            return false;
        }
        if !self.queue.is_empty().await || self.queue.now_playing().await.is_some() {
            return false;
        }
        self.last_activity.read().await.elapsed() >= idle_after
    }

    /// Shut the consumer down and release any leftover temporaries.
    /// Called by the registry on eviction.
    pub async fn shut_down(&self) {
        let _ = self.shutdown.send(true);
        self.connection.teardown().await;

        for item in self.queue.clear().await {
            self.temp.release(&item).await;
        }
        if let Some(handle) = self.consumer.lock().await.take() {
            let _ = handle.await;
        }
        self.broadcast(SessionEvent::SessionEvicted {
            session_id: self.id,
            timestamp: chrono::Utc::now(),
        });
    }

    async fn touch(&self) {
        *self.last_activity.write().await = Instant::now();
    }

    fn broadcast(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
