//! Per-session playback loop
//!
//! The single consumer of a session's queue. Each iteration dequeues one
//! item, prepares its payload (downloading remote media to the temp dir),
//! starts the decode stream through the transport sink, and suspends until
//! the stream's terminal signal fires. Fetch and stream failures abandon
//! the item and move on; one bad item never stalls the rest of the queue.

use crate::playback::item::PlayableItem;
use crate::playback::queue::SessionQueue;
use crate::playback::signal::{StreamDone, StreamOutcome};
use crate::playback::stream::StreamFactory;
use crate::source::MediaFetcher;
use crate::temp::TempFileTracker;
use crate::transport::VoiceGateway;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use voiceq_common::events::SessionEvent;
use voiceq_common::{Error, PlayerConfig, Result, SessionId};

/// The per-session consumer. One instance runs per active session; it is
/// started lazily and ends only when the session's shutdown watch flips.
pub struct PlaybackEngine {
    session_id: SessionId,
    queue: Arc<SessionQueue>,
    gateway: Arc<dyn VoiceGateway>,
    fetcher: Arc<dyn MediaFetcher>,
    streams: Arc<dyn StreamFactory>,
    temp: Arc<TempFileTracker>,
    config: Arc<PlayerConfig>,
    events: broadcast::Sender<SessionEvent>,
    shutdown: watch::Receiver<bool>,
}

impl PlaybackEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: SessionId,
        queue: Arc<SessionQueue>,
        gateway: Arc<dyn VoiceGateway>,
        fetcher: Arc<dyn MediaFetcher>,
        streams: Arc<dyn StreamFactory>,
        temp: Arc<TempFileTracker>,
        config: Arc<PlayerConfig>,
        events: broadcast::Sender<SessionEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            session_id,
            queue,
            gateway,
            fetcher,
            streams,
            temp,
            config,
            events,
            shutdown,
        }
    }

    /// Start the loop on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(mut self) {
        info!(session = %self.session_id, "Playback loop started");

        loop {
            self.queue.clear_now_playing().await;

            // A shutdown observed mid-stream has already been consumed from
            // the watch; re-check the flag itself each iteration.
            if *self.shutdown.borrow() {
                break;
            }

            let item = tokio::select! {
                item = self.queue.dequeue() => item,
                _ = self.shutdown.changed() => break,
            };

            self.queue.set_now_playing(item.clone()).await;

            if let Err(err) = self.play_one(&item).await {
                warn!(
                    session = %self.session_id,
                    item = %item.id,
                    title = %item.title,
                    %err,
                    "Item abandoned"
                );
                self.abandon(item, &err).await;
            }
        }

        self.queue.clear_now_playing().await;
        info!(session = %self.session_id, "Playback loop exited");
    }

    /// Drop (or, under the requeue-once policy, re-insert) a failed item
    async fn abandon(&self, item: PlayableItem, err: &Error) {
        let retriable = matches!(err, Error::ConnectFailed(_) | Error::Internal(_));
        if self.config.requeue_once && retriable && !item.requeued {
            debug!(session = %self.session_id, item = %item.id, "Requeueing once");
            self.queue.requeue(item.mark_requeued()).await;
            return;
        }

        self.temp.release(&item).await;
        self.broadcast(SessionEvent::TrackAborted {
            session_id: self.session_id,
            item_id: item.id,
            reason: err.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    /// Run one item from head-of-queue to its terminal transition
    async fn play_one(&mut self, item: &PlayableItem) -> Result<()> {
        // Without a live voice connection there is nothing to stream into
        if !self.gateway.is_connected().await {
            return Err(Error::Internal("no voice connection".to_string()));
        }

        let input = self.prepare(item).await?;

        let stream = self.streams.open(&input)?;
        let done = StreamDone::new();

        // Cleanup is armed before the stream starts, so a sink that fires
        // the terminal signal early cannot leak the temp file
        self.temp.release_after(item.id, done.clone());

        if let Err(e) = self.gateway.play(stream, done.clone()).await {
            // The stream never started, so nothing else will fire the
            // signal; fire it here or the armed watcher parks forever
            done.fire(StreamOutcome::Failed(e.to_string()));
            return Err(Error::StreamConstruction(e.to_string()));
        }

        self.broadcast(SessionEvent::TrackStarted {
            session_id: self.session_id,
            item_id: item.id,
            title: item.title.clone(),
            timestamp: chrono::Utc::now(),
        });

        // Suspend until whichever path terminates the stream fires the
        // signal. On shutdown mid-stream, stop the sink and wait for its
        // terminal signal so cleanup still runs exactly once.
        let outcome = tokio::select! {
            outcome = done.wait() => outcome,
            _ = self.shutdown.changed() => {
                self.gateway.stop().await;
                done.wait().await
            }
        };

        let completed = match outcome {
            StreamOutcome::Completed => true,
            StreamOutcome::Stopped => false,
            StreamOutcome::Failed(reason) => {
                warn!(
                    session = %self.session_id,
                    item = %item.id,
                    "Stream failed: {}",
                    Error::StreamRuntime(reason)
                );
                false
            }
        };

        self.temp.release(item).await;
        self.broadcast(SessionEvent::TrackFinished {
            session_id: self.session_id,
            item_id: item.id,
            completed,
            timestamp: chrono::Utc::now(),
        });

        Ok(())
    }

    /// Resolve the item to a streamable local file, downloading remote
    /// payloads to the temp dir
    async fn prepare(&self, item: &PlayableItem) -> Result<PathBuf> {
        if let Some(path) = item.local_path() {
            if !path.is_file() {
                return Err(Error::FileNotFound(path.to_path_buf()));
            }
            return Ok(path.to_path_buf());
        }

        debug!(session = %self.session_id, item = %item.id, "Fetching remote payload");
        let path = self.fetcher.fetch(item, &self.config.temp_dir()).await?;
        // Downloaded payloads are temporary regardless of the item's own
        // is_temporary flag, which only covers files present at enqueue time
        self.temp.register(item.id, path.clone()).await;
        Ok(path)
    }

    fn broadcast(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
