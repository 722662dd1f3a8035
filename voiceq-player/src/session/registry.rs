//! Session registry with idle eviction
//!
//! Maps a session id to its state, creating on first use. Sessions are not
//! retained forever: a periodic sweep evicts any session with an empty
//! queue, nothing playing, no live connection, and no recent activity.

use crate::playback::stream::{FfmpegStream, StreamFactory};
use crate::session::state::Session;
use crate::source::{MediaFetcher, MetadataLookup, SourceResolver, YtDlpFetcher, YtDlpLookup};
use crate::transport::VoiceGateway;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use voiceq_common::{PlayerConfig, SessionId};

/// Hands out the per-session voice transport
pub trait GatewayProvider: Send + Sync {
    fn gateway(&self, session: SessionId) -> Arc<dyn VoiceGateway>;
}

/// All live sessions, keyed by session id
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    gateways: Arc<dyn GatewayProvider>,
    lookup: Arc<dyn MetadataLookup>,
    fetcher: Arc<dyn MediaFetcher>,
    streams: Arc<dyn StreamFactory>,
    config: Arc<PlayerConfig>,
}

impl SessionRegistry {
    /// Registry with the production lookup/fetch/stream implementations
    pub fn new(gateways: Arc<dyn GatewayProvider>, config: PlayerConfig) -> Self {
        let lookup = Arc::new(YtDlpLookup::new(config.ytdlp()));
        let fetcher = Arc::new(YtDlpFetcher::new(config.ytdlp()));
        let streams = Arc::new(FfmpegStream::new(config.ffmpeg(), config.volume));
        Self::with_components(gateways, lookup, fetcher, streams, config)
    }

    /// Registry over explicit component implementations (tests, embedders)
    pub fn with_components(
        gateways: Arc<dyn GatewayProvider>,
        lookup: Arc<dyn MetadataLookup>,
        fetcher: Arc<dyn MediaFetcher>,
        streams: Arc<dyn StreamFactory>,
        config: PlayerConfig,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            gateways,
            lookup,
            fetcher,
            streams,
            config: Arc::new(config),
        }
    }

    /// Session for the given id, created on first use
    pub async fn get_or_create(&self, id: SessionId) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(&id) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        // Double-check after re-acquiring
        if let Some(session) = sessions.get(&id) {
            return Arc::clone(session);
        }

        debug!(session = %id, "Creating session");
        let resolver = SourceResolver::new(Arc::clone(&self.lookup), self.config.temp_dir());
        let session = Arc::new(Session::new(
            id,
            self.gateways.gateway(id),
            resolver,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.streams),
            Arc::clone(&self.config),
        ));
        sessions.insert(id, Arc::clone(&session));
        session
    }

    /// Session for the given id, if it exists
    pub async fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Evict every idle session once. Returns the number evicted.
    pub async fn sweep_idle(&self) -> usize {
        let idle_after = self.config.idle_timeout();

        let candidates: Vec<Arc<Session>> = {
            let sessions = self.sessions.read().await;
            sessions.values().cloned().collect()
        };

        let mut evicted = 0;
        for session in candidates {
            if !session.is_idle(idle_after).await {
                continue;
            }
            // Re-check under the write lock so an enqueue racing the sweep
            // keeps its session
            let mut sessions = self.sessions.write().await;
            if session.is_idle(idle_after).await {
                sessions.remove(&session.id());
                drop(sessions);
                info!(session = %session.id(), "Evicting idle session");
                session.shut_down().await;
                evicted += 1;
            }
        }
        evicted
    }

    /// Start the periodic idle sweep
    pub fn start_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.sweep_interval();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            // First tick fires immediately; skip it
            tick.tick().await;
            loop {
                tick.tick().await;
                let evicted = registry.sweep_idle().await;
                if evicted > 0 {
                    debug!("Idle sweep evicted {} sessions", evicted);
                }
            }
        })
    }
}
