//! Voice connection lifecycle
//!
//! Establishes or repairs the session's voice connection with a bounded
//! connect timeout and a post-connect stability re-check. State transitions:
//! Disconnected -> Connecting -> Connected -> (Moving -> Connected)
//! -> Disconnected.

use crate::transport::{TransportError, VoiceGateway};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use voiceq_common::{ChannelId, Error, Result, UserId};

/// Connection state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected(ChannelId),
    Moving,
}

/// Per-session connection manager over the opaque transport
pub struct ConnectionManager {
    gateway: Arc<dyn VoiceGateway>,
    state: RwLock<ConnectionState>,
    connect_timeout: Duration,
    settle_delay: Duration,
}

impl ConnectionManager {
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        connect_timeout: Duration,
        settle_delay: Duration,
    ) -> Self {
        Self {
            gateway,
            state: RwLock::new(ConnectionState::Disconnected),
            connect_timeout,
            settle_delay,
        }
    }

    /// Current state-machine position
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Ensure the session is connected to the requester's channel.
    ///
    /// Fails with `NotInVoiceChannel` when the requester is not reachable.
    /// Already connected to the right channel is a no-op; connected elsewhere
    /// moves; disconnected connects under the configured timeout, then
    /// re-verifies connectivity after a settle delay.
    pub async fn ensure(&self, user: UserId) -> Result<ChannelId> {
        let target = self
            .gateway
            .user_channel(user)
            .await
            .ok_or(Error::NotInVoiceChannel)?;

        if self.gateway.is_connected().await {
            if self.gateway.current_channel().await == Some(target) {
                *self.state.write().await = ConnectionState::Connected(target);
                return Ok(target);
            }
            return self.move_to(target).await;
        }

        self.connect(target).await
    }

    async fn move_to(&self, target: ChannelId) -> Result<ChannelId> {
        debug!("Moving voice connection to channel {}", target);
        *self.state.write().await = ConnectionState::Moving;

        match self.gateway.move_to(target).await {
            Ok(()) | Err(TransportError::AlreadyConnected) => {
                *self.state.write().await = ConnectionState::Connected(target);
                info!("Moved to channel {}", target);
                Ok(target)
            }
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                Err(Error::ConnectFailed(e.to_string()))
            }
        }
    }

    async fn connect(&self, target: ChannelId) -> Result<ChannelId> {
        debug!("Connecting to channel {}", target);
        *self.state.write().await = ConnectionState::Connecting;

        let attempt = timeout(self.connect_timeout, self.gateway.connect(target)).await;
        match attempt {
            Err(_elapsed) => {
                warn!(
                    "Connect to channel {} exceeded {:?}, tearing down",
                    target, self.connect_timeout
                );
                self.force_teardown().await;
                Err(Error::ConnectTimeout)
            }
            // A concurrent ensure won the race; the connection exists.
            Ok(Err(TransportError::AlreadyConnected)) | Ok(Ok(())) => {
                self.settle_check(target).await
            }
            Ok(Err(e)) => {
                *self.state.write().await = ConnectionState::Disconnected;
                Err(Error::ConnectFailed(e.to_string()))
            }
        }
    }

    /// Brief settle delay, then re-verify the connection actually held
    async fn settle_check(&self, target: ChannelId) -> Result<ChannelId> {
        tokio::time::sleep(self.settle_delay).await;

        if !self.gateway.is_connected().await {
            warn!("Connection to channel {} dropped during settle", target);
            self.force_teardown().await;
            return Err(Error::ConnectUnstable);
        }

        *self.state.write().await = ConnectionState::Connected(target);
        info!("Connected to channel {}", target);
        Ok(target)
    }

    /// Idempotent disconnect; safe when already disconnected
    pub async fn teardown(&self) {
        self.force_teardown().await;
    }

    async fn force_teardown(&self) {
        if let Err(e) = self.gateway.disconnect(true).await {
            // A failed forced disconnect leaves nothing more to do
            debug!("Forced disconnect reported: {}", e);
        }
        *self.state.write().await = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{AudioStream, StreamDone};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Scripted gateway for state-machine tests
    struct ScriptedGateway {
        users: Mutex<HashMap<UserId, ChannelId>>,
        connected: Mutex<Option<ChannelId>>,
        /// Connect attempts never complete (timeout path)
        hang_connect: AtomicBool,
        /// Connection drops right after connect (settle path)
        drop_after_connect: AtomicBool,
        fail_connect: Mutex<Option<TransportError>>,
    }

    impl ScriptedGateway {
        fn new() -> Self {
            Self {
                users: Mutex::new(HashMap::new()),
                connected: Mutex::new(None),
                hang_connect: AtomicBool::new(false),
                drop_after_connect: AtomicBool::new(false),
                fail_connect: Mutex::new(None),
            }
        }

        fn put_user(&self, user: UserId, channel: ChannelId) {
            self.users.lock().unwrap().insert(user, channel);
        }
    }

    #[async_trait]
    impl VoiceGateway for ScriptedGateway {
        async fn user_channel(&self, user: UserId) -> Option<ChannelId> {
            self.users.lock().unwrap().get(&user).copied()
        }

        async fn current_channel(&self) -> Option<ChannelId> {
            *self.connected.lock().unwrap()
        }

        async fn connect(&self, channel: ChannelId) -> std::result::Result<(), TransportError> {
            if self.hang_connect.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if let Some(err) = self.fail_connect.lock().unwrap().take() {
                if matches!(err, TransportError::AlreadyConnected) {
                    // The racing winner did establish the connection
                    *self.connected.lock().unwrap() = Some(channel);
                }
                return Err(err);
            }
            *self.connected.lock().unwrap() = Some(channel);
            Ok(())
        }

        async fn move_to(&self, channel: ChannelId) -> std::result::Result<(), TransportError> {
            let mut connected = self.connected.lock().unwrap();
            if connected.is_none() {
                return Err(TransportError::NotConnected);
            }
            *connected = Some(channel);
            Ok(())
        }

        async fn disconnect(&self, _force: bool) -> std::result::Result<(), TransportError> {
            *self.connected.lock().unwrap() = None;
            Ok(())
        }

        async fn is_connected(&self) -> bool {
            if self.drop_after_connect.load(Ordering::SeqCst) {
                *self.connected.lock().unwrap() = None;
            }
            self.connected.lock().unwrap().is_some()
        }

        async fn play(&self, _stream: AudioStream, _done: StreamDone) -> std::result::Result<(), TransportError> {
            Err(TransportError::NotConnected)
        }

        async fn stop(&self) {}
        async fn pause(&self) {}
        async fn resume(&self) {}
        async fn is_playing(&self) -> bool {
            false
        }
        async fn is_paused(&self) -> bool {
            false
        }
    }

    fn manager(gateway: Arc<ScriptedGateway>) -> ConnectionManager {
        ConnectionManager::new(gateway, Duration::from_millis(100), Duration::from_millis(1))
    }

    #[tokio::test]
    async fn requester_outside_voice_is_rejected() {
        let gateway = Arc::new(ScriptedGateway::new());
        let conn = manager(Arc::clone(&gateway));

        let err = conn.ensure(UserId(1)).await.unwrap_err();
        assert!(matches!(err, Error::NotInVoiceChannel));
        assert_eq!(conn.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connects_to_requesters_channel() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.put_user(UserId(1), ChannelId(10));
        let conn = manager(Arc::clone(&gateway));

        let channel = conn.ensure(UserId(1)).await.unwrap();
        assert_eq!(channel, ChannelId(10));
        assert_eq!(conn.state().await, ConnectionState::Connected(ChannelId(10)));
        assert!(gateway.is_connected().await);
    }

    #[tokio::test]
    async fn moves_when_connected_elsewhere() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.put_user(UserId(1), ChannelId(10));
        gateway.put_user(UserId(2), ChannelId(20));
        let conn = manager(Arc::clone(&gateway));

        conn.ensure(UserId(1)).await.unwrap();
        let channel = conn.ensure(UserId(2)).await.unwrap();

        assert_eq!(channel, ChannelId(20));
        assert_eq!(gateway.current_channel().await, Some(ChannelId(20)));
        assert_eq!(conn.state().await, ConnectionState::Connected(ChannelId(20)));
    }

    #[tokio::test]
    async fn same_channel_is_noop() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.put_user(UserId(1), ChannelId(10));
        let conn = manager(Arc::clone(&gateway));

        conn.ensure(UserId(1)).await.unwrap();
        let channel = conn.ensure(UserId(1)).await.unwrap();
        assert_eq!(channel, ChannelId(10));
    }

    #[tokio::test]
    async fn timeout_tears_down_partial_connection() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.put_user(UserId(1), ChannelId(10));
        gateway.hang_connect.store(true, Ordering::SeqCst);
        let conn = manager(Arc::clone(&gateway));

        let err = conn.ensure(UserId(1)).await.unwrap_err();
        assert!(matches!(err, Error::ConnectTimeout));
        assert!(!gateway.is_connected().await);
        assert_eq!(conn.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn unstable_connection_is_closed() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.put_user(UserId(1), ChannelId(10));
        gateway.drop_after_connect.store(true, Ordering::SeqCst);
        let conn = manager(Arc::clone(&gateway));

        let err = conn.ensure(UserId(1)).await.unwrap_err();
        assert!(matches!(err, Error::ConnectUnstable));
        assert_eq!(conn.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn already_connected_race_is_success() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.put_user(UserId(1), ChannelId(10));
        *gateway.fail_connect.lock().unwrap() = Some(TransportError::AlreadyConnected);
        let conn = manager(Arc::clone(&gateway));

        let channel = conn.ensure(UserId(1)).await.unwrap();
        assert_eq!(channel, ChannelId(10));
    }

    #[tokio::test]
    async fn other_transport_failures_are_wrapped() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.put_user(UserId(1), ChannelId(10));
        *gateway.fail_connect.lock().unwrap() =
            Some(TransportError::ChannelUnavailable("full".to_string()));
        let conn = manager(Arc::clone(&gateway));

        let err = conn.ensure(UserId(1)).await.unwrap_err();
        assert!(matches!(err, Error::ConnectFailed(_)));
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.put_user(UserId(1), ChannelId(10));
        let conn = manager(Arc::clone(&gateway));

        conn.ensure(UserId(1)).await.unwrap();
        conn.teardown().await;
        conn.teardown().await;
        assert_eq!(conn.state().await, ConnectionState::Disconnected);
        assert!(!gateway.is_connected().await);
    }
}
