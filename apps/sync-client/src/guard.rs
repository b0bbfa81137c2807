//! Gates the connection lifecycle to the session lifecycle.
//!
//! Session non-null → connect; session null → disconnect and clear every
//! store that only makes sense inside a session. Watch channels coalesce
//! rapid re-triggers and `disconnect()` is idempotent, so teardown happens
//! effectively once per login→logout cycle no matter how often the
//! transition is observed. Terminal auth failures from the REST client end
//! the session through the same path rather than side-stepping it.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::gateway::connection::ConnectionManager;
use crate::mutation::EngagementStore;
use crate::notifications::NotificationMirror;
use crate::presence::PresenceRegistry;
use crate::rest::AuthEvent;
use crate::session::SessionStore;

pub fn spawn(
    session: Arc<SessionStore>,
    connection: Arc<ConnectionManager>,
    presence: Arc<PresenceRegistry>,
    notifications: Arc<NotificationMirror>,
    engagement: Arc<EngagementStore>,
    mut auth_events: broadcast::Receiver<AuthEvent>,
) -> JoinHandle<()> {
    let mut transitions = session.watch();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = transitions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = transitions.borrow_and_update().clone();
                    match next {
                        Some(s) => {
                            tracing::info!(
                                session_id = %s.id,
                                user_id = %s.user_id,
                                "session started; connecting gateway"
                            );
                            connection.connect(&s.id);
                        }
                        None => {
                            tracing::info!("session ended; disconnecting gateway");
                            connection.disconnect();
                            presence.clear();
                            notifications.clear();
                            engagement.clear();
                        }
                    }
                }
                event = auth_events.recv() => {
                    match event {
                        Ok(AuthEvent::SessionExpired) => {
                            if session.is_active() {
                                tracing::warn!("authentication expired; ending session");
                                // The transition observed above does the rest.
                                session.set(None);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "auth event stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::gateway::bus::EventBus;
    use crate::gateway::connection::{ConnectionConfig, ConnectionState};
    use crate::gateway::events::{ClientMessage, ServerMessage};
    use crate::gateway::transport::{Transport, TransportSink, TransportSource};
    use crate::models::Session;
    use crate::notices::NoticeFeed;
    use crate::error::SyncError;

    struct StubSink;

    #[async_trait]
    impl TransportSink for StubSink {
        async fn send(&mut self, _msg: &ClientMessage) -> Result<(), SyncError> {
            Ok(())
        }

        async fn close(&mut self) {}
    }

    struct StubSource {
        rx: mpsc::UnboundedReceiver<ServerMessage>,
    }

    #[async_trait]
    impl TransportSource for StubSource {
        async fn next(&mut self) -> Option<Result<ServerMessage, SyncError>> {
            self.rx.recv().await.map(Ok)
        }
    }

    /// Transport whose connections stay open until the test drops the
    /// senders it accumulates.
    #[derive(Default)]
    struct StubTransport {
        senders: parking_lot::Mutex<Vec<mpsc::UnboundedSender<ServerMessage>>>,
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn open(
            &self,
            _url: &str,
            _session_id: &str,
        ) -> Result<(Box<dyn TransportSink>, Box<dyn TransportSource>), SyncError> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().push(tx);
            Ok((Box::new(StubSink), Box::new(StubSource { rx })))
        }
    }

    struct Fixture {
        session: Arc<SessionStore>,
        connection: Arc<ConnectionManager>,
        presence: Arc<PresenceRegistry>,
        notifications: Arc<NotificationMirror>,
        auth_tx: broadcast::Sender<AuthEvent>,
        _guard: JoinHandle<()>,
    }

    fn fixture() -> Fixture {
        let cfg = ConnectionConfig {
            gateway_url: "ws://localhost:0/gateway".to_string(),
            handshake_timeout: Duration::from_secs(5),
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            heartbeat_interval: Duration::from_secs(30),
            silent_timeout: Duration::from_secs(90),
        };
        let connection = Arc::new(ConnectionManager::new(
            cfg,
            Arc::new(StubTransport::default()),
            EventBus::new(),
        ));
        let session = Arc::new(SessionStore::new());
        let presence = Arc::new(PresenceRegistry::new());
        let notifications = Arc::new(NotificationMirror::new());
        let engagement = Arc::new(EngagementStore::new(NoticeFeed::new()));
        let (auth_tx, auth_rx) = broadcast::channel(4);

        let guard = spawn(
            Arc::clone(&session),
            Arc::clone(&connection),
            Arc::clone(&presence),
            Arc::clone(&notifications),
            engagement,
            auth_rx,
        );

        Fixture {
            session,
            connection,
            presence,
            notifications,
            auth_tx,
            _guard: guard,
        }
    }

    fn session_record(id: &str) -> Session {
        Session {
            id: id.to_string(),
            user_id: "usr_1".to_string(),
            handle: "ana".to_string(),
            display_name: None,
        }
    }

    async fn wait_for_state(fx: &Fixture, want: ConnectionState) {
        let mut state = fx.connection.watch_state();
        timeout(Duration::from_secs(5), state.wait_for(|s| *s == want))
            .await
            .expect("state transition timed out")
            .unwrap();
    }

    #[tokio::test]
    async fn login_connects_and_logout_tears_everything_down() {
        let fx = fixture();

        fx.session.set(Some(session_record("ses_1")));
        wait_for_state(&fx, ConnectionState::Connected).await;

        // Some state accumulates during the session.
        fx.presence.mark_online("u2");

        fx.session.set(None);
        wait_for_state(&fx, ConnectionState::Disconnected).await;
        assert!(fx.presence.is_empty());
        assert!(fx.notifications.is_empty());
    }

    #[tokio::test]
    async fn auth_expiry_ends_the_session() {
        let fx = fixture();

        fx.session.set(Some(session_record("ses_1")));
        wait_for_state(&fx, ConnectionState::Connected).await;

        fx.auth_tx.send(AuthEvent::SessionExpired).unwrap();

        wait_for_state(&fx, ConnectionState::Disconnected).await;
        assert!(!fx.session.is_active());
    }

    #[tokio::test]
    async fn auth_expiry_without_a_session_is_ignored() {
        let fx = fixture();

        fx.auth_tx.send(AuthEvent::SessionExpired).unwrap();
        tokio::task::yield_now().await;

        assert!(!fx.session.is_active());
        assert_eq!(fx.connection.state(), ConnectionState::Disconnected);
    }
}
