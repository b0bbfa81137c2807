//! Connection manager: owns the lifecycle of the single live gateway
//! connection for the authenticated session.
//!
//! The state machine is explicit so reconnection and cancellation behavior
//! is testable independent of the transport:
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Connected
//!      ^                         |                  |
//!      |                         v  failure         v  drop
//!      +---- retries exhausted  Reconnecting <------+
//! ```
//!
//! `disconnect()` is safe from any state, including when no connection
//! exists. At most one live connection exists per session; connecting with a
//! different session ID tears the old connection down and recreates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

use super::bus::{EventBus, GatewayEvent};
use super::events::{decode_dispatch, ClientMessage, ServerMessage, OP_DISPATCH, OP_HEARTBEAT_ACK};
use super::transport::{Transport, TransportSink, TransportSource};
use crate::config::Config;

/// Reconnect delays are capped regardless of attempt count.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Connection-health state, readable and watchable by any view component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

/// The subset of `Config` the manager needs.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub gateway_url: String,
    pub handshake_timeout: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub heartbeat_interval: Duration,
    pub silent_timeout: Duration,
}

impl From<&Config> for ConnectionConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            gateway_url: cfg.gateway_url.clone(),
            handshake_timeout: cfg.handshake_timeout,
            max_attempts: cfg.reconnect_max_attempts,
            base_delay: cfg.reconnect_base_delay,
            heartbeat_interval: cfg.heartbeat_interval,
            silent_timeout: cfg.silent_timeout,
        }
    }
}

struct ActiveConnection {
    session_id: String,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

enum LoopExit {
    Shutdown,
    Dropped,
}

pub struct ConnectionManager {
    cfg: ConnectionConfig,
    transport: Arc<dyn Transport>,
    bus: EventBus,
    state: watch::Sender<ConnectionState>,
    active: Mutex<Option<ActiveConnection>>,
}

impl ConnectionManager {
    pub fn new(cfg: ConnectionConfig, transport: Arc<dyn Transport>, bus: EventBus) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            cfg,
            transport,
            bus,
            state,
            active: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Subscribe to connection-health transitions (e.g. to render an
    /// offline/reconnecting indicator).
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Start (or keep) the live connection for `session_id`.
    ///
    /// Idempotent: a live connection for the same session is left alone. A
    /// live connection for a *different* session is torn down and replaced,
    /// never rebound to the new identity.
    pub fn connect(self: &Arc<Self>, session_id: &str) {
        let mut active = self.active.lock();

        if let Some(conn) = active.as_ref() {
            if conn.session_id == session_id && !conn.handle.is_finished() {
                tracing::debug!(%session_id, "connect: already live, nothing to do");
                return;
            }
        }
        if let Some(conn) = active.take() {
            tracing::info!(
                old_session = %conn.session_id,
                new_session = %session_id,
                "replacing gateway connection"
            );
            Self::teardown(conn);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let sid = session_id.to_string();
        let task_sid = sid.clone();
        let handle = tokio::spawn(async move { manager.run(task_sid, shutdown_rx).await });

        *active = Some(ActiveConnection {
            session_id: sid,
            shutdown: shutdown_tx,
            handle,
        });
    }

    /// Tear down the live connection, if any. Always safe to call; a call
    /// with no connection is a no-op and leaves state untouched.
    pub fn disconnect(&self) {
        let conn = self.active.lock().take();
        if let Some(conn) = conn {
            tracing::info!(session_id = %conn.session_id, "disconnecting gateway");
            Self::teardown(conn);
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn teardown(conn: ActiveConnection) {
        // Signal first so the loop exits at its next await, then abort to
        // cover a loop parked inside the transport.
        let _ = conn.shutdown.send(true);
        conn.handle.abort();
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_replace(next);
    }

    /// Supervisor loop: connect, drive, and reconnect with bounded, jittered
    /// backoff until told to shut down or the retry budget is exhausted.
    async fn run(self: Arc<Self>, session_id: String, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                return;
            }

            self.set_state(if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting { attempt }
            });

            let opened = tokio::select! {
                result = time::timeout(
                    self.cfg.handshake_timeout,
                    self.transport.open(&self.cfg.gateway_url, &session_id),
                ) => result,
                _ = shutdown.changed() => return,
            };

            match opened {
                Ok(Ok((mut sink, mut source))) => {
                    // Entering Connected: announce ourselves and re-subscribe
                    // to everything the stores depend on.
                    let announced = sink.send(&ClientMessage::announce(&session_id)).await.is_ok()
                        && sink.send(&ClientMessage::subscribe_all()).await.is_ok();
                    if !announced {
                        tracing::warn!(%session_id, "connection dropped during announce");
                        attempt += 1;
                    } else {
                        attempt = 0;
                        self.set_state(ConnectionState::Connected);
                        tracing::info!(%session_id, "gateway connection established");
                        self.bus.publish(GatewayEvent::Connected);

                        let exit = self.drive(&mut *sink, &mut *source, &mut shutdown).await;
                        sink.close().await;
                        match exit {
                            LoopExit::Shutdown => return,
                            LoopExit::Dropped => {
                                tracing::warn!(%session_id, "gateway connection dropped");
                                attempt = 1;
                            }
                        }
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(%session_id, error = %e, "gateway connect failed");
                    attempt += 1;
                }
                Err(_elapsed) => {
                    tracing::warn!(%session_id, "gateway handshake timed out");
                    attempt += 1;
                }
            }

            if attempt > self.cfg.max_attempts {
                tracing::warn!(
                    %session_id,
                    attempts = self.cfg.max_attempts,
                    "gateway retries exhausted; going offline"
                );
                self.set_state(ConnectionState::Disconnected);
                self.bus.publish(GatewayEvent::Degraded);
                return;
            }

            let delay = self.backoff(attempt);
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    /// Pump one open connection: decode inbound messages, send heartbeats,
    /// and watch for silent failure.
    async fn drive(
        &self,
        sink: &mut dyn TransportSink,
        source: &mut dyn TransportSource,
        shutdown: &mut watch::Receiver<bool>,
    ) -> LoopExit {
        let mut heartbeat = time::interval(self.cfg.heartbeat_interval);
        heartbeat.tick().await; // First tick fires immediately; skip it.
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                msg = source.next() => {
                    match msg {
                        Some(Ok(message)) => {
                            last_activity = Instant::now();
                            self.handle_message(message);
                        }
                        Some(Err(e)) => {
                            tracing::debug!(error = %e, "gateway read error");
                            return LoopExit::Dropped;
                        }
                        None => {
                            tracing::debug!("gateway closed by remote");
                            return LoopExit::Dropped;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    // A connection that has gone silent past the bound is a
                    // zombie even if the socket still looks open.
                    if last_activity.elapsed() > self.cfg.silent_timeout {
                        tracing::warn!("no gateway traffic within the silent timeout");
                        return LoopExit::Dropped;
                    }
                    if sink.send(&ClientMessage::heartbeat()).await.is_err() {
                        return LoopExit::Dropped;
                    }
                }
                _ = shutdown.changed() => return LoopExit::Shutdown,
            }
        }
    }

    fn handle_message(&self, msg: ServerMessage) {
        match msg.op {
            OP_DISPATCH => {
                let Some(name) = msg.t else {
                    tracing::debug!("dispatch without an event name");
                    return;
                };
                match decode_dispatch(&name, msg.d) {
                    Ok(Some(event)) => self.bus.publish(event),
                    Ok(None) => tracing::debug!(event = %name, "ignoring unknown dispatch"),
                    Err(e) => tracing::warn!(event = %name, error = %e, "malformed dispatch payload"),
                }
            }
            OP_HEARTBEAT_ACK => {}
            other => tracing::debug!(op = other, "ignoring unexpected opcode"),
        }
    }

    /// Exponential backoff with jitter, capped at `MAX_BACKOFF`.
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self
            .cfg
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF);
        let jitter = base.mul_f64(rand::thread_rng().gen_range(0.0..0.25));
        base + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::bus::EventBus;
    use async_trait::async_trait;

    struct NeverTransport;

    #[async_trait]
    impl Transport for NeverTransport {
        async fn open(
            &self,
            _url: &str,
            _session_id: &str,
        ) -> Result<(Box<dyn TransportSink>, Box<dyn TransportSource>), crate::error::SyncError>
        {
            Err(crate::error::SyncError::Transport("unreachable".into()))
        }
    }

    fn manager(base_delay_ms: u64) -> Arc<ConnectionManager> {
        let cfg = ConnectionConfig {
            gateway_url: "ws://localhost:0/gateway".to_string(),
            handshake_timeout: Duration::from_millis(50),
            max_attempts: 2,
            base_delay: Duration::from_millis(base_delay_ms),
            heartbeat_interval: Duration::from_secs(30),
            silent_timeout: Duration::from_secs(90),
        };
        Arc::new(ConnectionManager::new(
            cfg,
            Arc::new(NeverTransport),
            EventBus::new(),
        ))
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let mgr = manager(100);
        let first = mgr.backoff(1);
        assert!(first >= Duration::from_millis(100));
        assert!(first < Duration::from_millis(125));

        let second = mgr.backoff(2);
        assert!(second >= Duration::from_millis(200));
        assert!(second < Duration::from_millis(250));

        // A huge attempt count stays within the cap plus jitter.
        let capped = mgr.backoff(40);
        assert!(capped <= MAX_BACKOFF + MAX_BACKOFF.mul_f64(0.25));
    }

    #[tokio::test]
    async fn disconnect_without_connection_is_a_noop() {
        let mgr = manager(1);
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        mgr.disconnect();
        mgr.disconnect();
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn retries_exhausted_reaches_disconnected_and_degrades() {
        let mgr = manager(1);
        let mut events = {
            // Reach into the bus through a fresh subscription before connecting.
            mgr.bus.subscribe()
        };
        mgr.connect("ses_1");

        let mut state = mgr.watch_state();
        tokio::time::timeout(Duration::from_secs(5), async {
            state
                .wait_for(|s| *s == ConnectionState::Disconnected)
                .await
                .unwrap();
        })
        .await
        .expect("manager should give up after bounded retries");

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("degraded event expected")
            .unwrap();
        assert!(matches!(*event, GatewayEvent::Degraded));
    }

    #[tokio::test]
    async fn connect_is_idempotent_for_the_same_session() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingTransport(AtomicUsize);

        #[async_trait]
        impl Transport for CountingTransport {
            async fn open(
                &self,
                _url: &str,
                _session_id: &str,
            ) -> Result<
                (Box<dyn TransportSink>, Box<dyn TransportSource>),
                crate::error::SyncError,
            > {
                self.0.fetch_add(1, Ordering::SeqCst);
                // Park forever; the test only cares about open counts.
                futures_util::future::pending::<()>().await;
                unreachable!()
            }
        }

        let transport = Arc::new(CountingTransport(AtomicUsize::new(0)));
        let cfg = ConnectionConfig {
            gateway_url: "ws://localhost:0/gateway".to_string(),
            handshake_timeout: Duration::from_secs(30),
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            heartbeat_interval: Duration::from_secs(30),
            silent_timeout: Duration::from_secs(90),
        };
        let mgr = Arc::new(ConnectionManager::new(
            cfg,
            transport.clone(),
            EventBus::new(),
        ));

        mgr.connect("ses_1");
        tokio::task::yield_now().await;
        mgr.connect("ses_1");
        mgr.connect("ses_1");
        tokio::task::yield_now().await;

        assert_eq!(transport.0.load(std::sync::atomic::Ordering::SeqCst), 1);
        mgr.disconnect();
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
    }
}
