//! Client-side real-time synchronization engine for Synapse.
//!
//! Keeps a live gateway connection for the authenticated session, mirrors
//! server-authoritative notification and presence state into local stores,
//! and coordinates optimistic engagement mutations with rollback. A UI layer
//! reads the stores and subscribes to the event bus, the notice feed, and
//! the connection-state watch; nothing in here renders anything.

pub mod config;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod models;
pub mod mutation;
pub mod notices;
pub mod notifications;
pub mod presence;
pub mod rest;
pub mod session;

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use config::Config;
use error::SyncError;
use gateway::bus::{EventBus, GatewayEvent};
use gateway::connection::{ConnectionConfig, ConnectionManager};
use gateway::transport::{Transport, WsTransport};
use models::Session;
use mutation::{EngagementStore, MutationOutcome};
use notices::NoticeFeed;
use notifications::NotificationMirror;
use presence::PresenceRegistry;
use rest::ApiClient;
use session::SessionStore;

/// The assembled engine. Cheap to clone; all parts are shared.
#[derive(Clone)]
pub struct SyncEngine {
    pub config: Arc<Config>,
    pub api: Arc<ApiClient>,
    pub session: Arc<SessionStore>,
    pub connection: Arc<ConnectionManager>,
    pub bus: EventBus,
    pub presence: Arc<PresenceRegistry>,
    pub notifications: Arc<NotificationMirror>,
    pub engagement: Arc<EngagementStore>,
    pub notices: NoticeFeed,
}

impl SyncEngine {
    pub fn new(config: Config) -> Result<Self, SyncError> {
        Self::with_transport(config, Arc::new(WsTransport))
    }

    /// Build the engine on a custom transport (tests use this to run
    /// without a gateway server).
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self, SyncError> {
        let api = Arc::new(ApiClient::new(&config)?);
        let bus = EventBus::new();
        let connection = Arc::new(ConnectionManager::new(
            ConnectionConfig::from(&config),
            transport,
            bus.clone(),
        ));
        let notices = NoticeFeed::new();

        Ok(Self {
            config: Arc::new(config),
            api,
            session: Arc::new(SessionStore::new()),
            connection,
            bus,
            presence: Arc::new(PresenceRegistry::new()),
            notifications: Arc::new(NotificationMirror::new()),
            engagement: Arc::new(EngagementStore::new(notices.clone())),
            notices,
        })
    }

    /// Spawn the background tasks: the session guard and the event-apply
    /// loop. The engine is inert until this runs.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let guard = guard::spawn(
            Arc::clone(&self.session),
            Arc::clone(&self.connection),
            Arc::clone(&self.presence),
            Arc::clone(&self.notifications),
            Arc::clone(&self.engagement),
            self.api.auth_events(),
        );
        let apply = {
            let engine = self.clone();
            tokio::spawn(async move { engine.apply_events().await })
        };
        vec![guard, apply]
    }

    // -- session flows -------------------------------------------------------

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, SyncError> {
        let session = self.api.login(email, password).await?;
        self.session.set(Some(session.clone()));
        Ok(session)
    }

    pub async fn register(
        &self,
        handle: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, SyncError> {
        let session = self.api.register(handle, email, password).await?;
        self.session.set(Some(session.clone()));
        Ok(session)
    }

    /// Restore a previous session from the stored cookie, if still valid.
    pub async fn restore(&self) -> Result<Session, SyncError> {
        let session = self.api.restore().await?;
        self.session.set(Some(session.clone()));
        Ok(session)
    }

    /// End the session. The server-side call is best-effort; the local
    /// session ends regardless, which disconnects the gateway and clears
    /// the stores via the guard.
    pub async fn logout(&self) {
        if let Err(e) = self.api.logout().await {
            tracing::warn!(error = %e, "logout call failed; ending the session anyway");
        }
        self.session.set(None);
    }

    // -- user actions --------------------------------------------------------

    pub async fn mark_all_read(&self) -> Result<(), SyncError> {
        self.notifications.mark_all_read(self.api.as_ref()).await
    }

    pub async fn toggle_like(&self, post_id: &str) -> Result<MutationOutcome, SyncError> {
        self.engagement.toggle_like(self.api.as_ref(), post_id).await
    }

    pub async fn toggle_follow(&self, peer_id: &str) -> Result<MutationOutcome, SyncError> {
        self.engagement
            .toggle_follow(self.api.as_ref(), peer_id)
            .await
    }

    pub async fn add_comment(
        &self,
        post_id: &str,
        text: &str,
    ) -> Result<MutationOutcome, SyncError> {
        let Some(session) = self.session.current() else {
            return Err(SyncError::Auth("not signed in".to_string()));
        };
        self.engagement
            .add_comment(self.api.as_ref(), post_id, &session.user_id, text)
            .await
    }

    pub async fn delete_comment(
        &self,
        post_id: &str,
        comment_id: &str,
    ) -> Result<MutationOutcome, SyncError> {
        self.engagement
            .delete_comment(self.api.as_ref(), post_id, comment_id)
            .await
    }

    // -- event application ---------------------------------------------------

    async fn apply_events(&self) {
        let mut events = self.bus.subscribe();
        loop {
            match events.recv().await {
                Ok(event) => self.apply(event.as_ref()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Missed events mean the mirrors may be behind; a full
                    // resync repairs whatever was dropped.
                    tracing::warn!(skipped, "event bus lagged; forcing a resync");
                    let engine = self.clone();
                    tokio::spawn(async move { engine.resync().await });
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn apply(&self, event: &GatewayEvent) {
        match event {
            GatewayEvent::Connected => {
                let engine = self.clone();
                tokio::spawn(async move { engine.resync().await });
            }
            GatewayEvent::Degraded => {
                // Presence can't update without a connection.
                self.presence.clear();
                self.notices
                    .publish("You're offline. Some data may be out of date.");
            }
            GatewayEvent::PeerOnline { peer_id } => {
                if self.session.is_active() {
                    self.presence.mark_online(peer_id);
                }
            }
            GatewayEvent::PeerOffline { peer_id } => {
                if self.session.is_active() {
                    self.presence.mark_offline(peer_id);
                }
            }
            GatewayEvent::Notification(record) => {
                if self.session.is_active() {
                    self.notifications.on_push(record.clone());
                } else {
                    tracing::debug!(id = %record.id, "notification after session end discarded");
                }
            }
        }
    }

    /// Full resync, run after every (re)connect: replace the presence set
    /// with the authoritative snapshot and re-pull the notification list.
    /// Results that cross a session boundary are discarded, never applied.
    pub async fn resync(&self) {
        let epoch = self.session.epoch();

        match self.api.presence_snapshot().await {
            Ok(peers) => {
                if self.session.epoch() == epoch {
                    self.presence.replace_all(peers);
                } else {
                    tracing::debug!("presence snapshot crossed a session boundary; discarded");
                }
            }
            Err(e) => tracing::warn!(error = %e, "presence resync failed"),
        }

        match self.api.list_notifications().await {
            Ok(records) => {
                if self.session.epoch() == epoch {
                    self.notifications.replace_all(records);
                } else {
                    tracing::debug!("notification pull crossed a session boundary; discarded");
                }
            }
            Err(e) => tracing::warn!(error = %e, "notification pull failed"),
        }
    }
}
