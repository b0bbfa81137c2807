use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sync_client::config::Config;
use sync_client::SyncEngine;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(api_url = %config.api_url, gateway_url = %config.gateway_url, "sync-client configured");

    let engine = SyncEngine::new(config).expect("failed to build the sync engine");
    let _tasks = engine.start();

    // Trace notices and incoming events so a headless run shows what the
    // engine is doing.
    {
        let mut notices = engine.notices.subscribe();
        tokio::spawn(async move {
            while let Ok(notice) = notices.recv().await {
                tracing::info!(notice_id = %notice.id, "{}", notice.message);
            }
        });
    }
    {
        let notifications = engine.notifications.clone();
        let mut events = engine.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        tracing::info!(unread = notifications.unread(), ?event, "gateway event")
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    match (
        std::env::var("SYNAPSE_EMAIL"),
        std::env::var("SYNAPSE_PASSWORD"),
    ) {
        (Ok(email), Ok(password)) => match engine.login(&email, &password).await {
            Ok(session) => {
                tracing::info!(handle = %session.handle, user_id = %session.user_id, "logged in")
            }
            Err(e) => {
                tracing::error!(error = %e, "login failed");
                return;
            }
        },
        _ => {
            tracing::warn!(
                "SYNAPSE_EMAIL/SYNAPSE_PASSWORD not set; running without a session (no live connection)"
            );
        }
    }

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl-c");
    tracing::info!("shutting down");
    engine.logout().await;
}
