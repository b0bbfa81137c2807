//! Presence snapshot endpoint, used for the post-connect resync.

use reqwest::Method;
use serde::Deserialize;

use super::client::ApiClient;
use crate::error::SyncError;

#[derive(Debug, Deserialize)]
struct PresenceSnapshot {
    peer_ids: Vec<String>,
}

impl ApiClient {
    /// The authoritative set of currently-online peers.
    pub async fn presence_snapshot(&self) -> Result<Vec<String>, SyncError> {
        let snapshot: PresenceSnapshot = self.request(Method::GET, "/presence/online", None).await?;
        Ok(snapshot.peer_ids)
    }
}
