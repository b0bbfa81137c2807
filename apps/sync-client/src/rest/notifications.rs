//! Notification endpoints.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

use super::client::ApiClient;
use crate::error::SyncError;
use crate::models::NotificationRecord;
use crate::notifications::NotificationBackend;

#[derive(Debug, Deserialize)]
struct NotificationList {
    notifications: Vec<NotificationRecord>,
}

impl ApiClient {
    /// Fetch the authoritative notification list, newest-first.
    pub async fn list_notifications(&self) -> Result<Vec<NotificationRecord>, SyncError> {
        let list: NotificationList = self.request(Method::GET, "/notifications", None).await?;
        Ok(list.notifications)
    }

    pub async fn mark_notifications_read(&self) -> Result<(), SyncError> {
        self.request_unit(Method::POST, "/notifications/read", None)
            .await
    }
}

#[async_trait]
impl NotificationBackend for ApiClient {
    async fn mark_all_read(&self) -> Result<(), SyncError> {
        self.mark_notifications_read().await
    }
}
