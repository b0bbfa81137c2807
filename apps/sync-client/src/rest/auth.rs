//! Authentication endpoints.

use reqwest::Method;
use serde_json::json;

use super::client::{check_status, ApiClient};
use crate::error::SyncError;
use crate::models::Session;

impl ApiClient {
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, SyncError> {
        let body = json!({ "email": email, "password": password });
        self.request_unauthenticated(Method::POST, "/auth/login", Some(&body))
            .await
    }

    pub async fn register(
        &self,
        handle: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, SyncError> {
        let body = json!({ "handle": handle, "email": email, "password": password });
        self.request_unauthenticated(Method::POST, "/auth/register", Some(&body))
            .await
    }

    /// Restore the session backing the stored cookie, if it's still valid.
    pub async fn restore(&self) -> Result<Session, SyncError> {
        self.request(Method::GET, "/auth/session", None).await
    }

    /// End the server-side session. A 401 here means it was already gone,
    /// which is the outcome we wanted.
    pub async fn logout(&self) -> Result<(), SyncError> {
        let response = self.execute(Method::POST, "/auth/logout", None).await?;
        match check_status(response).await {
            Ok(_) | Err(SyncError::Auth(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
