//! Request machinery shared by every resource method.
//!
//! Authentication rides on the session cookie, so the client carries a
//! cookie store and no per-request credentials. The backend's documented
//! 401 convention is implemented here once: any authenticated request that
//! comes back 401 triggers a single silent session refresh and one retry;
//! if that also fails the error is terminal and an `AuthEvent` is emitted
//! so the session guard can end the session.

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::SyncError;

/// Emitted when the session is established to be unrecoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SessionExpired,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth_events: broadcast::Sender<AuthEvent>,
}

impl ApiClient {
    pub fn new(cfg: &Config) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(cfg.request_timeout)
            .build()?;
        let (auth_events, _) = broadcast::channel(16);
        Ok(Self {
            http,
            base_url: cfg.api_url.trim_end_matches('/').to_string(),
            auth_events,
        })
    }

    /// Subscribe to terminal auth failures.
    pub fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    pub(crate) async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, SyncError> {
        let mut request = self.http.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Send with the 401 convention applied; returns the final response.
    async fn send_with_refresh(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, SyncError> {
        let response = self.execute(method.clone(), path, body).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(%path, "got 401; attempting a silent session refresh");
        if let Err(e) = self.refresh_session().await {
            tracing::warn!(error = %e, "session refresh failed");
            self.session_expired();
            return Err(SyncError::Auth("session refresh failed".to_string()));
        }

        let retried = self.execute(method, path, body).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            self.session_expired();
            return Err(SyncError::Auth("session expired".to_string()));
        }
        Ok(retried)
    }

    /// Authenticated request with a JSON response body.
    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, SyncError> {
        let response = self.send_with_refresh(method, path, body).await?;
        read_json(response).await
    }

    /// Authenticated request where success carries no meaningful body.
    pub(crate) async fn request_unit(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(), SyncError> {
        let response = self.send_with_refresh(method, path, body).await?;
        check_status(response).await.map(|_| ())
    }

    /// Request outside an authenticated session (login, register). A 401
    /// here means bad credentials, not an expired session, so no refresh.
    pub(crate) async fn request_unauthenticated<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, SyncError> {
        let response = self.execute(method, path, body).await?;
        read_json(response).await
    }

    async fn refresh_session(&self) -> Result<(), SyncError> {
        let response = self.execute(Method::POST, "/auth/refresh", None).await?;
        check_status(response).await.map(|_| ())
    }

    fn session_expired(&self) {
        let _ = self.auth_events.send(AuthEvent::SessionExpired);
    }
}

pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, SyncError> {
    let response = check_status(response).await?;
    Ok(response.json().await?)
}

pub(crate) async fn check_status(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(SyncError::Auth("unauthorized".to_string()));
    }
    let message = response.text().await.unwrap_or_default();
    Err(SyncError::Api {
        status: status.as_u16(),
        message,
    })
}
