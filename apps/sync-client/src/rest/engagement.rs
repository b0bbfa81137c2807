//! Engagement endpoints: likes, follows, comments.
//!
//! Mutation responses may carry authoritative values (they usually do), and
//! the optimistic coordinator reconciles to whatever is present.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use super::client::ApiClient;
use crate::error::SyncError;
use crate::models::Comment;
use crate::mutation::{EngagementBackend, FollowUpdate, LikeUpdate};

impl ApiClient {
    pub async fn like_post(&self, post_id: &str) -> Result<LikeUpdate, SyncError> {
        self.request(Method::POST, &format!("/posts/{post_id}/like"), None)
            .await
    }

    pub async fn unlike_post(&self, post_id: &str) -> Result<LikeUpdate, SyncError> {
        self.request(Method::DELETE, &format!("/posts/{post_id}/like"), None)
            .await
    }

    pub async fn follow_peer(&self, peer_id: &str) -> Result<FollowUpdate, SyncError> {
        self.request(Method::POST, &format!("/peers/{peer_id}/follow"), None)
            .await
    }

    pub async fn unfollow_peer(&self, peer_id: &str) -> Result<FollowUpdate, SyncError> {
        self.request(Method::DELETE, &format!("/peers/{peer_id}/follow"), None)
            .await
    }

    pub async fn create_comment(&self, post_id: &str, text: &str) -> Result<Comment, SyncError> {
        let body = json!({ "text": text });
        self.request(
            Method::POST,
            &format!("/posts/{post_id}/comments"),
            Some(&body),
        )
        .await
    }

    pub async fn remove_comment(&self, comment_id: &str) -> Result<(), SyncError> {
        self.request_unit(Method::DELETE, &format!("/comments/{comment_id}"), None)
            .await
    }
}

#[async_trait]
impl EngagementBackend for ApiClient {
    async fn like_post(&self, post_id: &str) -> Result<LikeUpdate, SyncError> {
        ApiClient::like_post(self, post_id).await
    }

    async fn unlike_post(&self, post_id: &str) -> Result<LikeUpdate, SyncError> {
        ApiClient::unlike_post(self, post_id).await
    }

    async fn follow_peer(&self, peer_id: &str) -> Result<FollowUpdate, SyncError> {
        ApiClient::follow_peer(self, peer_id).await
    }

    async fn unfollow_peer(&self, peer_id: &str) -> Result<FollowUpdate, SyncError> {
        ApiClient::unfollow_peer(self, peer_id).await
    }

    async fn create_comment(&self, post_id: &str, text: &str) -> Result<Comment, SyncError> {
        ApiClient::create_comment(self, post_id, text).await
    }

    async fn delete_comment(&self, _post_id: &str, comment_id: &str) -> Result<(), SyncError> {
        self.remove_comment(comment_id).await
    }
}
