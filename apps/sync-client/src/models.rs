//! Client-facing data types mirrored from the Synapse backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated user's session, as returned by the auth endpoints.
///
/// Exactly one session is live per engine instance; the gateway connection
/// is bound to `id` for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Minimal peer profile embedded in notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSummary {
    pub id: String,
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    Mention,
    Post,
    Reel,
    Story,
}

/// A single notification, created by push or by bulk pull.
///
/// Records are never deleted client-side except on an explicit clear; the
/// `read` flag is the only field that mutates after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub kind: NotificationKind,
    pub source: PeerSummary,
    /// The post, comment, or reel the notification points at, if any.
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// A comment on a post.
///
/// `pending` is client-local: it marks an optimistically inserted comment
/// whose create call has not resolved yet. Pending comments carry a `tmp_`
/// ID minted on the client and are swapped for the server record on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub pending: bool,
}

/// Local mirror of a post's like state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub count: u32,
}

/// Local mirror of a follow edge toward a peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowState {
    pub following: bool,
    pub follower_count: u32,
}
