//! Optimistic mutation coordinator for interactive engagement actions:
//! like/unlike, follow/unfollow, comment add/delete.
//!
//! Every action follows the same protocol: capture the previous state, apply
//! the local guess before the network call resolves, then either reconcile
//! to the authoritative values the response carries (a toggle is not
//! idempotent against concurrent edits from other clients) or restore the
//! captured state and surface a notice. Failed mutations are never retried
//! automatically; retrying is for transport, not for user actions.
//!
//! Mutations are serialized per entity: a toggle issued while one is already
//! in flight on the same entity is ignored and reported as such, so rapid
//! repeated clicks can't double-count.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use serde::Deserialize;

use synapse_common::id::{prefix, prefixed_ulid};

use crate::error::SyncError;
use crate::models::{Comment, FollowState, LikeState};
use crate::notices::NoticeFeed;

/// Authoritative like state a mutation response may carry. Absent fields
/// mean the server left the optimistic guess standing.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LikeUpdate {
    #[serde(default)]
    pub liked: Option<bool>,
    #[serde(default)]
    pub like_count: Option<u32>,
}

/// Authoritative follow state a mutation response may carry.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FollowUpdate {
    #[serde(default)]
    pub following: Option<bool>,
    #[serde(default)]
    pub follower_count: Option<u32>,
}

/// The backend mutations the coordinator issues.
#[async_trait]
pub trait EngagementBackend: Send + Sync {
    async fn like_post(&self, post_id: &str) -> Result<LikeUpdate, SyncError>;
    async fn unlike_post(&self, post_id: &str) -> Result<LikeUpdate, SyncError>;
    async fn follow_peer(&self, peer_id: &str) -> Result<FollowUpdate, SyncError>;
    async fn unfollow_peer(&self, peer_id: &str) -> Result<FollowUpdate, SyncError>;
    async fn create_comment(&self, post_id: &str, text: &str) -> Result<Comment, SyncError>;
    async fn delete_comment(&self, post_id: &str, comment_id: &str) -> Result<(), SyncError>;
}

/// What happened to a requested mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The mutation ran (and either reconciled or rolled back).
    Applied,
    /// Another mutation on the same entity was in flight, or there was
    /// nothing to do. No state changed and no call was issued.
    Ignored,
}

/// Local engagement state for feed items, plus the per-entity in-flight
/// gate.
pub struct EngagementStore {
    likes: DashMap<String, LikeState>,
    follows: DashMap<String, FollowState>,
    comments: DashMap<String, Vec<Comment>>,
    in_flight: DashSet<String>,
    notices: NoticeFeed,
}

/// Removes its key from the in-flight set when dropped, so the gate releases
/// on success and failure paths alike.
struct InFlight<'a> {
    set: &'a DashSet<String>,
    key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

impl EngagementStore {
    pub fn new(notices: NoticeFeed) -> Self {
        Self {
            likes: DashMap::new(),
            follows: DashMap::new(),
            comments: DashMap::new(),
            in_flight: DashSet::new(),
            notices,
        }
    }

    fn begin(&self, key: String) -> Option<InFlight<'_>> {
        if self.in_flight.insert(key.clone()) {
            Some(InFlight {
                set: &self.in_flight,
                key,
            })
        } else {
            None
        }
    }

    // -- seeding from feed loads -------------------------------------------

    pub fn prime_like(&self, post_id: &str, liked: bool, count: u32) {
        self.likes
            .insert(post_id.to_string(), LikeState { liked, count });
    }

    pub fn prime_follow(&self, peer_id: &str, following: bool, follower_count: u32) {
        self.follows.insert(
            peer_id.to_string(),
            FollowState {
                following,
                follower_count,
            },
        );
    }

    pub fn prime_comments(&self, post_id: &str, comments: Vec<Comment>) {
        self.comments.insert(post_id.to_string(), comments);
    }

    // -- readers ------------------------------------------------------------

    pub fn like_state(&self, post_id: &str) -> Option<LikeState> {
        self.likes.get(post_id).map(|s| *s)
    }

    pub fn follow_state(&self, peer_id: &str) -> Option<FollowState> {
        self.follows.get(peer_id).map(|s| *s)
    }

    pub fn comments(&self, post_id: &str) -> Vec<Comment> {
        self.comments
            .get(post_id)
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Drop all local engagement state. Used when the session ends.
    pub fn clear(&self) {
        self.likes.clear();
        self.follows.clear();
        self.comments.clear();
        self.in_flight.clear();
    }

    // -- mutations ----------------------------------------------------------

    /// Toggle the like on a post.
    pub async fn toggle_like(
        &self,
        backend: &dyn EngagementBackend,
        post_id: &str,
    ) -> Result<MutationOutcome, SyncError> {
        let Some(_gate) = self.begin(format!("like:{post_id}")) else {
            tracing::debug!(%post_id, "like toggle already in flight; ignored");
            return Ok(MutationOutcome::Ignored);
        };

        let prev = self.likes.get(post_id).map(|s| *s).unwrap_or_default();
        let guess = LikeState {
            liked: !prev.liked,
            count: if prev.liked {
                prev.count.saturating_sub(1)
            } else {
                prev.count + 1
            },
        };
        self.likes.insert(post_id.to_string(), guess);

        let result = if prev.liked {
            backend.unlike_post(post_id).await
        } else {
            backend.like_post(post_id).await
        };

        match result {
            Ok(update) => {
                let mut state = self.likes.entry(post_id.to_string()).or_insert(guess);
                if let Some(liked) = update.liked {
                    state.liked = liked;
                }
                if let Some(count) = update.like_count {
                    state.count = count;
                }
                Ok(MutationOutcome::Applied)
            }
            Err(e) => {
                tracing::debug!(%post_id, error = %e, "like toggle failed; rolling back");
                self.likes.insert(post_id.to_string(), prev);
                self.notices.publish(if prev.liked {
                    "Couldn't remove the like. Try again."
                } else {
                    "Couldn't like this post. Try again."
                });
                Err(e)
            }
        }
    }

    /// Toggle the follow edge toward a peer.
    pub async fn toggle_follow(
        &self,
        backend: &dyn EngagementBackend,
        peer_id: &str,
    ) -> Result<MutationOutcome, SyncError> {
        let Some(_gate) = self.begin(format!("follow:{peer_id}")) else {
            tracing::debug!(%peer_id, "follow toggle already in flight; ignored");
            return Ok(MutationOutcome::Ignored);
        };

        let prev = self.follows.get(peer_id).map(|s| *s).unwrap_or_default();
        let guess = FollowState {
            following: !prev.following,
            follower_count: if prev.following {
                prev.follower_count.saturating_sub(1)
            } else {
                prev.follower_count + 1
            },
        };
        self.follows.insert(peer_id.to_string(), guess);

        let result = if prev.following {
            backend.unfollow_peer(peer_id).await
        } else {
            backend.follow_peer(peer_id).await
        };

        match result {
            Ok(update) => {
                let mut state = self.follows.entry(peer_id.to_string()).or_insert(guess);
                if let Some(following) = update.following {
                    state.following = following;
                }
                if let Some(count) = update.follower_count {
                    state.follower_count = count;
                }
                Ok(MutationOutcome::Applied)
            }
            Err(e) => {
                tracing::debug!(%peer_id, error = %e, "follow toggle failed; rolling back");
                self.follows.insert(peer_id.to_string(), prev);
                self.notices.publish(if prev.following {
                    "Couldn't unfollow. Try again."
                } else {
                    "Couldn't follow. Try again."
                });
                Err(e)
            }
        }
    }

    /// Add a comment to a post. The comment appears immediately with a
    /// client-minted pending ID, swapped for the server record on success.
    pub async fn add_comment(
        &self,
        backend: &dyn EngagementBackend,
        post_id: &str,
        author_id: &str,
        text: &str,
    ) -> Result<MutationOutcome, SyncError> {
        let Some(_gate) = self.begin(format!("comment-add:{post_id}")) else {
            tracing::debug!(%post_id, "comment add already in flight; ignored");
            return Ok(MutationOutcome::Ignored);
        };

        let temp_id = prefixed_ulid(prefix::PENDING);
        let pending = Comment {
            id: temp_id.clone(),
            post_id: post_id.to_string(),
            author_id: author_id.to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
            pending: true,
        };
        self.comments
            .entry(post_id.to_string())
            .or_default()
            .push(pending);

        match backend.create_comment(post_id, text).await {
            Ok(saved) => {
                if let Some(mut thread) = self.comments.get_mut(post_id) {
                    if let Some(slot) = thread.iter_mut().find(|c| c.id == temp_id) {
                        *slot = saved;
                    }
                } else {
                    // Thread cleared mid-flight (session ended); drop the
                    // result silently.
                    tracing::debug!(%post_id, "comment confirmed after thread was cleared");
                }
                Ok(MutationOutcome::Applied)
            }
            Err(e) => {
                tracing::debug!(%post_id, error = %e, "comment create failed; removing pending");
                if let Some(mut thread) = self.comments.get_mut(post_id) {
                    thread.retain(|c| c.id != temp_id);
                }
                self.notices.publish("Couldn't post your comment. Try again.");
                Err(e)
            }
        }
    }

    /// Delete a comment. Removed locally right away, restored in place if
    /// the backend refuses.
    pub async fn delete_comment(
        &self,
        backend: &dyn EngagementBackend,
        post_id: &str,
        comment_id: &str,
    ) -> Result<MutationOutcome, SyncError> {
        let Some(_gate) = self.begin(format!("comment:{comment_id}")) else {
            tracing::debug!(%comment_id, "comment delete already in flight; ignored");
            return Ok(MutationOutcome::Ignored);
        };

        let removed = {
            let Some(mut thread) = self.comments.get_mut(post_id) else {
                return Ok(MutationOutcome::Ignored);
            };
            match thread.iter().position(|c| c.id == comment_id) {
                Some(index) => Some((index, thread.remove(index))),
                None => None,
            }
        };
        let Some((index, comment)) = removed else {
            return Ok(MutationOutcome::Ignored);
        };

        match backend.delete_comment(post_id, comment_id).await {
            Ok(()) => Ok(MutationOutcome::Applied),
            Err(e) => {
                tracing::debug!(%comment_id, error = %e, "comment delete failed; restoring");
                let mut thread = self.comments.entry(post_id.to_string()).or_default();
                let index = index.min(thread.len());
                thread.insert(index, comment);
                drop(thread);
                self.notices.publish("Couldn't delete the comment. Try again.");
                Err(e)
            }
        }
    }
}
