//! Viewer relationships: likes, saves, follows and creator subscriptions.
//!
//! State is local to the session. Every change is also handed to a
//! `RelationshipSink` so a persistent backend can be attached later.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{User, Video};

/// How long the stubbed payment step takes by default.
pub const DEFAULT_PAYMENT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipChange {
    Liked { video_id: String, liked: bool },
    Saved { video_id: String, saved: bool },
    Followed { creator_id: String, following: bool },
    Subscribed { creator_id: String, subscribed: bool },
}

/// Receives relationship changes after they are applied locally. Nothing is
/// awaited and failures are the sink's own business.
pub trait RelationshipSink: Send + Sync {
    fn record(&self, change: &RelationshipChange);
}

#[derive(Debug, Default)]
pub struct DiscardSink;

impl RelationshipSink for DiscardSink {
    fn record(&self, _change: &RelationshipChange) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Following,
    /// The creator gates content behind a subscription the viewer lacks.
    SubscriptionRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfollowOutcome {
    Unfollowed,
    /// Unfollowing would drop a paid subscription; call `confirm_unfollow`.
    ConfirmationRequired,
}

pub struct RelationshipState {
    liked: HashSet<String>,
    saved: HashSet<String>,
    following: HashSet<String>,
    subscribed: HashSet<String>,
    subscription_creators: HashSet<String>,
    sink: Arc<dyn RelationshipSink>,
}

impl Default for RelationshipState {
    fn default() -> Self {
        Self::new(Arc::new(DiscardSink))
    }
}

impl RelationshipState {
    pub fn new(sink: Arc<dyn RelationshipSink>) -> Self {
        Self {
            liked: HashSet::new(),
            saved: HashSet::new(),
            following: HashSet::new(),
            subscribed: HashSet::new(),
            subscription_creators: HashSet::new(),
            sink,
        }
    }

    /// Marks `creator_id` as requiring a subscription before following.
    pub fn require_subscription(&mut self, creator_id: &str) {
        self.subscription_creators.insert(creator_id.to_string());
    }

    pub fn is_liked(&self, video_id: &str) -> bool {
        self.liked.contains(video_id)
    }

    pub fn is_saved(&self, video_id: &str) -> bool {
        self.saved.contains(video_id)
    }

    pub fn is_following(&self, creator_id: &str) -> bool {
        self.following.contains(creator_id)
    }

    pub fn is_subscribed(&self, creator_id: &str) -> bool {
        self.subscribed.contains(creator_id)
    }

    pub fn toggle_like(&mut self, video_id: &str) -> bool {
        let liked = toggle(&mut self.liked, video_id);
        self.sink.record(&RelationshipChange::Liked {
            video_id: video_id.to_string(),
            liked,
        });
        liked
    }

    pub fn toggle_save(&mut self, video_id: &str) -> bool {
        let saved = toggle(&mut self.saved, video_id);
        self.sink.record(&RelationshipChange::Saved {
            video_id: video_id.to_string(),
            saved,
        });
        saved
    }

    pub fn follow(&mut self, creator_id: &str) -> FollowOutcome {
        if self.subscription_creators.contains(creator_id) && !self.is_subscribed(creator_id) {
            return FollowOutcome::SubscriptionRequired;
        }
        self.set_following(creator_id, true);
        FollowOutcome::Following
    }

    pub fn unfollow(&mut self, creator_id: &str) -> UnfollowOutcome {
        if self.subscription_creators.contains(creator_id) && self.is_subscribed(creator_id) {
            return UnfollowOutcome::ConfirmationRequired;
        }
        self.set_following(creator_id, false);
        UnfollowOutcome::Unfollowed
    }

    /// Unfollows and drops the subscription.
    pub fn confirm_unfollow(&mut self, creator_id: &str) {
        self.set_following(creator_id, false);
        self.set_subscribed(creator_id, false);
    }

    /// Subscribing also follows.
    pub fn mark_subscribed(&mut self, creator_id: &str) {
        self.set_subscribed(creator_id, true);
        self.set_following(creator_id, true);
    }

    /// Copies the viewer-relative flags onto a user record.
    pub fn annotate_user(&self, user: &mut User) {
        user.is_following = Some(self.is_following(&user.id));
        user.is_subscribed = Some(self.is_subscribed(&user.id));
    }

    pub fn annotate_video(&self, video: &mut Video) {
        self.annotate_user(&mut video.uploader);
    }

    fn set_following(&mut self, creator_id: &str, following: bool) {
        if set_membership(&mut self.following, creator_id, following) {
            self.sink.record(&RelationshipChange::Followed {
                creator_id: creator_id.to_string(),
                following,
            });
        }
    }

    fn set_subscribed(&mut self, creator_id: &str, subscribed: bool) {
        if set_membership(&mut self.subscribed, creator_id, subscribed) {
            self.sink.record(&RelationshipChange::Subscribed {
                creator_id: creator_id.to_string(),
                subscribed,
            });
        }
    }
}

fn toggle(members: &mut HashSet<String>, id: &str) -> bool {
    if members.remove(id) {
        false
    } else {
        members.insert(id.to_string());
        true
    }
}

/// Returns true when membership changed.
fn set_membership(members: &mut HashSet<String>, id: &str, member: bool) -> bool {
    if member {
        members.insert(id.to_string())
    } else {
        members.remove(id)
    }
}

/// Stand-in for a payment round trip.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionFlow {
    delay: Duration,
}

impl Default for SubscriptionFlow {
    fn default() -> Self {
        Self::new(DEFAULT_PAYMENT_DELAY)
    }
}

impl SubscriptionFlow {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits out the simulated payment, then subscribes and follows.
    pub async fn subscribe(&self, state: &mut RelationshipState, creator_id: &str) {
        tracing::debug!(
            creator_id,
            delay_ms = self.delay.as_millis() as u64,
            "simulating payment"
        );
        tokio::time::sleep(self.delay).await;
        state.mark_subscribed(creator_id);
        tracing::info!(creator_id, "subscribed");
    }
}
