//! Engine: the façade HTTP handlers call. Composes Store + Broker +
//! NotificationEngine so each mutation follows the same shape every time
//! (spec.md §2, §4.1): commit the Store write (counters update inside that
//! same call), then best-effort fan the result out to subscribers and derive
//! notifications. Publish/derive failures are logged, not propagated — the
//! mutation already committed and does not roll back for a downstream
//! delivery problem (spec.md §4.1 commit-hook contract).

use std::sync::Arc;
use uuid::Uuid;

use crate::broker::Broker;
use crate::fanout::{self, MutationEvent};
use crate::notifications::NotificationEngine;
use crate::store::Store;
use crate::types::{Comment, CommentableRef, Post, ReactionKind, TargetRef, ToggleOutcome};
use crate::Result;

pub struct Engine {
    pub store: Arc<Store>,
    broker: Arc<Broker>,
}

impl Engine {
    pub fn new(store: Arc<Store>, broker: Arc<Broker>) -> Self {
        Engine { store, broker }
    }

    async fn publish(&self, event: MutationEvent) {
        for (topic, envelope) in fanout::topics_for(&event) {
            if let Err(e) = self.broker.publish(&topic, &envelope).await {
                tracing::error!("fanout publish failed for {topic}: {e}");
            }
        }
    }

    pub async fn create_post(&self, author_id: Uuid, title: &str, description: &str, image_ref: Option<String>, tag_ids: Vec<Uuid>) -> Result<Post> {
        let post = self.store.create_post(author_id, title, description, image_ref, tag_ids).await?;
        self.publish(MutationEvent::PostCreated(post.clone())).await;

        let notifications = NotificationEngine::new(&self.store);
        match notifications.derive_for_post(post.id, author_id, &post.description).await {
            Ok(created) => {
                for n in created {
                    self.publish(MutationEvent::NotificationCreated(n)).await;
                }
            }
            Err(e) => tracing::error!("notification derivation failed for post {}: {e}", post.id),
        }

        Ok(post)
    }

    pub async fn update_post(&self, actor_id: Uuid, id: Uuid, title: Option<String>, description: Option<String>) -> Result<Post> {
        let post = self.store.update_post(actor_id, id, title, description).await?;
        self.publish(MutationEvent::PostUpdated(post.clone())).await;
        Ok(post)
    }

    pub async fn delete_post(&self, actor_id: Uuid, id: Uuid) -> Result<()> {
        self.store.delete_post(actor_id, id).await?;
        self.publish(MutationEvent::PostDeleted { id }).await;
        Ok(())
    }

    /// A comment landing anywhere in a post's thread also refreshes that
    /// post's preview on the global feed (spec.md §4.4: "`posts` with
    /// updated Post view, to refresh counters/previews"), since
    /// `comments_count` just changed.
    async fn publish_post_refresh(&self, post_id: Uuid) {
        match self.store.get_post(post_id).await {
            Ok(Some(post)) => self.publish(MutationEvent::PostUpdated(post)).await,
            Ok(None) => {}
            Err(e) => tracing::error!("post refresh fetch failed for {post_id}: {e}"),
        }
    }

    pub async fn create_comment(&self, author_id: Uuid, commentable: CommentableRef, description: &str) -> Result<Comment> {
        let comment = self.store.create_comment(author_id, commentable, description).await?;
        self.publish(MutationEvent::CommentCreated(comment.clone())).await;
        self.publish_post_refresh(comment.root_post_id).await;

        let notifications = NotificationEngine::new(&self.store);
        match notifications.derive_for_comment(&comment).await {
            Ok(created) => {
                for n in created {
                    self.publish(MutationEvent::NotificationCreated(n)).await;
                }
            }
            Err(e) => tracing::error!("notification derivation failed for comment {}: {e}", comment.id),
        }

        Ok(comment)
    }

    pub async fn update_comment(&self, actor_id: Uuid, id: Uuid, description: &str) -> Result<Comment> {
        let comment = self.store.update_comment(actor_id, id, description).await?;
        self.publish(MutationEvent::CommentUpdated(comment.clone())).await;
        self.publish_post_refresh(comment.root_post_id).await;
        Ok(comment)
    }

    pub async fn delete_comment(&self, actor_id: Uuid, id: Uuid) -> Result<()> {
        let Some(comment) = self.store.get_comment(id).await? else {
            return Err(crate::Error::NotFound("comment".into()));
        };
        let parent_comment_id = match comment.commentable {
            CommentableRef::Comment(parent_id) => Some(parent_id),
            CommentableRef::Post(_) => None,
        };
        let post_id = comment.root_post_id;

        let deleted_ids = self.store.delete_comment(actor_id, id).await?;
        for deleted_id in &deleted_ids {
            self.publish(MutationEvent::CommentDeleted { id: *deleted_id, post_id, parent_comment_id }).await;
        }
        self.publish_post_refresh(post_id).await;
        Ok(())
    }

    /// Reaction toggle routing (spec.md §4.4/§4.6): a reaction on a Post
    /// fans out on the global `posts` topic (refreshing that post's
    /// preview); a reaction on a Comment fans out only on its root post's
    /// comment-thread topic.
    pub async fn toggle_reaction(&self, actor_id: Uuid, target: TargetRef, kind: ReactionKind) -> Result<ToggleOutcome> {
        let outcome = self.store.toggle_reaction(actor_id, target, kind).await?;

        let topics = match target {
            TargetRef::Post(_) => vec![crate::types::Topic::Posts],
            TargetRef::Comment(comment_id) => {
                let mut topics = Vec::new();
                if let Some(comment) = self.store.get_comment(comment_id).await? {
                    topics.push(crate::types::Topic::PostComments(comment.root_post_id));
                }
                topics
            }
        };
        self.publish(MutationEvent::ReactionToggled { topics, target, kind, reactions_count: outcome.reactions_count }).await;

        if let Some(reaction) = &outcome.reaction {
            let notifications = NotificationEngine::new(&self.store);
            match notifications.derive_for_reaction(actor_id, target, outcome.action, reaction.id).await {
                Ok(Some(n)) => self.publish(MutationEvent::NotificationCreated(n)).await,
                Ok(None) => {}
                Err(e) => tracing::error!("notification derivation failed for reaction on {target:?}: {e}"),
            }
        }

        Ok(outcome)
    }

    pub async fn mark_notification_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<bool> {
        let changed = self.store.mark_read(user_id, notification_id).await?;
        if changed {
            self.publish(MutationEvent::NotificationRead { user_id, notification_id }).await;
        }
        Ok(changed)
    }

    pub async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<i64> {
        let count = self.store.mark_all_read(user_id).await?;
        if count > 0 {
            self.publish(MutationEvent::NotificationsAllRead { user_id }).await;
        }
        Ok(count)
    }
}
