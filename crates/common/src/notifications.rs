//! NotificationEngine (spec.md §4.7, C7): derives Notification rows from
//! mutations. Dedup-by-`(recipient, subject)` and row persistence live in
//! Store; this module decides *who* gets notified and *why*, then calls
//! Store once per candidate recipient. Self-action suppression (you never
//! get notified about your own activity) lives here, not in Store, since
//! Store has no notion of "the actor who triggered this".

use uuid::Uuid;

use crate::mentions::{self, MentionToken};
use crate::store::Store;
use crate::types::{Comment, CommentableRef, Notification, NotificationKind, ReactionKind, SubjectRef, TargetRef, ToggleAction};
use crate::validation::fold_case;
use crate::Result;

pub struct NotificationEngine<'a> {
    store: &'a Store,
}

impl<'a> NotificationEngine<'a> {
    pub fn new(store: &'a Store) -> Self {
        NotificationEngine { store }
    }

    /// Called after a Comment is created. Derives up to three kinds of
    /// notification, each suppressed when the recipient is the comment's own
    /// author and deduplicated against the same `(recipient, subject)` pair
    /// so a post author who is also mentioned only gets one notification
    /// (spec.md §8 "each resolved recipient is notified at most once per
    /// mutation").
    pub async fn derive_for_comment(&self, comment: &Comment) -> Result<Vec<Notification>> {
        let mut seen = std::collections::HashSet::new();
        let mut created = Vec::new();

        let thread_recipient = match comment.commentable {
            CommentableRef::Post(post_id) => {
                self.store.get_post(post_id).await?.map(|p| (p.author_id, NotificationKind::CommentOnPost, SubjectRef::Comment(comment.id)))
            }
            CommentableRef::Comment(parent_id) => {
                self.store.get_comment(parent_id).await?.map(|p| (p.author_id, NotificationKind::ReplyToComment, SubjectRef::Comment(comment.id)))
            }
        };

        if let Some((recipient, kind, subject)) = thread_recipient {
            if recipient != comment.author_id && seen.insert(recipient) {
                if let Some(n) = self.store.create_notification(recipient, comment.author_id, kind, subject).await? {
                    created.push(n);
                }
            }
        }

        for recipient in self.resolve_mentions(&comment.description).await? {
            if recipient != comment.author_id && seen.insert(recipient) {
                if let Some(n) = self
                    .store
                    .create_notification(recipient, comment.author_id, NotificationKind::Mention, SubjectRef::Comment(comment.id))
                    .await?
                {
                    created.push(n);
                }
            }
        }

        Ok(created)
    }

    /// Mentions in a Post's description notify resolved users directly,
    /// independent of any comment thread.
    pub async fn derive_for_post(&self, post_id: Uuid, author_id: Uuid, description: &str) -> Result<Vec<Notification>> {
        let mut created = Vec::new();
        for recipient in self.resolve_mentions(description).await? {
            if recipient != author_id {
                if let Some(n) = self
                    .store
                    .create_notification(recipient, author_id, NotificationKind::Mention, SubjectRef::Post(post_id))
                    .await?
                {
                    created.push(n);
                }
            }
        }
        Ok(created)
    }

    /// Called after a reaction toggle. Only `Added` produces a notification —
    /// `Changed`/`Removed` are not renewed engagement, they're edits to
    /// engagement that already notified once (spec.md §4.7: "only a reaction
    /// being added derives a notification").
    pub async fn derive_for_reaction(&self, actor_id: Uuid, target: TargetRef, action: ToggleAction, reaction_id: Uuid) -> Result<Option<Notification>> {
        if action != ToggleAction::Added {
            return Ok(None);
        }

        let (recipient, kind) = match target {
            TargetRef::Post(post_id) => {
                let Some(post) = self.store.get_post(post_id).await? else { return Ok(None) };
                (post.author_id, NotificationKind::ReactionOnPost)
            }
            TargetRef::Comment(comment_id) => {
                let Some(comment) = self.store.get_comment(comment_id).await? else { return Ok(None) };
                (comment.author_id, NotificationKind::ReactionOnComment)
            }
        };

        if recipient == actor_id {
            return Ok(None);
        }

        self.store.create_notification(recipient, actor_id, kind, SubjectRef::Reaction(reaction_id)).await
    }

    /// Resolves raw mention tokens to known, distinct users.
    async fn resolve_mentions(&self, text: &str) -> Result<Vec<Uuid>> {
        let mut resolved = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for token in mentions::extract(text) {
            let user = match &token {
                MentionToken::Name(name) => self.store.get_user_by_name(&fold_case(name)).await?,
                MentionToken::Email(email) => self.store.get_user_by_email(&fold_case(email)).await?,
            };
            if let Some(user) = user {
                if seen.insert(user.id) {
                    resolved.push(user.id);
                }
            }
        }
        Ok(resolved)
    }

    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<bool> {
        self.store.mark_read(user_id, notification_id).await
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<i64> {
        self.store.mark_all_read(user_id).await
    }
}
