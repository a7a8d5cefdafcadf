//! FanOut (spec.md §4.4): a pure mapping from "something changed" to the set
//! of topics that should hear about it, and the Envelope each one gets. No
//! I/O here — `Engine` calls `topics_for` after a Store mutation commits and
//! hands the results to `Broker::publish`.

use serde::Serialize;
use uuid::Uuid;

use crate::types::{Comment, Envelope, EnvelopeAction, Notification, Post, ReactionKind, TargetRef, Topic};

/// Something that just happened in the Store, described at a level FanOut can
/// route without re-deriving it from raw field diffs.
pub enum MutationEvent {
    PostCreated(Post),
    PostUpdated(Post),
    PostDeleted { id: Uuid },
    CommentCreated(Comment),
    CommentUpdated(Comment),
    CommentDeleted { id: Uuid, post_id: Uuid, parent_comment_id: Option<Uuid> },
    /// `topics` is precomputed by the caller (`Engine`, which has Store
    /// access) since routing a reaction on a *comment* needs that comment's
    /// root post / parent — context `TargetRef` alone doesn't carry.
    ReactionToggled { topics: Vec<Topic>, target: TargetRef, kind: ReactionKind, reactions_count: i64 },
    NotificationCreated(Notification),
    NotificationRead { user_id: Uuid, notification_id: Uuid },
    NotificationsAllRead { user_id: Uuid },
}

fn envelope<T: Serialize>(action: EnvelopeAction, entity_kind: &'static str, body: &T) -> Envelope {
    Envelope { action, entity_kind, body: serde_json::to_value(body).unwrap_or(serde_json::Value::Null) }
}

/// Event → topic table (spec.md §4.4):
/// - Post created/updated/deleted → the global `Posts` topic.
/// - Comment created/updated/deleted → `PostComments(root_post)`, and also
///   `CommentReplies(parent)` when it's a reply.
/// - Reaction toggled → the topic of whichever entity it targets.
/// - Notification events → the recipient's own `UserNotifications` topic only.
pub fn topics_for(event: &MutationEvent) -> Vec<(Topic, Envelope)> {
    match event {
        MutationEvent::PostCreated(post) => vec![(Topic::Posts, envelope(EnvelopeAction::New, "post", post))],
        MutationEvent::PostUpdated(post) => vec![(Topic::Posts, envelope(EnvelopeAction::Update, "post", post))],
        MutationEvent::PostDeleted { id } => vec![(Topic::Posts, envelope(EnvelopeAction::Delete, "post", &id.to_string()))],

        MutationEvent::CommentCreated(comment) => {
            let mut out = vec![(Topic::PostComments(comment.root_post_id), envelope(EnvelopeAction::New, "comment", comment))];
            if let crate::types::CommentableRef::Comment(parent_id) = comment.commentable {
                out.push((Topic::CommentReplies(parent_id), envelope(EnvelopeAction::New, "comment", comment)));
            }
            out
        }
        MutationEvent::CommentUpdated(comment) => {
            let mut out = vec![(Topic::PostComments(comment.root_post_id), envelope(EnvelopeAction::Update, "comment", comment))];
            if let crate::types::CommentableRef::Comment(parent_id) = comment.commentable {
                out.push((Topic::CommentReplies(parent_id), envelope(EnvelopeAction::Update, "comment", comment)));
            }
            out
        }
        MutationEvent::CommentDeleted { id, post_id, parent_comment_id } => {
            let mut out = vec![(Topic::PostComments(*post_id), envelope(EnvelopeAction::Delete, "comment", &id.to_string()))];
            if let Some(parent_id) = parent_comment_id {
                out.push((Topic::CommentReplies(*parent_id), envelope(EnvelopeAction::Delete, "comment", &id.to_string())));
            }
            out
        }

        MutationEvent::ReactionToggled { topics, target, kind, reactions_count } => {
            #[derive(Serialize)]
            struct ReactionUpdate {
                target: TargetRef,
                kind: ReactionKind,
                reactions_count: i64,
            }
            let body = ReactionUpdate { target: *target, kind: *kind, reactions_count: *reactions_count };
            let env = envelope(EnvelopeAction::ReactionUpdate, "reaction", &body);
            topics.iter().map(|t| (*t, env.clone())).collect()
        }

        MutationEvent::NotificationCreated(n) => {
            vec![(Topic::UserNotifications(n.recipient_id), envelope(EnvelopeAction::NotificationNew, "notification", n))]
        }
        MutationEvent::NotificationRead { user_id, notification_id } => {
            vec![(
                Topic::UserNotifications(*user_id),
                envelope(EnvelopeAction::NotificationRead, "notification", &notification_id.to_string()),
            )]
        }
        MutationEvent::NotificationsAllRead { user_id } => {
            vec![(Topic::UserNotifications(*user_id), envelope(EnvelopeAction::NotificationAllRead, "notification", &()))]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::types::CommentableRef;

    fn sample_comment(root_post_id: Uuid, commentable: CommentableRef) -> Comment {
        Comment {
            id: Uuid::now_v7(),
            author_id: Uuid::now_v7(),
            commentable,
            root_post_id,
            description: "hi".into(),
            reactions_count: 0,
            replies_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_top_level_comment_only_hits_post_topic() {
        let post_id = Uuid::now_v7();
        let comment = sample_comment(post_id, CommentableRef::Post(post_id));
        let routed = topics_for(&MutationEvent::CommentCreated(comment));
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].0, Topic::PostComments(post_id));
    }

    #[test]
    fn test_reply_hits_both_post_and_parent_topics() {
        let post_id = Uuid::now_v7();
        let parent_id = Uuid::now_v7();
        let comment = sample_comment(post_id, CommentableRef::Comment(parent_id));
        let routed = topics_for(&MutationEvent::CommentCreated(comment));
        assert_eq!(routed.len(), 2);
        assert!(routed.iter().any(|(t, _)| *t == Topic::PostComments(post_id)));
        assert!(routed.iter().any(|(t, _)| *t == Topic::CommentReplies(parent_id)));
    }

    #[test]
    fn test_notification_only_reaches_recipient_topic() {
        let recipient = Uuid::now_v7();
        let n = Notification {
            id: Uuid::now_v7(),
            recipient_id: recipient,
            actor_id: Uuid::now_v7(),
            kind: crate::types::NotificationKind::Mention,
            subject: crate::types::SubjectRef::Post(Uuid::now_v7()),
            read: false,
            created_at: Utc::now(),
        };
        let routed = topics_for(&MutationEvent::NotificationCreated(n));
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].0, Topic::UserNotifications(recipient));
    }
}
