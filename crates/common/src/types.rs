use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// ============================================================================
// User
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub confirmed: bool,
    pub confirmation_token: Option<String>,
    pub reset_token: Option<String>,
    pub reset_token_sent_at: Option<DateTime<Utc>>,
    /// `jti` of the current live refresh credential, if any. Used by
    /// AuthBridge::refresh to detect replay of an already-rotated token.
    pub refresh_token: Option<String>,
    pub refresh_token_sent_at: Option<DateTime<Utc>>,
    pub posts_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserPublic {
    pub id: Uuid,
    pub name: String,
    pub bio: Option<String>,
    pub posts_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        UserPublic {
            id: user.id,
            name: user.name,
            bio: user.bio,
            posts_count: user.posts_count,
            created_at: user.created_at,
        }
    }
}

impl From<&User> for UserPublic {
    fn from(user: &User) -> Self {
        UserPublic {
            id: user.id,
            name: user.name.clone(),
            bio: user.bio.clone(),
            posts_count: user.posts_count,
            created_at: user.created_at,
        }
    }
}

// ============================================================================
// Polymorphic references (spec.md §9: tagged-variant sum types, not inheritance)
// ============================================================================

/// What a Comment is attached to: a Post directly, or another Comment (a reply).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CommentableRef {
    Post(Uuid),
    Comment(Uuid),
}

/// What a Reaction applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TargetRef {
    Post(Uuid),
    Comment(Uuid),
}

/// What a Notification points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SubjectRef {
    Post(Uuid),
    Comment(Uuid),
    Reaction(Uuid),
}

/// Redis hash field encoding for a tagged ref: `(kind_str, id)`.
pub trait RefField: Sized {
    fn kind_str(&self) -> &'static str;
    fn id(&self) -> Uuid;
    fn from_parts(kind: &str, id: Uuid) -> Option<Self>;
}

impl RefField for CommentableRef {
    fn kind_str(&self) -> &'static str {
        match self {
            CommentableRef::Post(_) => "post",
            CommentableRef::Comment(_) => "comment",
        }
    }
    fn id(&self) -> Uuid {
        match self {
            CommentableRef::Post(id) | CommentableRef::Comment(id) => *id,
        }
    }
    fn from_parts(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "post" => Some(CommentableRef::Post(id)),
            "comment" => Some(CommentableRef::Comment(id)),
            _ => None,
        }
    }
}

impl RefField for TargetRef {
    fn kind_str(&self) -> &'static str {
        match self {
            TargetRef::Post(_) => "post",
            TargetRef::Comment(_) => "comment",
        }
    }
    fn id(&self) -> Uuid {
        match self {
            TargetRef::Post(id) | TargetRef::Comment(id) => *id,
        }
    }
    fn from_parts(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "post" => Some(TargetRef::Post(id)),
            "comment" => Some(TargetRef::Comment(id)),
            _ => None,
        }
    }
}

impl RefField for SubjectRef {
    fn kind_str(&self) -> &'static str {
        match self {
            SubjectRef::Post(_) => "post",
            SubjectRef::Comment(_) => "comment",
            SubjectRef::Reaction(_) => "reaction",
        }
    }
    fn id(&self) -> Uuid {
        match self {
            SubjectRef::Post(id) | SubjectRef::Comment(id) | SubjectRef::Reaction(id) => *id,
        }
    }
    fn from_parts(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "post" => Some(SubjectRef::Post(id)),
            "comment" => Some(SubjectRef::Comment(id)),
            "reaction" => Some(SubjectRef::Reaction(id)),
            _ => None,
        }
    }
}

// ============================================================================
// Post
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub description: String,
    pub image_ref: Option<String>,
    pub reactions_count: i64,
    pub comments_count: i64,
    pub tag_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostWithAuthor {
    #[serde(flatten)]
    pub post: Post,
    pub author: UserPublic,
    pub tags: Vec<Tag>,
    pub viewer_reaction: Option<ReactionKind>,
}

// ============================================================================
// Comment
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Comment {
    pub id: Uuid,
    pub author_id: Uuid,
    pub commentable: CommentableRef,
    /// Shortcut populated at creation time so `root_post` is O(1) regardless
    /// of nesting depth (spec.md §4.5).
    pub root_post_id: Uuid,
    pub description: String,
    pub reactions_count: i64,
    pub replies_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentWithAuthor {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: UserPublic,
    pub viewer_reaction: Option<ReactionKind>,
}

// ============================================================================
// Reaction
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Love,
    Dislike,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Reaction {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub target: TargetRef,
    pub kind: ReactionKind,
    pub created_at: DateTime<Utc>,
}

/// Outcome of `ReactionToggle::toggle`, spec.md §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleAction {
    Added,
    Changed,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub action: ToggleAction,
    pub reaction: Option<Reaction>,
    pub reactions_count: i64,
}

// ============================================================================
// Tag
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub posts_count: i64,
}

// ============================================================================
// Notification
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CommentOnPost,
    ReplyToComment,
    Mention,
    ReactionOnPost,
    ReactionOnComment,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub actor_id: Uuid,
    pub kind: NotificationKind,
    pub subject: SubjectRef,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Topic (Broker / SessionHub logical stream keys — spec.md §3)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Posts,
    PostComments(Uuid),
    CommentReplies(Uuid),
    UserNotifications(Uuid),
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topic::Posts => write!(f, "posts"),
            Topic::PostComments(id) => write!(f, "post:{id}/comments"),
            Topic::CommentReplies(id) => write!(f, "comment:{id}/replies"),
            Topic::UserNotifications(id) => write!(f, "user:{id}/notifications"),
        }
    }
}

impl std::str::FromStr for Topic {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "posts" {
            return Ok(Topic::Posts);
        }
        if let Some(rest) = s.strip_prefix("post:").and_then(|r| r.strip_suffix("/comments")) {
            return Uuid::parse_str(rest).map(Topic::PostComments).map_err(|_| "bad post id");
        }
        if let Some(rest) = s.strip_prefix("comment:").and_then(|r| r.strip_suffix("/replies")) {
            return Uuid::parse_str(rest).map(Topic::CommentReplies).map_err(|_| "bad comment id");
        }
        if let Some(rest) = s.strip_prefix("user:").and_then(|r| r.strip_suffix("/notifications")) {
            return Uuid::parse_str(rest).map(Topic::UserNotifications).map_err(|_| "bad user id");
        }
        Err("unrecognized topic")
    }
}

impl Topic {
    /// Whether `session_user` may subscribe to this topic (spec.md §4.3:
    /// a session may subscribe to any public topic, but only its own
    /// notification topic).
    pub fn subscribable_by(&self, session_user: Uuid) -> bool {
        match self {
            Topic::Posts | Topic::PostComments(_) | Topic::CommentReplies(_) => true,
            Topic::UserNotifications(uid) => *uid == session_user,
        }
    }
}

// ============================================================================
// Broker envelope (spec.md §6.2)
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeAction {
    New,
    Update,
    Delete,
    ReactionUpdate,
    NotificationNew,
    NotificationRead,
    NotificationAllRead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub action: EnvelopeAction,
    pub entity_kind: &'static str,
    pub body: serde_json::Value,
}

// ============================================================================
// Pagination
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct PaginationMeta {
    pub current_page: u32,
    pub per_page: u32,
    pub total_count: i64,
    pub total_pages: u32,
}

pub const MAX_PER_PAGE: u32 = 50;

impl PaginationMeta {
    pub fn new(current_page: u32, per_page: u32, total_count: i64) -> Self {
        let per_page = per_page.min(MAX_PER_PAGE).max(1);
        let total_pages = if total_count <= 0 {
            0
        } else {
            ((total_count as u64 + per_page as u64 - 1) / per_page as u64) as u32
        };
        PaginationMeta {
            current_page,
            per_page,
            total_count,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_roundtrip() {
        let id = Uuid::now_v7();
        for topic in [
            Topic::Posts,
            Topic::PostComments(id),
            Topic::CommentReplies(id),
            Topic::UserNotifications(id),
        ] {
            let s = topic.to_string();
            let parsed: Topic = s.parse().unwrap();
            assert_eq!(parsed, topic);
        }
    }

    #[test]
    fn test_topic_subscribable_by() {
        let me = Uuid::now_v7();
        let other = Uuid::now_v7();
        assert!(Topic::Posts.subscribable_by(me));
        assert!(Topic::UserNotifications(me).subscribable_by(me));
        assert!(!Topic::UserNotifications(other).subscribable_by(me));
    }

    #[test]
    fn test_pagination_clamps_per_page() {
        let meta = PaginationMeta::new(1, 1000, 120);
        assert_eq!(meta.per_page, MAX_PER_PAGE);
        assert_eq!(meta.total_pages, 3);
    }
}
