//! Store (spec.md §4.1): the durable entity store. Redis-backed, one hash per
//! entity plus sorted-set indices for ordering, mirroring the teacher's
//! `redis.rs` layout (hash-per-entity, `hgetall_json`/`hsetall_json` generic
//! (de)serialization, `SCRIPT LOAD`+`EVALSHA` for the one operation that needs
//! real atomicity). Every other mutation here is a handful of sequential Redis
//! commands — `HINCRBY` is atomic on its own, and nothing but reaction toggles
//! has two actors racing on the same row (spec.md §4.6).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fred::prelude::*;
use fred::types::{ClusterHash, CustomCommand, Resp3Frame};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{
    Comment, CommentableRef, Notification, NotificationKind, PaginationMeta, Post, Reaction, ReactionKind, RefField,
    SubjectRef, Tag, TargetRef, ToggleAction, ToggleOutcome, User,
};
use crate::validation::fold_case;
use crate::{Error, Result};

const TOGGLE_REACTION_LUA: &str = include_str!("../../../lua/toggle_reaction.lua");

/// Hash fields that must never be round-tripped through `serde_json::from_str`
/// — plain numeric-looking strings (a name like "1999", a token) would
/// otherwise parse as a JSON number and come back out the wrong type.
const STRING_FIELDS: &[&str] = &[
    "name", "email", "password_hash", "bio", "confirmation_token", "reset_token", "refresh_token", "title",
    "description", "color", "image_ref", "id", "actor_id", "target_id", "target_kind", "kind",
];

pub struct Store {
    client: Client,
    toggle_reaction_sha: String,
}

impl Store {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let config = Config::from_url(redis_url).map_err(Error::Redis)?;
        let client = Builder::from_config(config).build().map_err(Error::Redis)?;
        client.init().await.map_err(Error::Redis)?;

        let toggle_reaction_sha = load_script(&client, TOGGLE_REACTION_LUA).await?;

        Ok(Store { client, toggle_reaction_sha })
    }

    pub async fn ping(&self) -> Result<()> {
        let _: String = self.client.ping(None).await.map_err(Error::Redis)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        hgetall_json(&self.client, &user_key(id)).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let id: Option<String> = self.client.get(email_index_key(email)).await.map_err(Error::Redis)?;
        match id {
            Some(id) => self.get_user(parse_uuid(&id)?).await,
            None => Ok(None),
        }
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let id: Option<String> = self.client.get(name_index_key(name)).await.map_err(Error::Redis)?;
        match id {
            Some(id) => self.get_user(parse_uuid(&id)?).await,
            None => Ok(None),
        }
    }

    /// Registers a new user. Fails with `Conflict` if the email or name is
    /// already taken (spec.md §4.8 uniqueness invariant).
    pub async fn create_user(&self, name: &str, email: &str, password_hash: &str, confirmation_token: &str) -> Result<User> {
        let email_key = email_index_key(email);
        let name_key = name_index_key(name);

        let email_taken: bool = self.client.exists(&email_key).await.map_err(Error::Redis)?;
        if email_taken {
            return Err(Error::Conflict("email already registered".into()));
        }
        let name_taken: bool = self.client.exists(&name_key).await.map_err(Error::Redis)?;
        if name_taken {
            return Err(Error::Conflict("name already taken".into()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            bio: None,
            confirmed: false,
            confirmation_token: Some(confirmation_token.to_string()),
            reset_token: None,
            reset_token_sent_at: None,
            refresh_token: None,
            refresh_token_sent_at: None,
            posts_count: 0,
            created_at: now,
            updated_at: now,
        };

        hsetall_json(&self.client, &user_key(user.id), &user).await?;
        self.client.set::<(), _, _>(&email_key, user.id.to_string(), None, None, false).await.map_err(Error::Redis)?;
        self.client.set::<(), _, _>(&name_key, user.id.to_string(), None, None, false).await.map_err(Error::Redis)?;
        self.client
            .set::<(), _, _>(confirmation_token_key(confirmation_token), user.id.to_string(), None, None, false)
            .await
            .map_err(Error::Redis)?;

        Ok(user)
    }

    pub async fn confirm_user(&self, token: &str) -> Result<Option<User>> {
        let id: Option<String> = self.client.get(confirmation_token_key(token)).await.map_err(Error::Redis)?;
        let Some(id) = id else { return Ok(None) };
        let id = parse_uuid(&id)?;
        let Some(mut user) = self.get_user(id).await? else { return Ok(None) };
        user.confirmed = true;
        user.confirmation_token = None;
        user.updated_at = Utc::now();
        hsetall_json(&self.client, &user_key(id), &user).await?;
        self.client.del::<(), _>(confirmation_token_key(token)).await.map_err(Error::Redis)?;
        Ok(Some(user))
    }

    pub async fn set_reset_token(&self, user_id: Uuid, token: &str) -> Result<()> {
        let Some(mut user) = self.get_user(user_id).await? else {
            return Err(Error::NotFound("user".into()));
        };
        user.reset_token = Some(token.to_string());
        user.reset_token_sent_at = Some(Utc::now());
        hsetall_json(&self.client, &user_key(user_id), &user).await?;
        self.client.set::<(), _, _>(reset_token_key(token), user_id.to_string(), None, None, false).await.map_err(Error::Redis)?;
        Ok(())
    }

    /// Consumes a reset token and sets the new password hash. Returns `None`
    /// if the token is unknown or already used.
    pub async fn consume_reset_token(&self, token: &str, new_password_hash: &str) -> Result<Option<User>> {
        let id: Option<String> = self.client.get(reset_token_key(token)).await.map_err(Error::Redis)?;
        let Some(id) = id else { return Ok(None) };
        let id = parse_uuid(&id)?;
        let Some(mut user) = self.get_user(id).await? else { return Ok(None) };
        user.password_hash = new_password_hash.to_string();
        user.reset_token = None;
        user.updated_at = Utc::now();
        hsetall_json(&self.client, &user_key(id), &user).await?;
        self.client.del::<(), _>(reset_token_key(token)).await.map_err(Error::Redis)?;
        Ok(Some(user))
    }

    /// Records the `jti` of the currently-live refresh token, or clears it on
    /// logout. A second presentation of a rotated-away token then fails
    /// `verify_token`'s `jti` comparison (spec.md §8: "refresh is single-use").
    pub async fn set_refresh_jti(&self, user_id: Uuid, jti: Option<String>) -> Result<()> {
        let Some(mut user) = self.get_user(user_id).await? else {
            return Err(Error::NotFound("user".into()));
        };
        user.refresh_token = jti;
        user.refresh_token_sent_at = Some(Utc::now());
        hsetall_json(&self.client, &user_key(user_id), &user).await
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    pub async fn create_post(&self, author_id: Uuid, title: &str, description: &str, image_ref: Option<String>, tag_ids: Vec<Uuid>) -> Result<Post> {
        let Some(mut author) = self.get_user(author_id).await? else {
            return Err(Error::NotFound("user".into()));
        };

        let now = Utc::now();
        let post = Post {
            id: Uuid::now_v7(),
            author_id,
            title: title.to_string(),
            description: description.to_string(),
            image_ref,
            reactions_count: 0,
            comments_count: 0,
            tag_ids: tag_ids.clone(),
            created_at: now,
            updated_at: now,
        };

        hsetall_json(&self.client, &post_key(post.id), &post).await?;
        self.client
            .zadd::<(), _, _>(POSTS_INDEX_KEY, None, None, false, false, (now.timestamp_millis() as f64, post.id.to_string()))
            .await
            .map_err(Error::Redis)?;
        self.client
            .zadd::<(), _, _>(
                &author_posts_index_key(author_id),
                None,
                None,
                false,
                false,
                (now.timestamp_millis() as f64, post.id.to_string()),
            )
            .await
            .map_err(Error::Redis)?;

        for tag_id in &tag_ids {
            self.client.hincrby::<i64, _, _>(tag_key(*tag_id), "posts_count", 1).await.map_err(Error::Redis)?;
        }

        author.posts_count += 1;
        hsetall_json(&self.client, &user_key(author_id), &author).await?;

        Ok(post)
    }

    pub async fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        hgetall_json(&self.client, &post_key(id)).await
    }

    pub async fn list_posts(&self, page: u32, per_page: u32, author_id: Option<Uuid>) -> Result<(Vec<Post>, i64)> {
        let index_key = match author_id {
            Some(id) => author_posts_index_key(id),
            None => POSTS_INDEX_KEY.to_string(),
        };

        let meta = PaginationMeta::new(page.max(1), per_page, 0);
        let start = ((meta.current_page - 1) * meta.per_page) as i64;
        let stop = start + meta.per_page as i64 - 1;

        let total: i64 = self.client.zcard(&index_key).await.map_err(Error::Redis)?;
        let ids: Vec<String> = self.client.zrevrange(&index_key, start, stop, false).await.map_err(Error::Redis)?;

        let mut posts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(post) = self.get_post(parse_uuid(&id)?).await? {
                posts.push(post);
            }
        }
        Ok((posts, total))
    }

    pub async fn update_post(&self, actor_id: Uuid, id: Uuid, title: Option<String>, description: Option<String>) -> Result<Post> {
        let Some(mut post) = self.get_post(id).await? else {
            return Err(Error::NotFound("post".into()));
        };
        if post.author_id != actor_id {
            return Err(Error::Forbidden);
        }
        if let Some(title) = title {
            post.title = title;
        }
        if let Some(description) = description {
            post.description = description;
        }
        post.updated_at = Utc::now();
        hsetall_json(&self.client, &post_key(id), &post).await?;
        Ok(post)
    }

    /// Deletes a post and cascades to every descendant comment, their
    /// reactions, and every Notification whose subject resolves to the post
    /// or one of its descendants (spec.md §4.5's "deleting a Post deletes its
    /// entire Comment subtree" invariant; spec.md §3 Notification lifecycle:
    /// "destroyed when its subject is destroyed"). Returns the ids of every
    /// deleted comment so callers can emit FanOut events.
    pub async fn delete_post(&self, actor_id: Uuid, id: Uuid) -> Result<Vec<Uuid>> {
        let Some(post) = self.get_post(id).await? else {
            return Err(Error::NotFound("post".into()));
        };
        if post.author_id != actor_id {
            return Err(Error::Forbidden);
        }

        let deleted_comment_ids = self.delete_comment_subtree(CommentableRef::Post(id)).await?;
        self.delete_target_reactions(TargetRef::Post(id)).await?;
        self.delete_notifications_for_subject(SubjectRef::Post(id)).await?;

        self.client.del::<(), _>(post_key(id)).await.map_err(Error::Redis)?;
        self.client.zrem::<(), _, _>(POSTS_INDEX_KEY, id.to_string()).await.map_err(Error::Redis)?;
        self.client.zrem::<(), _, _>(&author_posts_index_key(post.author_id), id.to_string()).await.map_err(Error::Redis)?;
        for tag_id in &post.tag_ids {
            self.client.hincrby::<i64, _, _>(tag_key(*tag_id), "posts_count", -1).await.map_err(Error::Redis)?;
        }
        if let Some(mut author) = self.get_user(post.author_id).await? {
            author.posts_count = (author.posts_count - 1).max(0);
            hsetall_json(&self.client, &user_key(post.author_id), &author).await?;
        }

        Ok(deleted_comment_ids)
    }

    // ------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------

    pub async fn create_comment(&self, author_id: Uuid, commentable: CommentableRef, description: &str) -> Result<Comment> {
        let root_post_id = match commentable {
            CommentableRef::Post(post_id) => {
                if self.get_post(post_id).await?.is_none() {
                    return Err(Error::NotFound("post".into()));
                }
                post_id
            }
            CommentableRef::Comment(parent_id) => {
                let Some(parent) = self.get_comment(parent_id).await? else {
                    return Err(Error::NotFound("comment".into()));
                };
                parent.root_post_id
            }
        };

        let now = Utc::now();
        let comment = Comment {
            id: Uuid::now_v7(),
            author_id,
            commentable,
            root_post_id,
            description: description.to_string(),
            reactions_count: 0,
            replies_count: 0,
            created_at: now,
            updated_at: now,
        };

        hsetall_json(&self.client, &comment_key(comment.id), &comment).await?;
        self.client
            .zadd::<(), _, _>(
                &children_key(commentable),
                None,
                None,
                false,
                false,
                (now.timestamp_millis() as f64, comment.id.to_string()),
            )
            .await
            .map_err(Error::Redis)?;

        // invariant #2: comments_count = |{c : root_post(c) = P}|, every
        // comment in the thread, not just P's direct children — so the root
        // post's counter is bumped on every create, and the immediate parent
        // comment's replies_count is bumped on top of that when it's a reply.
        if let Some(mut root_post) = self.get_post(root_post_id).await? {
            root_post.comments_count += 1;
            hsetall_json(&self.client, &post_key(root_post_id), &root_post).await?;
        }
        if let CommentableRef::Comment(parent_id) = commentable {
            if let Some(mut parent) = self.get_comment(parent_id).await? {
                parent.replies_count += 1;
                hsetall_json(&self.client, &comment_key(parent_id), &parent).await?;
            }
        }

        Ok(comment)
    }

    pub async fn get_comment(&self, id: Uuid) -> Result<Option<Comment>> {
        hgetall_json(&self.client, &comment_key(id)).await
    }

    pub async fn list_children(&self, commentable: CommentableRef) -> Result<Vec<Comment>> {
        let ids: Vec<String> = self
            .client
            .zrevrange(&children_key(commentable), 0, -1, false)
            .await
            .map_err(Error::Redis)?;
        let mut comments = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(comment) = self.get_comment(parse_uuid(&id)?).await? {
                comments.push(comment);
            }
        }
        Ok(comments)
    }

    pub async fn update_comment(&self, actor_id: Uuid, id: Uuid, description: &str) -> Result<Comment> {
        let Some(mut comment) = self.get_comment(id).await? else {
            return Err(Error::NotFound("comment".into()));
        };
        if comment.author_id != actor_id {
            return Err(Error::Forbidden);
        }
        comment.description = description.to_string();
        comment.updated_at = Utc::now();
        hsetall_json(&self.client, &comment_key(id), &comment).await?;
        Ok(comment)
    }

    /// Deletes a comment and its reply subtree. Returns every deleted
    /// comment id (including `id` itself).
    pub async fn delete_comment(&self, actor_id: Uuid, id: Uuid) -> Result<Vec<Uuid>> {
        let Some(comment) = self.get_comment(id).await? else {
            return Err(Error::NotFound("comment".into()));
        };
        if comment.author_id != actor_id {
            return Err(Error::Forbidden);
        }

        let mut deleted = self.delete_comment_subtree(CommentableRef::Comment(id)).await?;
        self.delete_target_reactions(TargetRef::Comment(id)).await?;
        self.delete_notifications_for_subject(SubjectRef::Comment(id)).await?;

        self.client.del::<(), _>(comment_key(id)).await.map_err(Error::Redis)?;
        self.client
            .zrem::<(), _, _>(&children_key(comment.commentable), id.to_string())
            .await
            .map_err(Error::Redis)?;

        deleted.push(id);

        // invariant #2: the root post's comments_count drops by the whole
        // deleted subtree's size, not just the one comment whose delete was
        // requested — E2E scenario #4 (C1 -> C2 -> C3, deleting C1 drops
        // comments_count by 3).
        let subtree_size = deleted.len() as i64;
        if let Some(mut root_post) = self.get_post(comment.root_post_id).await? {
            root_post.comments_count = (root_post.comments_count - subtree_size).max(0);
            hsetall_json(&self.client, &post_key(comment.root_post_id), &root_post).await?;
        }
        if let CommentableRef::Comment(parent_id) = comment.commentable {
            if let Some(mut parent) = self.get_comment(parent_id).await? {
                parent.replies_count = (parent.replies_count - 1).max(0);
                hsetall_json(&self.client, &comment_key(parent_id), &parent).await?;
            }
        }

        Ok(deleted)
    }

    /// Depth-first deletes every descendant comment under `root` (not `root`
    /// itself), dropping each comment's reaction rows and subject-keyed
    /// Notifications with it.
    async fn delete_comment_subtree(&self, root: CommentableRef) -> Result<Vec<Uuid>> {
        let mut deleted = Vec::new();
        let mut frontier = vec![root];
        while let Some(parent) = frontier.pop() {
            let children = self.list_children(parent).await?;
            for child in children {
                self.client.del::<(), _>(comment_key(child.id)).await.map_err(Error::Redis)?;
                self.delete_target_reactions(TargetRef::Comment(child.id)).await?;
                self.delete_notifications_for_subject(SubjectRef::Comment(child.id)).await?;
                frontier.push(CommentableRef::Comment(child.id));
                deleted.push(child.id);
            }
            self.client.del::<(), _>(&children_key(parent)).await.map_err(Error::Redis)?;
        }
        Ok(deleted)
    }

    /// Deletes every reaction row on `target`, via the reactor-id index
    /// `toggle_reaction` maintains, and the Notifications whose subject is
    /// one of those reactions (a reaction Notification is destroyed along
    /// with the reaction it reports on).
    async fn delete_target_reactions(&self, target: TargetRef) -> Result<()> {
        let reactors_key = reactors_key(target);
        let actor_ids: Vec<String> = self.client.smembers(&reactors_key).await.map_err(Error::Redis)?;
        for actor_id in actor_ids {
            let actor_id = parse_uuid(&actor_id)?;
            let key = reaction_key(actor_id, target);
            let reaction_id: Option<String> = self.client.hget(&key, "id").await.map_err(Error::Redis)?;
            self.client.del::<(), _>(&key).await.map_err(Error::Redis)?;
            if let Some(reaction_id) = reaction_id {
                self.delete_notifications_for_subject(SubjectRef::Reaction(parse_uuid(&reaction_id)?)).await?;
            }
        }
        self.client.del::<(), _>(&reactors_key).await.map_err(Error::Redis)?;
        Ok(())
    }

    /// Deletes every Notification whose subject is `subject`, plus its dedup
    /// keys, so destroying the subject doesn't leave orphaned Notifications
    /// behind (spec.md §3 Notification lifecycle) and a later legitimate
    /// mention on a fresh subject isn't suppressed by a stale dedup key.
    async fn delete_notifications_for_subject(&self, subject: SubjectRef) -> Result<()> {
        let subject_key = subject_notifications_key(subject);
        let notification_ids: Vec<String> = self.client.smembers(&subject_key).await.map_err(Error::Redis)?;
        for id in &notification_ids {
            let notification_id = parse_uuid(id)?;
            if let Some(notification) = self.get_notification(notification_id).await? {
                self.client.del::<(), _>(notification_key(notification_id)).await.map_err(Error::Redis)?;
                self.client
                    .zrem::<(), _, _>(&user_notifications_key(notification.recipient_id), notification_id.to_string())
                    .await
                    .map_err(Error::Redis)?;
                self.client
                    .srem::<(), _, _>(&user_unread_notifications_key(notification.recipient_id), notification_id.to_string())
                    .await
                    .map_err(Error::Redis)?;
                self.client
                    .del::<(), _>(&notification_dedup_key(notification.recipient_id, subject))
                    .await
                    .map_err(Error::Redis)?;
            }
        }
        self.client.del::<(), _>(&subject_key).await.map_err(Error::Redis)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reactions
    // ------------------------------------------------------------------

    /// Atomically toggles `actor_id`'s reaction on `target` to `kind` and
    /// adjusts the target's `reactions_count`, via the `toggle_reaction` Lua
    /// script (spec.md §4.6 state machine: none→Added, same kind→Removed,
    /// different kind→Changed, all in a single round trip so two concurrent
    /// togglers can't double-increment the counter).
    pub async fn toggle_reaction(&self, actor_id: Uuid, target: TargetRef, kind: ReactionKind) -> Result<ToggleOutcome> {
        let reaction_key = reaction_key(actor_id, target);
        let target_key = match target {
            TargetRef::Post(id) => post_key(id),
            TargetRef::Comment(id) => comment_key(id),
        };
        let reactors_key = reactors_key(target);
        let new_reaction_id = Uuid::now_v7();
        let now = Utc::now();

        let cmd = CustomCommand::new("EVALSHA", ClusterHash::FirstKey, false);
        let args: Vec<Value> = vec![
            self.toggle_reaction_sha.clone().into(),
            "3".into(),
            reaction_key.clone().into(),
            target_key.into(),
            reactors_key.into(),
            kind_str(kind).into(),
            new_reaction_id.to_string().into(),
            actor_id.to_string().into(),
            target.kind_str().into(),
            target.id().to_string().into(),
            now.to_rfc3339().into(),
        ];

        let frame: Resp3Frame = self.client.custom_raw(cmd, args).await.map_err(Error::Redis)?;
        let parts = parse_toggle_frame(frame)?;

        let action = match parts.0.as_str() {
            "added" => ToggleAction::Added,
            "changed" => ToggleAction::Changed,
            "removed" => ToggleAction::Removed,
            other => return Err(Error::Transient(format!("unexpected toggle_reaction result: {other}"))),
        };

        let reaction = match action {
            ToggleAction::Removed => None,
            ToggleAction::Added => Some(Reaction { id: new_reaction_id, actor_id, target, kind, created_at: now }),
            ToggleAction::Changed => Some(Reaction { id: parts.1, actor_id, target, kind, created_at: now }),
        };

        Ok(ToggleOutcome { action, reaction, reactions_count: parts.2 })
    }

    pub async fn get_viewer_reaction(&self, actor_id: Uuid, target: TargetRef) -> Result<Option<ReactionKind>> {
        let kind: Option<String> = self.client.hget(reaction_key(actor_id, target), "kind").await.map_err(Error::Redis)?;
        Ok(kind.and_then(|k| parse_reaction_kind(&k)))
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    pub async fn get_or_create_tag(&self, name: &str, color: &str) -> Result<Tag> {
        let index_key = tag_name_index_key(name);
        let existing: Option<String> = self.client.get(&index_key).await.map_err(Error::Redis)?;
        if let Some(id) = existing {
            if let Some(tag) = self.get_tag(parse_uuid(&id)?).await? {
                return Ok(tag);
            }
        }

        let tag = Tag { id: Uuid::now_v7(), name: name.to_string(), color: color.to_string(), posts_count: 0 };
        hsetall_json(&self.client, &tag_key(tag.id), &tag).await?;
        self.client.set::<(), _, _>(&index_key, tag.id.to_string(), None, None, false).await.map_err(Error::Redis)?;
        Ok(tag)
    }

    pub async fn get_tag(&self, id: Uuid) -> Result<Option<Tag>> {
        hgetall_json(&self.client, &tag_key(id)).await
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    /// Inserts a Notification unless one with the same `(recipient, subject)`
    /// already exists (spec.md §4.7 dedup invariant). Returns `None` when
    /// suppressed by the dedup check; self-action suppression is the caller's
    /// responsibility (NotificationEngine), since Store has no notion of
    /// "the action that triggered this".
    pub async fn create_notification(&self, recipient_id: Uuid, actor_id: Uuid, kind: NotificationKind, subject: SubjectRef) -> Result<Option<Notification>> {
        let dedup_key = notification_dedup_key(recipient_id, subject);
        let inserted: bool = self
            .client
            .set(&dedup_key, "1", None, Some(SetOptions::NX), false)
            .await
            .map_err(Error::Redis)?;
        if !inserted {
            return Ok(None);
        }

        let now = Utc::now();
        let notification = Notification { id: Uuid::now_v7(), recipient_id, actor_id, kind, subject, read: false, created_at: now };
        hsetall_json(&self.client, &notification_key(notification.id), &notification).await?;
        self.client
            .zadd::<(), _, _>(
                &user_notifications_key(recipient_id),
                None,
                None,
                false,
                false,
                (now.timestamp_millis() as f64, notification.id.to_string()),
            )
            .await
            .map_err(Error::Redis)?;
        self.client
            .sadd::<(), _, _>(&user_unread_notifications_key(recipient_id), notification.id.to_string())
            .await
            .map_err(Error::Redis)?;
        self.client
            .sadd::<(), _, _>(&subject_notifications_key(subject), notification.id.to_string())
            .await
            .map_err(Error::Redis)?;

        Ok(Some(notification))
    }

    pub async fn list_notifications(&self, user_id: Uuid, page: u32, per_page: u32, unread_only: bool) -> Result<(Vec<Notification>, i64)> {
        let meta = PaginationMeta::new(page.max(1), per_page, 0);
        let start = ((meta.current_page - 1) * meta.per_page) as i64;
        let stop = start + meta.per_page as i64 - 1;

        let total: i64 = self.client.zcard(&user_notifications_key(user_id)).await.map_err(Error::Redis)?;
        let ids: Vec<String> = self
            .client
            .zrevrange(&user_notifications_key(user_id), start, stop, false)
            .await
            .map_err(Error::Redis)?;

        let mut notifications = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(n) = self.get_notification(parse_uuid(&id)?).await? {
                if !unread_only || !n.read {
                    notifications.push(n);
                }
            }
        }
        Ok((notifications, total))
    }

    pub async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        hgetall_json(&self.client, &notification_key(id)).await
    }

    pub async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let Some(mut notification) = self.get_notification(id).await? else {
            return Ok(false);
        };
        if notification.recipient_id != user_id || notification.read {
            return Ok(false);
        }
        notification.read = true;
        hsetall_json(&self.client, &notification_key(id), &notification).await?;
        self.client
            .srem::<(), _, _>(&user_unread_notifications_key(user_id), id.to_string())
            .await
            .map_err(Error::Redis)?;
        Ok(true)
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<i64> {
        let unread_ids: Vec<String> = self
            .client
            .smembers(&user_unread_notifications_key(user_id))
            .await
            .map_err(Error::Redis)?;
        let mut count = 0i64;
        for id in unread_ids {
            if self.mark_read(user_id, parse_uuid(&id)?).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = self.client.scard(&user_unread_notifications_key(user_id)).await.map_err(Error::Redis)?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Recomputes `comments_count` on every Post from its full comment
    /// subtree (invariant #2: `comments_count = |{c : root_post(c) = P}|`,
    /// every comment in the thread, not just P's direct children), and logs
    /// (but does not silently fix) any Reaction counter drift, since a
    /// drifting `reactions_count` usually means the Lua script's invariant
    /// was violated rather than something safe to paper over. Intended to be
    /// run periodically out-of-band (spec.md §8: "derived counters stay
    /// consistent with their source rows").
    pub async fn reconcile_counters(&self) -> Result<()> {
        let post_ids: Vec<String> = self.client.zrange(POSTS_INDEX_KEY, 0, -1, None, false, None, false).await.map_err(Error::Redis)?;
        for id in post_ids {
            let id = parse_uuid(&id)?;
            let actual = self.count_comment_subtree(CommentableRef::Post(id)).await?;
            if let Some(mut post) = self.get_post(id).await? {
                if post.comments_count != actual {
                    tracing::warn!(post_id = %id, stored = post.comments_count, actual, "reconciling comments_count drift");
                    post.comments_count = actual;
                    hsetall_json(&self.client, &post_key(id), &post).await?;
                }
            }
        }
        Ok(())
    }

    /// Counts every comment in `root`'s subtree (not just direct children),
    /// depth-first, mirroring `delete_comment_subtree`'s traversal.
    async fn count_comment_subtree(&self, root: CommentableRef) -> Result<i64> {
        let mut total = 0i64;
        let mut frontier = vec![root];
        while let Some(parent) = frontier.pop() {
            let ids: Vec<String> = self.client.zrevrange(&children_key(parent), 0, -1, false).await.map_err(Error::Redis)?;
            for id in &ids {
                frontier.push(CommentableRef::Comment(parse_uuid(id)?));
            }
            total += ids.len() as i64;
        }
        Ok(total)
    }
}

// ==========================================================================
// Key helpers
// ==========================================================================

const POSTS_INDEX_KEY: &str = "posts:index";

fn user_key(id: Uuid) -> String {
    format!("user:{id}")
}
fn email_index_key(email: &str) -> String {
    format!("user_email_idx:{}", fold_case(email))
}
fn name_index_key(name: &str) -> String {
    format!("user_name_idx:{}", fold_case(name))
}
fn confirmation_token_key(token: &str) -> String {
    format!("user_confirm_tok:{token}")
}
fn reset_token_key(token: &str) -> String {
    format!("user_reset_tok:{token}")
}
fn post_key(id: Uuid) -> String {
    format!("post:{id}")
}
fn author_posts_index_key(author_id: Uuid) -> String {
    format!("user:{author_id}:posts")
}
fn comment_key(id: Uuid) -> String {
    format!("comment:{id}")
}
fn children_key(commentable: CommentableRef) -> String {
    format!("{}:{}:children", commentable.kind_str(), commentable.id())
}
fn reaction_key(actor_id: Uuid, target: TargetRef) -> String {
    format!("reaction:{actor_id}:{}:{}", target.kind_str(), target.id())
}
fn reactors_key(target: TargetRef) -> String {
    format!("reactors:{}:{}", target.kind_str(), target.id())
}
fn tag_key(id: Uuid) -> String {
    format!("tag:{id}")
}
fn tag_name_index_key(name: &str) -> String {
    format!("tag_name_idx:{}", fold_case(name))
}
fn notification_key(id: Uuid) -> String {
    format!("notification:{id}")
}
fn user_notifications_key(user_id: Uuid) -> String {
    format!("user:{user_id}:notifications")
}
fn user_unread_notifications_key(user_id: Uuid) -> String {
    format!("user:{user_id}:unread_notifications")
}
fn subject_notifications_key(subject: SubjectRef) -> String {
    format!("notif_by_subject:{}:{}", subject.kind_str(), subject.id())
}
fn notification_dedup_key(recipient_id: Uuid, subject: SubjectRef) -> String {
    format!("notif_dedup:{recipient_id}:{}:{}", subject.kind_str(), subject.id())
}

fn kind_str(kind: ReactionKind) -> &'static str {
    match kind {
        ReactionKind::Like => "like",
        ReactionKind::Love => "love",
        ReactionKind::Dislike => "dislike",
    }
}

fn parse_reaction_kind(s: &str) -> Option<ReactionKind> {
    match s {
        "like" => Some(ReactionKind::Like),
        "love" => Some(ReactionKind::Love),
        "dislike" => Some(ReactionKind::Dislike),
        _ => None,
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|_| Error::Transient(format!("corrupt id in store: {s}")))
}

// ==========================================================================
// Script loading / EVALSHA plumbing, grounded on the teacher's atomic_vote
// ==========================================================================

async fn load_script(client: &Client, source: &str) -> Result<String> {
    let cmd = CustomCommand::new("SCRIPT", ClusterHash::FirstKey, false);
    let frame: Resp3Frame = client
        .custom_raw(cmd, vec![Value::String("LOAD".into()), Value::String(source.into())])
        .await
        .map_err(Error::Redis)?;
    match frame {
        Resp3Frame::BlobString { data, .. } => Ok(String::from_utf8_lossy(&data).to_string()),
        Resp3Frame::SimpleString { data, .. } => Ok(String::from_utf8_lossy(&data).to_string()),
        other => Err(Error::Transient(format!("unexpected SCRIPT LOAD reply: {other:?}"))),
    }
}

fn parse_toggle_frame(frame: Resp3Frame) -> Result<(String, Uuid, i64)> {
    match frame {
        Resp3Frame::Array { data, .. } if data.len() == 3 => {
            let action = frame_to_string(&data[0])?;
            let id = parse_uuid(&frame_to_string(&data[1])?)?;
            let count: i64 = frame_to_string(&data[2])?.parse().unwrap_or(0);
            Ok((action, id, count))
        }
        Resp3Frame::SimpleError { data, .. } | Resp3Frame::BlobError { data, .. } => {
            Err(Error::Transient(format!("toggle_reaction script error: {}", String::from_utf8_lossy(&data))))
        }
        other => Err(Error::Transient(format!("unexpected toggle_reaction reply shape: {other:?}"))),
    }
}

fn frame_to_string(frame: &Resp3Frame) -> Result<String> {
    match frame {
        Resp3Frame::BlobString { data, .. } | Resp3Frame::SimpleString { data, .. } => Ok(String::from_utf8_lossy(data).to_string()),
        other => Err(Error::Transient(format!("expected string frame, got {other:?}"))),
    }
}

// ==========================================================================
// Generic hash<->JSON helpers, ported from the teacher's redis.rs
// ==========================================================================

async fn hgetall_json<T: DeserializeOwned>(client: &Client, key: &str) -> Result<Option<T>> {
    let fields: HashMap<String, String> = client.hgetall(key).await.map_err(Error::Redis)?;
    if fields.is_empty() {
        return Ok(None);
    }

    let mut map = serde_json::Map::with_capacity(fields.len());
    for (field, raw) in fields {
        let value = if STRING_FIELDS.contains(&field.as_str()) {
            Value::String(raw)
        } else {
            serde_json::from_str(&raw).unwrap_or(Value::String(raw))
        };
        map.insert(field, value);
    }

    let value = serde_json::from_value(Value::Object(map))?;
    Ok(Some(value))
}

/// Writes every field of `value` into the hash at `key`. A field that
/// serializes to `null` (e.g. `confirmation_token: None` after it's
/// consumed) is `HDEL`ed rather than skipped — leaving a stale value behind
/// would let a cleared token, or a rotated-away refresh `jti`, keep matching
/// on the next lookup.
async fn hsetall_json<T: Serialize>(client: &Client, key: &str, value: &T) -> Result<()> {
    let Value::Object(map) = serde_json::to_value(value)? else {
        return Err(Error::Transient("hsetall_json requires a struct".into()));
    };

    let mut fields: Vec<(String, String)> = Vec::with_capacity(map.len());
    let mut nulled_fields: Vec<String> = Vec::new();
    for (field, value) in map {
        let raw = match value {
            Value::Null => {
                nulled_fields.push(field);
                continue;
            }
            Value::String(s) => s,
            other => other.to_string(),
        };
        fields.push((field, raw));
    }

    if !fields.is_empty() {
        client.hset::<(), _, _>(key, fields).await.map_err(Error::Redis)?;
    }
    if !nulled_fields.is_empty() {
        client.hdel::<(), _, _>(key, nulled_fields).await.map_err(Error::Redis)?;
    }
    Ok(())
}
