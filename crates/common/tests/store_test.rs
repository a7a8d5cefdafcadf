//! Integration tests against a real Redis instance, grounded on the
//! teacher's testcontainers-based redis tests.

use std::sync::Arc;

use testcontainers::runners::AsyncRunner;
use testcontainers_modules::redis::Redis;
use uuid::Uuid;

use relaykit_common::broker::Broker;
use relaykit_common::engine::Engine;
use relaykit_common::notifications::NotificationEngine;
use relaykit_common::store::Store;
use relaykit_common::types::{CommentableRef, ReactionKind, TargetRef, ToggleAction};

async fn test_store() -> (Store, testcontainers::ContainerAsync<Redis>) {
    let container = Redis::default().start().await.expect("start redis container");
    let port = container.get_host_port_ipv4(6379).await.expect("redis port");
    let store = Store::new(&format!("redis://127.0.0.1:{port}")).await.expect("connect store");
    (store, container)
}

async fn test_engine() -> (Engine, testcontainers::ContainerAsync<Redis>) {
    let container = Redis::default().start().await.expect("start redis container");
    let port = container.get_host_port_ipv4(6379).await.expect("redis port");
    let url = format!("redis://127.0.0.1:{port}");
    let store = Arc::new(Store::new(&url).await.expect("connect store"));
    let broker = Arc::new(Broker::new(&url).await.expect("connect broker"));
    (Engine::new(store, broker), container)
}

#[tokio::test]
async fn test_create_and_get_post_roundtrip() {
    let (store, _container) = test_store().await;
    let author_id = Uuid::now_v7();

    let post = store.create_post(author_id, "hello", "first post", None, vec![]).await.unwrap();
    let fetched = store.get_post(post.id).await.unwrap().unwrap();

    assert_eq!(fetched.title, "hello");
    assert_eq!(fetched.author_id, author_id);
}

#[tokio::test]
async fn test_reaction_toggle_state_machine() {
    let (store, _container) = test_store().await;
    let author_id = Uuid::now_v7();
    let actor_id = Uuid::now_v7();

    let post = store.create_post(author_id, "t", "d", None, vec![]).await.unwrap();
    let target = TargetRef::Post(post.id);

    let added = store.toggle_reaction(actor_id, target, ReactionKind::Like).await.unwrap();
    assert_eq!(added.action, ToggleAction::Added);
    assert_eq!(added.reactions_count, 1);

    let changed = store.toggle_reaction(actor_id, target, ReactionKind::Love).await.unwrap();
    assert_eq!(changed.action, ToggleAction::Changed);
    assert_eq!(changed.reactions_count, 1);

    let removed = store.toggle_reaction(actor_id, target, ReactionKind::Love).await.unwrap();
    assert_eq!(removed.action, ToggleAction::Removed);
    assert_eq!(removed.reactions_count, 0);
}

#[tokio::test]
async fn test_deep_thread_cascade_delete() {
    let (store, _container) = test_store().await;
    let author_id = Uuid::now_v7();

    let post = store.create_post(author_id, "t", "d", None, vec![]).await.unwrap();
    let c1 = store.create_comment(author_id, CommentableRef::Post(post.id), "c1").await.unwrap();
    let c2 = store.create_comment(author_id, CommentableRef::Comment(c1.id), "c2").await.unwrap();
    let _c3 = store.create_comment(author_id, CommentableRef::Comment(c2.id), "c3").await.unwrap();

    // invariant #2: comments_count counts the whole thread (C1, C2, C3), not
    // just direct children of the post.
    let post_before = store.get_post(post.id).await.unwrap().unwrap();
    assert_eq!(post_before.comments_count, 3);

    let deleted = store.delete_comment(author_id, c1.id).await.unwrap();
    assert_eq!(deleted.len(), 3);

    let post_after = store.get_post(post.id).await.unwrap().unwrap();
    assert_eq!(post_after.comments_count, 0);
}

/// Reactions and Notifications whose subject is a comment are destroyed
/// along with the comment (spec.md §3 lifecycle); a reply's reaction rows
/// must not survive its parent's deletion either.
#[tokio::test]
async fn test_delete_comment_cascades_reactions_and_notifications() {
    let (store, _container) = test_store().await;
    let author_id = Uuid::now_v7();
    let actor_id = Uuid::now_v7();

    let post = store.create_post(author_id, "t", "d", None, vec![]).await.unwrap();
    let c1 = store.create_comment(author_id, CommentableRef::Post(post.id), "c1").await.unwrap();

    store.toggle_reaction(actor_id, TargetRef::Comment(c1.id), ReactionKind::Like).await.unwrap();
    let notification = store
        .create_notification(author_id, actor_id, relaykit_common::types::NotificationKind::Mention, relaykit_common::types::SubjectRef::Comment(c1.id))
        .await
        .unwrap()
        .expect("notification created");

    store.delete_comment(author_id, c1.id).await.unwrap();

    assert_eq!(store.get_viewer_reaction(actor_id, TargetRef::Comment(c1.id)).await.unwrap(), None);
    assert!(store.get_notification(notification.id).await.unwrap().is_none());

    // the dedup key must also be cleared, or a legitimate future mention on
    // a comment reusing that subject id would be silently suppressed.
    let recreated = store
        .create_notification(author_id, actor_id, relaykit_common::types::NotificationKind::Mention, relaykit_common::types::SubjectRef::Comment(c1.id))
        .await
        .unwrap();
    assert!(recreated.is_some());
}

#[tokio::test]
async fn test_reconcile_counters_fixes_drift() {
    let (store, _container) = test_store().await;
    let author_id = Uuid::now_v7();

    let post = store.create_post(author_id, "t", "d", None, vec![]).await.unwrap();
    let c1 = store.create_comment(author_id, CommentableRef::Post(post.id), "c1").await.unwrap();
    store.create_comment(author_id, CommentableRef::Comment(c1.id), "c2").await.unwrap();

    // invariant #2 again: reconciliation must count the whole subtree (C1
    // and its reply C2), not just direct children of the post.
    store.reconcile_counters().await.unwrap();
    let reconciled = store.get_post(post.id).await.unwrap().unwrap();
    assert_eq!(reconciled.comments_count, 2);
}

#[tokio::test]
async fn test_mark_read_is_idempotent() {
    let (store, _container) = test_store().await;
    let recipient = Uuid::now_v7();
    let actor = Uuid::now_v7();

    let notification = store
        .create_notification(recipient, actor, relaykit_common::types::NotificationKind::Mention, relaykit_common::types::SubjectRef::Post(Uuid::now_v7()))
        .await
        .unwrap()
        .expect("notification created");

    let first = store.mark_read(recipient, notification.id).await.unwrap();
    let second = store.mark_read(recipient, notification.id).await.unwrap();

    assert!(first);
    assert!(!second);
}

/// spec.md §8 scenario 3: liking then changing the reaction kind produces
/// exactly one notification, from the original `added`, not from the later
/// `changed`.
#[tokio::test]
async fn test_reaction_kind_change_notifies_only_once() {
    let (engine, _container) = test_engine().await;
    let author_id = Uuid::now_v7();
    let actor_id = Uuid::now_v7();

    let post = engine.store.create_post(author_id, "t", "a post body", None, vec![]).await.unwrap();
    let target = TargetRef::Post(post.id);

    engine.toggle_reaction(actor_id, target, ReactionKind::Like).await.unwrap();
    engine.toggle_reaction(actor_id, target, ReactionKind::Love).await.unwrap();

    let (notifications, total) = engine.store.list_notifications(author_id, 1, 50, false).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, relaykit_common::types::NotificationKind::ReactionOnPost);
}

/// spec.md §8: self-actions never produce a notification, even when the
/// actor toggles a reaction on their own post.
#[tokio::test]
async fn test_self_reaction_produces_no_notification() {
    let (engine, _container) = test_engine().await;
    let author_id = Uuid::now_v7();

    let post = engine.store.create_post(author_id, "t", "a post body", None, vec![]).await.unwrap();
    engine.toggle_reaction(author_id, TargetRef::Post(post.id), ReactionKind::Like).await.unwrap();

    let (_notifications, total) = engine.store.list_notifications(author_id, 1, 50, false).await.unwrap();
    assert_eq!(total, 0);
}

/// spec.md §4.7 dedup rule: a mention Notification is created only once per
/// `(recipient, subject)`, even if the same mention text is processed twice.
#[tokio::test]
async fn test_mention_dedup_per_recipient_and_subject() {
    let (store, _container) = test_store().await;
    let recipient = Uuid::now_v7();
    let actor = Uuid::now_v7();
    let subject = relaykit_common::types::SubjectRef::Post(Uuid::now_v7());

    let first = store
        .create_notification(recipient, actor, relaykit_common::types::NotificationKind::Mention, subject)
        .await
        .unwrap();
    let second = store
        .create_notification(recipient, actor, relaykit_common::types::NotificationKind::Mention, subject)
        .await
        .unwrap();

    assert!(first.is_some());
    assert!(second.is_none());
}

/// spec.md §4.7 scenario 5: two distinct handles in a post body resolve to
/// two distinct recipients, each notified once.
#[tokio::test]
async fn test_mention_notifications_for_distinct_users() {
    let (store, _container) = test_store().await;
    let author = store.create_user("author", "author@example.com", "hash", "tok-author").await.unwrap();
    let alice = store.create_user("alice", "alice@example.com", "hash", "tok-alice").await.unwrap();
    let bob = store.create_user("bob", "bob@example.com", "hash", "tok-bob").await.unwrap();

    let post = store
        .create_post(author.id, "hello", "hey @alice and @alice@example.com and @bob", None, vec![])
        .await
        .unwrap();

    let notifications = NotificationEngine::new(&store);
    let created = notifications.derive_for_post(post.id, author.id, &post.description).await.unwrap();

    assert_eq!(created.len(), 2);
    let recipients: std::collections::HashSet<Uuid> = created.iter().map(|n| n.recipient_id).collect();
    assert_eq!(recipients, std::collections::HashSet::from([alice.id, bob.id]));
}

/// Deleting a Post deletes every descendant Comment, every Reaction on the
/// post and its comments, and every Notification whose subject resolves to
/// one of those destroyed entities (spec.md §8 boundary, §3 lifecycle).
#[tokio::test]
async fn test_delete_post_cascades_reactions_and_notifications() {
    let (store, _container) = test_store().await;
    let author_id = Uuid::now_v7();
    let actor_id = Uuid::now_v7();

    let post = store.create_post(author_id, "t", "d", None, vec![]).await.unwrap();
    let c1 = store.create_comment(author_id, CommentableRef::Post(post.id), "c1").await.unwrap();

    store.toggle_reaction(actor_id, TargetRef::Post(post.id), ReactionKind::Like).await.unwrap();
    store.toggle_reaction(actor_id, TargetRef::Comment(c1.id), ReactionKind::Love).await.unwrap();

    let on_post = store
        .create_notification(author_id, actor_id, relaykit_common::types::NotificationKind::Mention, relaykit_common::types::SubjectRef::Post(post.id))
        .await
        .unwrap()
        .expect("post-subject notification created");
    let on_comment = store
        .create_notification(author_id, actor_id, relaykit_common::types::NotificationKind::Mention, relaykit_common::types::SubjectRef::Comment(c1.id))
        .await
        .unwrap()
        .expect("comment-subject notification created");

    let deleted = store.delete_post(author_id, post.id).await.unwrap();
    assert_eq!(deleted, vec![c1.id]);

    assert_eq!(store.get_viewer_reaction(actor_id, TargetRef::Post(post.id)).await.unwrap(), None);
    assert_eq!(store.get_viewer_reaction(actor_id, TargetRef::Comment(c1.id)).await.unwrap(), None);
    assert!(store.get_notification(on_post.id).await.unwrap().is_none());
    assert!(store.get_notification(on_comment.id).await.unwrap().is_none());
}
