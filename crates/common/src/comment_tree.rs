//! CommentTree (spec.md §4.5): read-side helpers over the Store's
//! parent-pointer comment graph — ancestor walks and whole-subtree listing.
//! Store already keeps `root_post_id` and per-parent children indices;
//! this module composes those primitives instead of duplicating storage.

use uuid::Uuid;

use crate::store::Store;
use crate::types::{Comment, CommentableRef};
use crate::Result;

/// All comments attached directly or transitively under `post_id`, ordered
/// breadth-first from the root (most recent siblings first within a level,
/// matching `Store::list_children`'s ordering).
pub async fn subtree(store: &Store, post_id: Uuid) -> Result<Vec<Comment>> {
    let mut out = Vec::new();
    let mut frontier = vec![CommentableRef::Post(post_id)];
    while let Some(parent) = frontier.pop() {
        let children = store.list_children(parent).await?;
        for child in children {
            frontier.push(CommentableRef::Comment(child.id));
            out.push(child);
        }
    }
    Ok(out)
}

/// Walks from `comment_id` up to (but not including) its root Post,
/// returning ancestors nearest-first. Used by NotificationEngine to find
/// who else is in a reply thread (spec.md §4.7 `ReplyToComment` derivation).
pub async fn ancestors(store: &Store, comment_id: Uuid) -> Result<Vec<Comment>> {
    let mut out = Vec::new();
    let mut current = store.get_comment(comment_id).await?;
    while let Some(comment) = current {
        let next = match comment.commentable {
            CommentableRef::Comment(parent_id) => store.get_comment(parent_id).await?,
            CommentableRef::Post(_) => None,
        };
        out.push(comment);
        current = next;
    }
    out
}

/// The root Post id for any comment, O(1) via the denormalized
/// `Comment.root_post_id` field (spec.md §4.5).
pub async fn root_post(store: &Store, comment_id: Uuid) -> Result<Option<Uuid>> {
    Ok(store.get_comment(comment_id).await?.map(|c| c.root_post_id))
}
