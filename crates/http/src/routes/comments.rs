use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use relaykit_common::types::{CommentWithAuthor, CommentableRef, TargetRef};
use relaykit_common::validation::validate_comment_description;
use relaykit_common::Error;

use crate::error::AppError;
use crate::extractors::{AuthUser, MaybeAuthUser};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts/{id}/comments", get(list_post_comments).post(create_post_comment))
        .route("/comments/{id}/comments", post(create_reply))
        .route("/comments/{id}", get(get_comment).put(update_comment).delete(delete_comment))
}

async fn list_post_comments(State(state): State<AppState>, MaybeAuthUser(viewer): MaybeAuthUser, Path(post_id): Path<Uuid>) -> Result<Json<Vec<CommentWithAuthor>>, AppError> {
    if state.engine.store.get_post(post_id).await?.is_none() {
        return Err(Error::NotFound("post".into()).into());
    }
    hydrate_children(&state, CommentableRef::Post(post_id), viewer.map(|u| u.user_id)).await
}

async fn get_comment(State(state): State<AppState>, MaybeAuthUser(viewer): MaybeAuthUser, Path(id): Path<Uuid>) -> Result<Json<CommentWithAuthor>, AppError> {
    let comment = state.engine.store.get_comment(id).await?.ok_or(Error::NotFound("comment".into()))?;
    Ok(Json(hydrate_comment(&state, comment, viewer.map(|u| u.user_id)).await?))
}

#[derive(Deserialize)]
struct CreateCommentRequest {
    description: String,
}

async fn create_post_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(post_id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentWithAuthor>), AppError> {
    validate_comment_description(&req.description).map_err(Error::validation)?;
    let comment = state.engine.create_comment(auth.user_id, CommentableRef::Post(post_id), &req.description).await?;
    Ok((StatusCode::CREATED, Json(hydrate_comment(&state, comment, Some(auth.user_id)).await?)))
}

async fn create_reply(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(parent_id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentWithAuthor>), AppError> {
    validate_comment_description(&req.description).map_err(Error::validation)?;
    let comment = state.engine.create_comment(auth.user_id, CommentableRef::Comment(parent_id), &req.description).await?;
    Ok((StatusCode::CREATED, Json(hydrate_comment(&state, comment, Some(auth.user_id)).await?)))
}

#[derive(Deserialize)]
struct UpdateCommentRequest {
    description: String,
}

async fn update_comment(State(state): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>, Json(req): Json<UpdateCommentRequest>) -> Result<Json<CommentWithAuthor>, AppError> {
    validate_comment_description(&req.description).map_err(Error::validation)?;
    let comment = state.engine.update_comment(auth.user_id, id, &req.description).await?;
    Ok(Json(hydrate_comment(&state, comment, Some(auth.user_id)).await?))
}

async fn delete_comment(State(state): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Result<StatusCode, AppError> {
    state.engine.delete_comment(auth.user_id, id).await?;
    Ok(StatusCode::OK)
}

async fn hydrate_children(state: &AppState, commentable: CommentableRef, viewer_id: Option<Uuid>) -> Result<Json<Vec<CommentWithAuthor>>, AppError> {
    let children = state.engine.store.list_children(commentable).await?;
    let mut hydrated = Vec::with_capacity(children.len());
    for comment in children {
        hydrated.push(hydrate_comment(state, comment, viewer_id).await?);
    }
    Ok(Json(hydrated))
}

async fn hydrate_comment(state: &AppState, comment: relaykit_common::types::Comment, viewer_id: Option<Uuid>) -> Result<CommentWithAuthor, AppError> {
    let author = state.engine.store.get_user(comment.author_id).await?.ok_or(Error::NotFound("user".into()))?;
    let viewer_reaction = match viewer_id {
        Some(uid) => state.engine.store.get_viewer_reaction(uid, TargetRef::Comment(comment.id)).await?,
        None => None,
    };
    Ok(CommentWithAuthor { comment, author: author.into(), viewer_reaction })
}
