use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use relaykit_common::types::{ReactionKind, TargetRef, ToggleOutcome};
use relaykit_common::Error;

use crate::error::AppError;
use crate::extractors::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts/{id}/reactions", post(toggle_post_reaction).get(post_reaction_summary))
        .route("/comments/{id}/reactions", post(toggle_comment_reaction))
}

#[derive(Deserialize)]
struct ToggleReactionRequest {
    kind: ReactionKind,
}

async fn toggle_post_reaction(State(state): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>, Json(req): Json<ToggleReactionRequest>) -> Result<Json<ToggleOutcome>, AppError> {
    let outcome = state.engine.toggle_reaction(auth.user_id, TargetRef::Post(id), req.kind).await?;
    Ok(Json(outcome))
}

async fn toggle_comment_reaction(State(state): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>, Json(req): Json<ToggleReactionRequest>) -> Result<Json<ToggleOutcome>, AppError> {
    let outcome = state.engine.toggle_reaction(auth.user_id, TargetRef::Comment(id), req.kind).await?;
    Ok(Json(outcome))
}

#[derive(Serialize)]
struct ReactionSummary {
    reactions_count: i64,
    viewer_reaction: Option<ReactionKind>,
}

async fn post_reaction_summary(State(state): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Result<Json<ReactionSummary>, AppError> {
    let post = state.engine.store.get_post(id).await?.ok_or(Error::NotFound("post".into()))?;
    let viewer_reaction = state.engine.store.get_viewer_reaction(auth.user_id, TargetRef::Post(id)).await?;
    Ok(Json(ReactionSummary { reactions_count: post.reactions_count, viewer_reaction }))
}
