use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use relaykit_common::types::{PaginationMeta, PostWithAuthor, Tag, TargetRef};
use relaykit_common::validation::{validate_post_description, validate_post_title};
use relaykit_common::Error;

use crate::error::AppError;
use crate::extractors::{AuthUser, MaybeAuthUser};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", get(get_post).put(update_post).delete(delete_post))
}

#[derive(Deserialize)]
struct ListPostsQuery {
    page: Option<u32>,
    per_page: Option<u32>,
    user_id: Option<Uuid>,
}

#[derive(Serialize)]
struct PostListResponse {
    posts: Vec<PostWithAuthor>,
    meta: PaginationMeta,
}

async fn list_posts(State(state): State<AppState>, MaybeAuthUser(viewer): MaybeAuthUser, Query(query): Query<ListPostsQuery>) -> Result<Json<PostListResponse>, AppError> {
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(20);

    let (posts, total) = state.engine.store.list_posts(page, per_page, query.user_id).await?;
    let viewer_id = viewer.map(|u| u.user_id);

    let mut hydrated = Vec::with_capacity(posts.len());
    for post in posts {
        hydrated.push(hydrate_post(&state, post, viewer_id).await?);
    }

    Ok(Json(PostListResponse { posts: hydrated, meta: PaginationMeta::new(page.max(1), per_page, total) }))
}

async fn get_post(State(state): State<AppState>, MaybeAuthUser(viewer): MaybeAuthUser, Path(id): Path<Uuid>, headers: HeaderMap) -> Result<Response, AppError> {
    if let (Some(cached_ts), Some(if_none_match)) = (state.etag_cache.get(&id).await, headers.get("if-none-match").and_then(|v| v.to_str().ok())) {
        let cached_etag = format!("\"{cached_ts}\"");
        if if_none_match == cached_etag {
            return Ok((StatusCode::NOT_MODIFIED, [("ETag", cached_etag)]).into_response());
        }
    }

    let post = state.engine.store.get_post(id).await?.ok_or(Error::NotFound("post".into()))?;
    let etag = format!("\"{}\"", post.updated_at.timestamp_millis());
    state.etag_cache.insert(id, post.updated_at.timestamp_millis()).await;

    let body = hydrate_post(&state, post, viewer.map(|u| u.user_id)).await?;
    Ok((StatusCode::OK, [("ETag", etag)], Json(body)).into_response())
}

#[derive(Deserialize)]
struct CreatePostRequest {
    title: String,
    description: String,
    image_ref: Option<String>,
    #[serde(default)]
    tags: Vec<TagInput>,
}

#[derive(Deserialize)]
struct TagInput {
    name: String,
    #[serde(default = "default_tag_color")]
    color: String,
}

fn default_tag_color() -> String {
    "#999999".to_string()
}

async fn create_post(State(state): State<AppState>, auth: AuthUser, Json(req): Json<CreatePostRequest>) -> Result<(StatusCode, Json<PostWithAuthor>), AppError> {
    validate_post_title(&req.title).map_err(Error::validation)?;
    validate_post_description(&req.description).map_err(Error::validation)?;

    let mut tag_ids = Vec::with_capacity(req.tags.len());
    for tag in &req.tags {
        let tag = state.engine.store.get_or_create_tag(&tag.name, &tag.color).await?;
        tag_ids.push(tag.id);
    }

    let post = state.engine.create_post(auth.user_id, &req.title, &req.description, req.image_ref, tag_ids).await?;
    Ok((StatusCode::CREATED, Json(hydrate_post(&state, post, Some(auth.user_id)).await?)))
}

#[derive(Deserialize)]
struct UpdatePostRequest {
    title: Option<String>,
    description: Option<String>,
}

async fn update_post(State(state): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>, Json(req): Json<UpdatePostRequest>) -> Result<Json<PostWithAuthor>, AppError> {
    if let Some(title) = &req.title {
        validate_post_title(title).map_err(Error::validation)?;
    }
    if let Some(description) = &req.description {
        validate_post_description(description).map_err(Error::validation)?;
    }

    let post = state.engine.update_post(auth.user_id, id, req.title, req.description).await?;
    Ok(Json(hydrate_post(&state, post, Some(auth.user_id)).await?))
}

async fn delete_post(State(state): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Result<StatusCode, AppError> {
    state.engine.delete_post(auth.user_id, id).await?;
    Ok(StatusCode::OK)
}

async fn hydrate_post(state: &AppState, post: relaykit_common::types::Post, viewer_id: Option<Uuid>) -> Result<PostWithAuthor, AppError> {
    let author = state.engine.store.get_user(post.author_id).await?.ok_or(Error::NotFound("user".into()))?;

    let mut tags = Vec::<Tag>::with_capacity(post.tag_ids.len());
    for tag_id in &post.tag_ids {
        if let Some(tag) = state.engine.store.get_tag(*tag_id).await? {
            tags.push(tag);
        }
    }

    let viewer_reaction = match viewer_id {
        Some(uid) => state.engine.store.get_viewer_reaction(uid, TargetRef::Post(post.id)).await?,
        None => None,
    };

    Ok(PostWithAuthor { post, author: author.into(), tags, viewer_reaction })
}
