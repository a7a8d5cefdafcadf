use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use relaykit_common::auth_bridge::AuthBridge;
use relaykit_common::types::UserPublic;

use crate::error::AppError;
use crate::extractors::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/confirm/{token}", get(confirm))
        .route("/auth/forgot_password", post(forgot_password))
        .route("/auth/reset_password", post(reset_password))
        .route("/auth/me", get(me))
}

fn bridge(state: &AppState) -> AuthBridge<'_> {
    AuthBridge::new(
        &state.engine.store,
        &*state.mail,
        &state.config.access_token_secret,
        &state.config.refresh_token_secret,
        state.config.access_token_lifetime_minutes,
        state.config.refresh_token_lifetime_days,
    )
}

#[derive(Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    password: String,
}

async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> Result<(StatusCode, Json<UserPublic>), AppError> {
    let user = bridge(&state).register(&req.name, &req.email, &req.password).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: UserPublic,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Result<Json<TokenResponse>, AppError> {
    let (user, tokens) = bridge(&state).login(&req.email, &req.password).await?;
    Ok(Json(TokenResponse { access_token: tokens.access_token, refresh_token: tokens.refresh_token, user: user.into() }))
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Serialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

async fn refresh(State(state): State<AppState>, Json(req): Json<RefreshRequest>) -> Result<Json<RefreshResponse>, AppError> {
    let tokens = bridge(&state).refresh(&req.refresh_token).await?;
    Ok(Json(RefreshResponse { access_token: tokens.access_token, refresh_token: tokens.refresh_token }))
}

async fn confirm(State(state): State<AppState>, Path(token): Path<String>) -> Result<Json<UserPublic>, AppError> {
    let user = bridge(&state).confirm(&token).await?;
    Ok(Json(user.into()))
}

#[derive(Deserialize)]
struct ForgotPasswordRequest {
    email: String,
}

async fn forgot_password(State(state): State<AppState>, Json(req): Json<ForgotPasswordRequest>) -> Result<StatusCode, AppError> {
    bridge(&state).request_password_reset(&req.email).await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
struct ResetPasswordRequest {
    token: String,
    password: String,
}

async fn reset_password(State(state): State<AppState>, Json(req): Json<ResetPasswordRequest>) -> Result<Json<UserPublic>, AppError> {
    let user = bridge(&state).reset_password(&req.token, &req.password).await?;
    Ok(Json(user.into()))
}

async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<Json<UserPublic>, AppError> {
    let user = state
        .engine
        .store
        .get_user(auth.user_id)
        .await?
        .ok_or_else(|| relaykit_common::Error::NotFound("user".into()))?;
    Ok(Json(user.into()))
}
