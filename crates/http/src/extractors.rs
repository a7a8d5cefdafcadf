use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use relaykit_common::auth::{self, TokenKind};
use uuid::Uuid;

use crate::state::AppState;

/// Authenticated caller, extracted from a valid access-token Bearer header
/// (spec.md §4.8). There is no server-side session table to re-check —
/// liveness is whatever the access token's own expiry says; revocation is a
/// matter of the token simply running out (15 minutes by default) or the
/// user's refresh chain being cut (logout).
pub struct AuthUser {
    pub user_id: Uuid,
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing Authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or((StatusCode::UNAUTHORIZED, "invalid Authorization header format".to_string()))?;

        let claims = auth::verify_token(token, &state.config.access_token_secret, TokenKind::Access)
            .map_err(|_| (StatusCode::UNAUTHORIZED, "invalid token".to_string()))?;

        Ok(AuthUser { user_id: claims.sub })
    }
}

/// Optional auth — resolves to `None` instead of rejecting when no (or an
/// invalid) token is present, for routes readable anonymously but that
/// personalize when a caller is known (e.g. `viewer_reaction`).
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AuthUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeAuthUser(Some(user))),
            Err(_) => Ok(MaybeAuthUser(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_prefix_stripped() {
        assert_eq!("Bearer abc.def.ghi".strip_prefix("Bearer "), Some("abc.def.ghi"));
        assert_eq!("abc.def.ghi".strip_prefix("Bearer "), None);
    }
}
