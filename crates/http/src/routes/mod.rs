use axum::Router;

use crate::state::AppState;

pub mod auth;
pub mod comments;
pub mod notifications;
pub mod posts;
pub mod reactions;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(posts::router())
        .merge(comments::router())
        .merge(reactions::router())
        .merge(notifications::router())
}
