use axum::{http::StatusCode, response::IntoResponse, Json};
use relaykit_common::Error;
use serde_json::json;

/// Maps the domain error taxonomy (spec.md §7) onto HTTP responses.
pub struct AppError(pub Error);

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = match &self.0 {
            Error::ValidationError(errors) => json!({ "errors": errors }),
            Error::NotFound(what) => json!({ "error": format!("{what} not found") }),
            Error::Unauthenticated => json!({ "error": "unauthenticated" }),
            Error::Forbidden => json!({ "error": "forbidden" }),
            Error::Conflict(msg) => json!({ "error": msg }),
            Error::Transient(_) | Error::Redis(_) | Error::Json(_) => {
                tracing::error!("internal error: {}", self.0);
                json!({ "error": "internal error" })
            }
        };

        (status, Json(body)).into_response()
    }
}
