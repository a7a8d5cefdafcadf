use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy surfaced to callers (spec.md §7). Internal logs may carry
/// more detail than what crosses this boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0:?}")]
    ValidationError(Vec<String>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("redis error: {0}")]
    Redis(#[from] fred::error::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::ValidationError(vec![msg.into()])
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Error::ValidationError(_) => 422,
            Error::NotFound(_) => 404,
            Error::Unauthenticated => 401,
            Error::Forbidden => 403,
            Error::Conflict(_) => 409,
            Error::Transient(_) | Error::Redis(_) | Error::Json(_) => 503,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_match_taxonomy() {
        assert_eq!(Error::validation("bad").status_code(), 422);
        assert_eq!(Error::NotFound("post".into()).status_code(), 404);
        assert_eq!(Error::Unauthenticated.status_code(), 401);
        assert_eq!(Error::Forbidden.status_code(), 403);
        assert_eq!(Error::Conflict("race".into()).status_code(), 409);
        assert_eq!(Error::Transient("redis down".into()).status_code(), 503);
    }
}
