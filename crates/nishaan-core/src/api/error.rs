use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not authenticated")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rejected by backend: {0}")]
    Rejected(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            400 | 409 | 422 => ApiError::Rejected(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Whether retrying later could plausibly succeed.
    ///
    /// Replay does not act on this yet; it is recorded alongside each
    /// failure so permanent rejections can be told apart in logs.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::NetworkError(_) | ApiError::RateLimited | ApiError::ServerError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "bad color"),
            ApiError::Rejected(ref body) if body == "bad color"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            ApiError::ServerError(_)
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ApiError::RateLimited.is_retryable());
        assert!(ApiError::ServerError("boom".into()).is_retryable());
        assert!(!ApiError::Rejected("invalid".into()).is_retryable());
        assert!(!ApiError::Unauthorized.is_retryable());
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("truncated, 510 total bytes"));
    }
}
