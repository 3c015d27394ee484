use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the Graph API client and notebook traversal.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status} body: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to deserialize response: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("notebook \"{name}\" not found. Maybe: {}", .available.join(", "))]
    NotebookNotFound {
        name: String,
        /// Display names of every notebook the lookup did resolve.
        available: Vec<String>,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_lists_candidates() {
        let err = ApiError::NotebookNotFound {
            name: "Missing".into(),
            available: vec!["Work".into(), "Personal".into()],
        };
        let message = err.to_string();
        assert!(message.contains("\"Missing\""));
        assert!(message.contains("Work"));
        assert!(message.contains("Personal"));
    }
}
