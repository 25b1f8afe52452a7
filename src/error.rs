//! Failure taxonomy shared by every operation and its JSON projection.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),
    /// Missing, invalid or expired credentials.
    #[error("{0}")]
    Auth(String),
    /// Authenticated, but not the owner of the resource.
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    /// A unique value (username, email) is already taken.
    #[error("{0}")]
    Conflict(String),
    /// A well-formed request that the rules forbid, e.g. self-subscription.
    #[error("{0}")]
    InvalidOperation(String),
    #[error("server error: {0:#}")]
    Server(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown to clients. Server failures stay generic; their cause chain
    /// only goes to the log.
    pub fn message(&self) -> String {
        match self {
            Self::Server(_) => "Server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Self::Server(err) = &self {
            tracing::error!(error = %format!("{err:#}"), "request failed");
        }
        let body = serde_json::json!({ "message": self.message() });
        (self.status(), Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Collapses `validator` output into the single message the API reports.
/// Fields are visited in name order so the same input always yields the same
/// message.
pub fn first_validation_message(errors: &validator::ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|(left, _), (right, _)| left.cmp(right));
    fields
        .into_iter()
        .flat_map(|(field, list)| list.iter().map(move |error| (field.clone(), error)))
        .map(|(field, error)| {
            error
                .message
                .as_ref()
                .map(|message| message.to_string())
                .unwrap_or_else(|| format!("Invalid value for {field}"))
        })
        .next()
        .unwrap_or_else(|| "Invalid request".to_string())
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(first_validation_message(&errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn render(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn errors_render_as_json_messages() {
        let (status, body) = render(AppError::not_found("Video not found")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Video not found");

        let (status, _) = render(AppError::conflict("Email already registered")).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = render(AppError::invalid_operation("nope")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn server_errors_hide_their_cause() {
        let err = AppError::from(anyhow!("disk I/O error at /var/lib/secret"));
        let (status, body) = render(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Server error");
    }
}
