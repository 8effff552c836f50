//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code.
//!
//! **Security note:** I/O and other internal errors are logged with full
//! detail but only a generic message is returned to the caller so that
//! file paths never leak to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docpdf_core::ConversionError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// All errors that can occur in the docpdf-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the conversion core.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request body exceeded the configured upload limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Missing or wrong bearer token.
    #[error("unauthorized")]
    Unauthorized,

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::PayloadTooLarge(m) => (StatusCode::PAYLOAD_TOO_LARGE, m.clone()),
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, "Invalid API key".to_owned()),
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            ServerError::Conversion(e) => conversion_status(e),
        }
    }
}

fn conversion_status(e: &ConversionError) -> (StatusCode, String) {
    let status = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else if e.is_engine_error() {
        error!(error = %e, "conversion failed");
        match e {
            ConversionError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    } else {
        match e {
            ConversionError::TaskNotFound { .. } | ConversionError::FileNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ConversionError::Busy { .. } => {
                warn!(error = %e, "conversion rejected");
                StatusCode::TOO_MANY_REQUESTS
            }
            _ => {
                error!(error = %e, "conversion core error");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                );
            }
        }
    };
    (status, e.to_string())
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = self.status_and_message();
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;

    fn status_of(e: impl Into<ServerError>) -> (StatusCode, String) {
        e.into().status_and_message()
    }

    #[test]
    fn validation_errors_are_bad_requests_with_message() {
        let (status, msg) = status_of(ConversionError::UnsupportedFormat {
            extension: ".txt".into(),
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(msg.contains(".txt"));
        assert_eq!(status_of(ConversionError::EmptyFile).1, "Empty file");
    }

    #[test]
    fn lookups_map_to_not_found() {
        let (status, _) = status_of(ConversionError::TaskNotFound {
            task_id: "x".into(),
        });
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = status_of(ConversionError::FileNotFound { name: "a.pdf".into() });
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn engine_errors_keep_their_message() {
        let (status, msg) = status_of(ConversionError::EngineNotFound {
            program: PathBuf::from("/opt/soffice"),
        });
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(msg.contains("/opt/soffice"));
        assert_eq!(
            status_of(ConversionError::Timeout { secs: 5 }).0,
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(ConversionError::Busy { capacity: 2 }).0,
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn status_follows_core_classification() {
        let client = [
            ConversionError::EmptyFile,
            ConversionError::UnsupportedFormat {
                extension: ".exe".into(),
            },
            ConversionError::InvalidName {
                name: "../x.pdf".into(),
                reason: "path separators are not allowed",
            },
        ];
        for e in client {
            assert!(e.is_client_error());
            assert_eq!(status_of(e).0, StatusCode::BAD_REQUEST);
        }
        let engine = [
            ConversionError::EngineNotFound {
                program: PathBuf::from("soffice"),
            },
            ConversionError::ConversionFailed {
                reason: "exit status 81".into(),
            },
        ];
        for e in engine {
            assert!(e.is_engine_error());
            let shown = e.to_string();
            assert_eq!(status_of(e), (StatusCode::INTERNAL_SERVER_ERROR, shown));
        }
    }

    #[test]
    fn io_errors_are_hidden() {
        let io = std::io::Error::other("/secret/path unreadable");
        let (status, msg) = status_of(ConversionError::Io(io));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!msg.contains("secret"));
    }

    #[test]
    fn anyhow_becomes_generic_internal() {
        let (status, msg) = status_of(anyhow::anyhow!("db path /x/y"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(msg, "internal server error");
    }
}
