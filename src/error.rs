//! # Error Handling
//!
//! Error types for the two surfaces of the service: `AppError` for the HTTP
//! API (converted into JSON error responses through `ResponseError`), and the
//! narrow pipeline error enums used inside the streaming path.
//!
//! Pipeline errors deliberately do not implement `ResponseError`: a session
//! failure is reported over the WebSocket (or just logged), never as an HTTP
//! status.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use std::io;

/// Errors surfaced by the HTTP endpoints.
///
/// ## HTTP Status Code Mapping:
/// - `Internal`/`Config` → 500
/// - `BadRequest` → 400
#[derive(Debug)]
pub enum AppError {
    /// Server-side failures (I/O, lock poisoning, serialization)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Configuration file or environment variable problems
    Config(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::Config(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>` in HTTP handlers.
pub type AppResult<T> = Result<T, AppError>;

/// Failures of the transcoder subprocess boundary.
#[derive(Debug)]
pub enum TranscoderError {
    /// The external binary could not be launched (missing, not executable).
    /// Fatal to the session: no pipeline is started when spawn fails.
    Spawn(io::Error),

    /// Writing a chunk to the process input failed (process exited or its
    /// input pipe is closed). Best-effort callers log and drop the chunk.
    Write(io::Error),

    /// The input stream has already been closed by the shutdown sequence.
    InputClosed,
}

impl fmt::Display for TranscoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscoderError::Spawn(err) => write!(f, "failed to spawn transcoder process: {}", err),
            TranscoderError::Write(err) => write!(f, "failed to write to transcoder input: {}", err),
            TranscoderError::InputClosed => write!(f, "transcoder input is closed"),
        }
    }
}

impl std::error::Error for TranscoderError {}

/// Failures of the remote streaming recognizer session.
#[derive(Debug)]
pub enum RecognizerError {
    /// Connecting or upgrading to the streaming endpoint failed.
    Handshake(String),

    /// The established connection failed mid-stream.
    Transport(String),

    /// The remote side closed the session.
    Closed,
}

impl fmt::Display for RecognizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognizerError::Handshake(msg) => write!(f, "recognizer handshake failed: {}", msg),
            RecognizerError::Transport(msg) => write!(f, "recognizer transport error: {}", msg),
            RecognizerError::Closed => write!(f, "recognizer session closed"),
        }
    }
}

impl std::error::Error for RecognizerError {}

/// Failures while starting a recording session.
///
/// Both variants are fatal to the session (the connection is closed with no
/// pipeline running); neither is fatal to the process.
#[derive(Debug)]
pub enum SessionError {
    /// The archival file could not be created or opened.
    Archive(io::Error),

    /// The transcoder subprocess could not be started.
    Transcoder(TranscoderError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Archive(err) => write!(f, "failed to open archival file: {}", err),
            SessionError::Transcoder(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<TranscoderError> for SessionError {
    fn from(err: TranscoderError) -> Self {
        SessionError::Transcoder(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::BadRequest("missing field".to_string());
        assert_eq!(err.to_string(), "Bad request: missing field");
    }

    #[test]
    fn test_transcoder_spawn_error_display() {
        let err = TranscoderError::Spawn(io::Error::new(io::ErrorKind::NotFound, "no ffmpeg"));
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[test]
    fn test_session_error_wraps_transcoder() {
        let err: SessionError = TranscoderError::InputClosed.into();
        assert!(matches!(err, SessionError::Transcoder(_)));
    }
}
