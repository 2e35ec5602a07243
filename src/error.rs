//! Error types for the capture client.
//!
//! Each stage of a capture cycle has its own taxonomy so callers can decide
//! what is fatal (camera acquisition) and what merely skips a cycle.

use thiserror::Error;

/// Camera acquisition and session errors. Fatal to the session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    /// The OS or the user refused camera access.
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    /// No usable device, or the device could not be opened.
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The session was released before the operation could complete.
    #[error("camera session released")]
    Released,
}

/// Frame encoding errors.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The source has not reached the current-data stage yet.
    #[error("video source not ready")]
    NotReady,

    #[error("jpeg encoding failed: {0}")]
    Codec(#[from] image::ImageError),
}

/// Analysis request errors. Logged, never retried.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis request timed out after {0} ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("analysis service returned {status}: {body}")]
    Server { status: u16, body: String },

    /// The service answered 2xx but the body is not an analysis result.
    #[error("invalid analysis response: {0}")]
    InvalidResponse(String),
}

impl AnalysisError {
    /// Most specific diagnostic available: the server body when there is one,
    /// otherwise the transport message.
    pub fn diagnostic(&self) -> String {
        match self {
            AnalysisError::Server { body, .. } if !body.trim().is_empty() => body.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AnalysisError::Timeout(_))
    }
}

/// Lifecycle errors returned by the controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("capture already running")]
    AlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_prefers_server_body() {
        let err = AnalysisError::Server {
            status: 500,
            body: "{\"error\":\"model overloaded\"}".into(),
        };
        assert_eq!(err.diagnostic(), "{\"error\":\"model overloaded\"}");
    }

    #[test]
    fn diagnostic_falls_back_to_message() {
        let err = AnalysisError::Server {
            status: 502,
            body: "  ".into(),
        };
        assert_eq!(err.diagnostic(), "analysis service returned 502:   ");

        let err = AnalysisError::Timeout(30_000);
        assert!(err.is_timeout());
        assert_eq!(err.diagnostic(), "analysis request timed out after 30000 ms");
    }
}
