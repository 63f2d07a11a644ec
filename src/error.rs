//! Error taxonomy shared by the listing and upload services.

use thiserror::Error;

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Failures a service call can surface to its caller.
///
/// `Upstream` keeps the underlying error for logging only; its `Display`
/// output never includes store internals.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Unauthorized")]
    Auth,

    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Upstream {
        message: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn upstream(message: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Upstream {
            message,
            source: source.into(),
        }
    }
}

/// Reasons a media element refused or abandoned a play request.
///
/// These never reach the user; the playback controller logs them and parks
/// the slot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("play request was interrupted by a pause")]
    Interrupted,
    #[error("play request was not allowed without a user gesture")]
    NotAllowed,
    #[error("media error: {0}")]
    Media(String),
}
