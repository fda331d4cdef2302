use thiserror::Error;

/// Application-level error type for the transport and bootstrap layers.
///
/// Domain rule violations live in
/// [`DomainError`](crate::errors::domain::DomainError) and are handled by the
/// dispatch layer; they never cross a transport boundary themselves.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {detail}")]
    Config { detail: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol error: {detail}")]
    Protocol { detail: String },
}

impl AppError {
    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol {
            detail: format!("invalid message payload: {err}"),
        }
    }
}
