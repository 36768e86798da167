use thiserror::Error;

/// Failures surfaced by the synchronization client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("not signed in")]
    Unauthorized,

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("{0}")]
    Validation(String),

    #[error("no channel named '{0}'")]
    UnknownChannel(String),
}

/// How the UI should react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Identity missing or expired: send the user to sign in.
    SignIn,
    /// Show the message; retrying the same input will not help.
    Recoverable,
    /// Local state is intact; the next poll or a manual retry may succeed.
    Retryable,
}

impl ClientError {
    /// Classify a non-success HTTP response.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::Unauthorized,
            400..=499 => Self::Rejected { status, message },
            _ => Self::Server { status, message },
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Unauthorized => Disposition::SignIn,
            Self::Rejected { .. } | Self::Validation(_) | Self::UnknownChannel(_) => Disposition::Recoverable,
            Self::Server { .. } | Self::Network(_) | Self::Timeout => Disposition::Retryable,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::from_status(status.as_u16(), e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}
