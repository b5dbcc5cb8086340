//! Dispatch core error types.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while routing and running handlers.
#[derive(Error, Debug)]
pub enum Error {
    /// Arguments could not be parsed, validated or manipulated.
    #[error("Handler '{handler}' reported issues: {issues}")]
    HandlerReportedIssues { handler: String, issues: String },

    /// An authorizer denied the request.
    #[error("{0}")]
    NotAuthorized(String),

    /// No handler accepted a message that was directed at the bot.
    #[error("No handler found")]
    NoHandlerFound { suggestion: String },

    /// A followup message had no active handler willing to take it.
    #[error("No followup handler found")]
    NoFollowupHandlerFound,

    /// A wait for a state transition ran out of time.
    #[error("Timed out after {elapsed:?} waiting for a state transition")]
    WaitTimeout { elapsed: Duration },

    /// The process-wide shutdown signal was observed.
    #[error("Dying")]
    Dying,

    /// Two handlers registered the same trigger.
    #[error("Duplicate trigger '{trigger}' already registered to handler '{existing}'")]
    DuplicateTrigger { trigger: String, existing: String },

    /// Two handlers share the same name.
    #[error("Duplicate handler name '{0}'")]
    DuplicateHandler(String),

    /// Configuration is missing or has the wrong shape.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required external client or capability is not available.
    #[error("Not available: {0}")]
    Unavailable(String),

    /// A transport failed to deliver a reply.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The handler's own work failed.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Coarse classification of [`Error`] used by callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Argument,
    Authorization,
    NoHandler,
    NoFollowupHandler,
    Timeout,
    Dying,
    Configuration,
    Unavailable,
    Transport,
    Internal,
}

impl Error {
    /// Build an argument error attributed to a handler.
    pub fn reported(handler: impl Into<String>, issues: impl Into<String>) -> Self {
        Error::HandlerReportedIssues {
            handler: handler.into(),
            issues: issues.into(),
        }
    }

    /// Build an authorization denial.
    pub fn not_authorized(reason: impl Into<String>) -> Self {
        Error::NotAuthorized(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::HandlerReportedIssues { .. } => ErrorKind::Argument,
            Error::NotAuthorized(_) => ErrorKind::Authorization,
            Error::NoHandlerFound { .. } => ErrorKind::NoHandler,
            Error::NoFollowupHandlerFound => ErrorKind::NoFollowupHandler,
            Error::WaitTimeout { .. } => ErrorKind::Timeout,
            Error::Dying => ErrorKind::Dying,
            Error::DuplicateTrigger { .. } | Error::DuplicateHandler(_) | Error::Config(_) => {
                ErrorKind::Configuration
            }
            Error::Unavailable(_) => ErrorKind::Unavailable,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Failed(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error is a recoverable condition with a dedicated reply
    /// (as opposed to a generic failure).
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Argument
                | ErrorKind::Authorization
                | ErrorKind::NoHandler
                | ErrorKind::NoFollowupHandler
                | ErrorKind::Timeout
        )
    }

    /// Whether the error means the invocation was unwound by shutdown.
    pub fn is_dying(&self) -> bool {
        matches!(self, Error::Dying)
    }
}

/// Result type alias for dispatch core errors.
pub type Result<T> = std::result::Result<T, Error>;
