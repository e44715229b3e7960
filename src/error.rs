//! The single failure type surfaced to callers.

use thiserror::Error;

/// Every way a request can fail, before or after a process is created.
///
/// Only [`ToolError::ExecutionFailed`] and [`ToolError::InitializationFailed`]
/// can follow the creation of an external process; all other kinds are
/// reported before any capacity is consumed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    /// A flag reserved for injected parameters was supplied by the caller.
    #[error("argument {flag} is not allowed")]
    ArgumentRejected { flag: String },

    /// Empty or malformed input, including flags removed from the grammar.
    #[error("{0}")]
    InvalidCommand(String),

    /// The command is not permitted in the current mode.
    #[error("{0}")]
    AuthorizationDenied(String),

    /// The command does not exist in the tool's catalog.
    #[error("{0}")]
    CommandNotFound(String),

    /// No credentials in the request and none on disk.
    #[error("{0}")]
    MissingCredentials(String),

    /// The child exited non-zero or could not be started.
    #[error("{message}")]
    ExecutionFailed { code: Option<i32>, message: String },

    /// The one-time warm-up failed; sticky for the lifetime of the process.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
}

impl ToolError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::ArgumentRejected { .. } => "argument_rejected",
            ToolError::InvalidCommand(_) => "invalid_command",
            ToolError::AuthorizationDenied(_) => "authorization_denied",
            ToolError::CommandNotFound(_) => "command_not_found",
            ToolError::MissingCredentials(_) => "missing_credentials",
            ToolError::ExecutionFailed { .. } => "execution_failed",
            ToolError::InitializationFailed(_) => "initialization_failed",
        }
    }

    /// Policy outcomes are expected; everything else is worth a warning.
    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            ToolError::ArgumentRejected { .. }
                | ToolError::InvalidCommand(_)
                | ToolError::AuthorizationDenied(_)
                | ToolError::CommandNotFound(_)
        )
    }

    pub(crate) fn execution(tool: &str, code: Option<i32>, detail: &str) -> Self {
        let detail = detail.trim();
        let message = match (code, detail.is_empty()) {
            (Some(code), false) => format!("{tool} failed with error code {code}: {detail}"),
            (Some(code), true) => format!("{tool} failed with error code {code} and no output"),
            (None, false) => format!("{tool} failed: {detail}"),
            (None, true) => format!("{tool} was terminated by a signal"),
        };
        ToolError::ExecutionFailed { code, message }
    }
}
