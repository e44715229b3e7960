use crate::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Known command, not permitted in the current mode.
    Deny,
    /// Not a command of the wrapped tool.
    NotFound,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny => "deny",
            Decision::NotFound => "not-found",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Deny => "DENY",
            Decision::NotFound => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub decision: Decision,
    pub reason: String,
}

impl PolicyDecision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Allow,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Deny,
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::NotFound,
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }

    /// Turn a refusal into the caller-facing error; `Ok` when allowed.
    pub fn into_result(self) -> Result<Self, ToolError> {
        match self.decision {
            Decision::Allow => Ok(self),
            Decision::Deny => Err(ToolError::AuthorizationDenied(self.reason)),
            Decision::NotFound => Err(ToolError::CommandNotFound(self.reason)),
        }
    }
}
