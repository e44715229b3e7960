//! Per-call request types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::parse;

/// Which wrapped CLI a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// `openstack`: catalog-driven policy, pooled workers.
    #[serde(alias = "openstack")]
    Infra,
    /// `oc`: prefix-list policy, direct spawn.
    #[serde(alias = "oc")]
    Cluster,
}

impl Tool {
    pub fn as_str(self) -> &'static str {
        match self {
            Tool::Infra => "infra",
            Tool::Cluster => "cluster",
        }
    }

    /// Name callers may prefix their command with.
    pub fn program(self) -> &'static str {
        match self {
            Tool::Infra => "openstack",
            Tool::Cluster => "oc",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "infra" | "openstack" => Ok(Tool::Infra),
            "cluster" | "oc" => Ok(Tool::Cluster),
            other => Err(format!("unknown tool: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Closed world: only allow-listed commands run.
    ReadOnly,
    /// Open world: everything runs except block-listed commands.
    Write,
}

impl Mode {
    pub fn from_allow_write(allow_write: bool) -> Self {
        if allow_write { Mode::Write } else { Mode::ReadOnly }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::ReadOnly => "read-only",
            Mode::Write => "write",
        }
    }
}

/// Caller-scoped credentials supplied with a request.
///
/// For the infra tool `endpoint` is the service URL; for the cluster tool it
/// is the API server URL.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub token: Option<String>,
    pub endpoint: Option<String>,
}

impl Credentials {
    pub fn new(token: Option<String>, endpoint: Option<String>) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            token: non_empty(token),
            endpoint: non_empty(endpoint),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.endpoint.is_none()
    }
}

// Tokens must never reach a log line.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// One command submitted by a caller. Immutable once built.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Random id carried through logs.
    pub id: String,
    pub tool: Tool,
    /// Caller words with any leading tool name removed.
    pub argv: Vec<String>,
    pub mode: Mode,
    pub credentials: Credentials,
}

impl CommandRequest {
    /// Split a command string into a request.
    pub fn parse(
        tool: Tool,
        command: &str,
        mode: Mode,
        credentials: Credentials,
    ) -> Result<Self, ToolError> {
        let argv = parse::split_command(tool, command)?;
        Ok(Self::from_argv(tool, argv, mode, credentials))
    }

    pub fn from_argv(tool: Tool, argv: Vec<String>, mode: Mode, credentials: Credentials) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tool,
            argv,
            mode,
            credentials,
        }
    }

    /// The command as the caller would have typed it.
    pub fn display(&self) -> String {
        let mut words = Vec::with_capacity(self.argv.len() + 1);
        words.push(self.tool.program());
        words.extend(self.argv.iter().map(String::as_str));
        shlex::try_join(words).unwrap_or_else(|_| self.argv.join(" "))
    }
}
