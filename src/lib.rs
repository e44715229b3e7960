//! ops-toolgate: policy-gated execution of the `openstack` and `oc` CLIs.
//!
//! Automated callers submit a command for one of two wrapped tools. Each
//! request is sanitized (reserved flags rejected, removed flags refused,
//! credentials injected), classified against the tool's policy, and only then
//! run under a single process-wide concurrency bound.
//!
//! # Architecture
//!
//! - **[`parse`]**: Command splitting (shlex) and the per-tool global-option grammar.
//! - **[`commands`]**: Policies: prefix lists for the cluster tool, an installed-command catalog for the infra tool.
//! - **[`eval`]**: Policy engine, decision types, per-request context.
//! - **[`shell`]**: One-time loading of the infra catalog and negotiated API versions.
//! - **[`exec`]**: Execution slots, child supervision, the infra worker pool, and the orchestrator.
//! - **[`config`]**: Configuration loading: embedded defaults + user overlay merge.
//! - **[`logging`]**: stderr logger setup and the decision log.

/// Command policy trait and per-tool implementations.
pub mod commands;
/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// The error type surfaced to callers.
pub mod error;
/// Policy engine, decisions, request context.
pub mod eval;
/// Slots, process supervision, worker pool, orchestrator.
pub mod exec;
/// Logger setup and file-based decision logging.
pub mod logging;
/// Command splitting and global-option parsing.
pub mod parse;
/// Request types: tool, mode, credentials.
pub mod request;
/// Loaded state of the infra tool.
pub mod shell;

pub use error::ToolError;
pub use exec::Orchestrator;
pub use request::{CommandRequest, Credentials, Mode, Tool};

use eval::{PolicyDecision, PolicyEngine};

/// Sanitize and classify a cluster command against the default configuration.
///
/// This is the main entry point for tests and simple usage. Infra commands
/// need the installed catalog; use [`Orchestrator::authorize`] for those.
pub fn check(command: &str, mode: Mode) -> Result<PolicyDecision, ToolError> {
    let config = config::Config::default_config();
    let engine = PolicyEngine::from_config(&config);
    let request = CommandRequest::parse(Tool::Cluster, command, mode, Credentials::default())?;
    engine.check_cluster(&request)
}
