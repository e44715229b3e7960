//! Command policies: per-tool logic for deciding whether a command may run.
//!
//! The cluster tool is checked against configured prefix lists; the infra
//! tool against a catalog of its installed commands, classified once.

/// Catalog-driven evaluation for the infra tool (server list → allow, server delete → deny).
pub mod catalog;
/// Prefix-list evaluation for the cluster tool (get → allow, config → deny).
pub mod prefix;

use crate::eval::{CommandContext, PolicyDecision};

/// Trait for command policies.
///
/// Implementations are immutable after construction and shared across
/// concurrent requests without locking.
pub trait CommandPolicy: Send + Sync {
    /// Classify the command in the given context.
    fn classify(&self, ctx: &CommandContext) -> PolicyDecision;
}

/// Message used for every command refused by policy.
pub(crate) fn blocked_message(command: &str) -> String {
    format!("Command {command} is currently blocked for LLM use as it could modify the deployment.")
}
