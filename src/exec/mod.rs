//! End-to-end execution: sanitize, authorize, acquire a slot, dispatch.
//!
//! Cluster commands are spawned directly by the request. Infra commands go
//! through a worker pool started once the shell state is loaded. Both paths
//! draw from the same [`Slots`].

pub mod credentials;
pub mod pool;
pub mod process;
pub mod slots;

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{OnceCell, oneshot};

use crate::commands::CommandPolicy;
use crate::config::{Config, expand_path};
use crate::error::ToolError;
use crate::eval::{PolicyDecision, PolicyEngine};
use crate::logging;
use crate::request::{CommandRequest, Credentials, Mode, Tool};
use crate::shell::{Shell, ShellState};

use pool::{Job, WorkerPool};
use process::Invocation;
pub use slots::Slots;

/// A request that passed sanitizing and policy.
#[derive(Debug)]
pub struct Authorized {
    pub decision: PolicyDecision,
    /// Static parameters and credentials, in that order.
    injected: Vec<String>,
    user_flags: Vec<String>,
    state: Option<Arc<ShellState>>,
}

pub struct Orchestrator {
    config: Config,
    policy: PolicyEngine,
    slots: Slots,
    shell: Shell,
    pool: OnceCell<WorkerPool>,
    cluster_program: String,
    decision_log: Option<PathBuf>,
}

impl Orchestrator {
    pub fn from_config(config: Config) -> Self {
        let decision_log = Some(config.settings.decision_log.trim())
            .filter(|p| !p.is_empty())
            .map(expand_path);
        Self {
            policy: PolicyEngine::from_config(&config),
            slots: Slots::new(config.settings.processes_pool_size),
            shell: Shell::new(&config.infra),
            pool: OnceCell::new(),
            cluster_program: expand_path(&config.cluster.binary)
                .to_string_lossy()
                .into_owned(),
            decision_log,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// Mode is fixed per tool by `allow_write`.
    pub fn mode(&self, tool: Tool) -> Mode {
        match tool {
            Tool::Infra => Mode::from_allow_write(self.config.infra.allow_write),
            Tool::Cluster => Mode::from_allow_write(self.config.cluster.allow_write),
        }
    }

    /// Build a request for `tool` in its configured mode.
    pub fn request(
        &self,
        tool: Tool,
        command: &str,
        credentials: Credentials,
    ) -> Result<CommandRequest, ToolError> {
        CommandRequest::parse(tool, command, self.mode(tool), credentials)
    }

    /// Load the infra shell state (catalog and API versions) if not loaded yet.
    pub async fn infra_state(&self, credentials: &Credentials) -> Result<Arc<ShellState>, ToolError> {
        let injected = credentials::injected_args(&self.config, Tool::Infra, credentials)?;
        self.shell.ready(&self.slots, &injected).await
    }

    /// Sanitize and classify without running the command.
    ///
    /// Infra classification needs the catalog, so the first infra call
    /// performs the one-time load.
    pub async fn authorize(&self, request: &CommandRequest) -> Result<Authorized, ToolError> {
        let ctx = self.policy.context(request).inspect_err(|e| {
            info!("[{}] refused {}: {e}", request.id, request.display());
        })?;
        let injected = credentials::injected_args(&self.config, request.tool, &request.credentials)?;

        let (decision, state) = match request.tool {
            Tool::Cluster => (self.policy.classify_cluster(&ctx), None),
            Tool::Infra => {
                let state = self.shell.ready(&self.slots, &injected).await?;
                (state.catalog.classify(&ctx), Some(state))
            }
        };

        info!(
            "[{}] {} {}: {}",
            request.id,
            decision.decision.label(),
            request.display(),
            decision.reason
        );
        if let Some(path) = &self.decision_log {
            logging::log_decision(path, request, &decision);
        }

        let decision = decision.into_result()?;
        Ok(Authorized {
            decision,
            injected,
            user_flags: ctx.args.flags,
            state,
        })
    }

    /// Run one request to completion.
    ///
    /// Denials return before any slot is taken. Dropping the future cancels
    /// the wait for a slot or kills the running child.
    pub async fn execute(&self, request: &CommandRequest) -> Result<String, ToolError> {
        let authorized = self.authorize(request).await.inspect_err(|e| {
            if !e.is_policy() {
                warn!("[{}] {e}", request.id);
            }
        })?;
        let slot = self.slots.acquire().await?;
        debug!(
            "[{}] slot acquired ({} free of {})",
            request.id,
            self.slots.available(),
            self.slots.capacity()
        );

        let (name, captured) = match request.tool {
            Tool::Infra => {
                let state = authorized.state.ok_or_else(|| {
                    ToolError::InitializationFailed("infra shell state is not loaded".into())
                })?;
                let pool = self
                    .pool
                    .get_or_init(|| async move {
                        WorkerPool::start(self.config.workers(), self.shell.program().to_string(), state)
                    })
                    .await;
                let (reply, rx) = oneshot::channel();
                pool.submit(Job {
                    injected: authorized.injected,
                    user: request.argv.clone(),
                    user_flags: authorized.user_flags,
                    slot,
                    reply,
                })
                .await?;
                let result = rx.await.map_err(|_| ToolError::ExecutionFailed {
                    code: None,
                    message: "infra worker dropped the request".into(),
                })?;
                (Tool::Infra.program(), result)
            }
            Tool::Cluster => {
                let mut args = authorized.injected;
                args.extend(request.argv.iter().cloned());
                let invocation = Invocation::new(self.cluster_program.clone(), args);
                (Tool::Cluster.program(), process::run(invocation, slot).await)
            }
        };

        let output = captured.and_then(|c| c.into_output(name));
        if let Err(e) = &output {
            warn!("[{}] {}", request.id, e);
        }
        output
    }
}
