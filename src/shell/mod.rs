//! Process-wide state of the infra tool, loaded once.
//!
//! The first infra request enumerates the installed command catalog and
//! negotiates API versions. Concurrent first requests wait for that load;
//! its outcome, success or failure, is kept for the life of the process.

pub mod versions;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{debug, error, info};
use tokio::sync::OnceCell;

use crate::commands::catalog::{Catalog, VerbWhitelist, parse_command_list};
use crate::config::{InfraConfig, expand_path};
use crate::error::ToolError;
use crate::exec::process::{self, Invocation};
use crate::exec::slots::Slots;
use crate::request::Mode;

pub use versions::ApiVersions;

const COMMAND_LIST: &[&str] = &["command", "list", "-f", "json"];
const VERSIONS_SHOW: &[&str] = &["versions", "show", "-f", "json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Loading => "loading",
            Phase::Ready => "ready",
            Phase::Failed => "failed",
        }
    }
}

/// Everything learned during loading. Never mutated afterwards.
#[derive(Debug)]
pub struct ShellState {
    pub catalog: Catalog,
    pub versions: ApiVersions,
}

/// Resets the loading flag even when the load future is dropped.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Shell {
    program: String,
    mode: Mode,
    verbs: VerbWhitelist,
    builtins: Vec<String>,
    cell: OnceCell<Result<Arc<ShellState>, ToolError>>,
    loading: AtomicBool,
    loads: AtomicUsize,
}

impl Shell {
    pub fn new(config: &InfraConfig) -> Self {
        Self {
            program: expand_path(&config.binary).to_string_lossy().into_owned(),
            mode: Mode::from_allow_write(config.allow_write),
            verbs: VerbWhitelist::new(&config.accept_verbs),
            builtins: config.builtins.clone(),
            cell: OnceCell::new(),
            loading: AtomicBool::new(false),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn phase(&self) -> Phase {
        match self.cell.get() {
            Some(Ok(_)) => Phase::Ready,
            Some(Err(_)) => Phase::Failed,
            None if self.loading.load(Ordering::SeqCst) => Phase::Loading,
            None => Phase::Uninitialized,
        }
    }

    /// Number of loads started. Stays at 1 once loading has completed.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Load on first use; later callers get the cached outcome.
    ///
    /// `injected` authenticates the version probe of the first caller.
    pub async fn ready(&self, slots: &Slots, injected: &[String]) -> Result<Arc<ShellState>, ToolError> {
        self.cell
            .get_or_init(|| self.load(slots, injected))
            .await
            .clone()
    }

    async fn load(&self, slots: &Slots, injected: &[String]) -> Result<Arc<ShellState>, ToolError> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        self.loading.store(true, Ordering::SeqCst);
        let _guard = LoadingGuard(&self.loading);
        info!(
            "loading {} catalog in {} mode (attempt {attempt})",
            self.program,
            self.mode.as_str()
        );

        match self.discover(slots, injected).await {
            Ok(state) => {
                info!(
                    "{} ready: {} commands, {} negotiated API versions",
                    self.program,
                    state.catalog.len(),
                    state.versions.len()
                );
                Ok(Arc::new(state))
            }
            Err(e) => {
                error!("{} failed to load: {e}", self.program);
                Err(e)
            }
        }
    }

    async fn discover(&self, slots: &Slots, injected: &[String]) -> Result<ShellState, ToolError> {
        let listing = self.probe(slots, COMMAND_LIST.iter().map(|s| s.to_string()).collect()).await?;
        let groups = parse_command_list(&listing)
            .map_err(|e| ToolError::InitializationFailed(format!("cannot decode command list: {e}")))?;
        let catalog = Catalog::build(&groups, &self.verbs, self.mode, &self.builtins);
        debug!("catalog has {} entries", catalog.len());

        let mut args = injected.to_vec();
        args.extend(VERSIONS_SHOW.iter().map(|s| s.to_string()));
        let listing = self.probe(slots, args).await?;
        let mut versions = ApiVersions::parse(&listing)
            .map_err(|e| ToolError::InitializationFailed(format!("cannot decode API versions: {e}")))?;
        // A version flag for a client plugin that is not installed breaks every command.
        versions.retain(|api| catalog.has_api(api));

        Ok(ShellState { catalog, versions })
    }

    /// One warm-up process, counted against the shared slots.
    async fn probe(&self, slots: &Slots, args: Vec<String>) -> Result<String, ToolError> {
        let invocation = Invocation::new(self.program.clone(), args);
        let name = invocation.name().to_string();
        let slot = slots.acquire().await?;
        process::run(invocation, slot)
            .await
            .and_then(|captured| captured.into_output(&name))
            .map_err(|e| ToolError::InitializationFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn new_shell_is_uninitialized() {
        let shell = Shell::new(&Config::default_config().infra);
        assert_eq!(shell.phase(), Phase::Uninitialized);
        assert_eq!(shell.loads(), 0);
        assert_eq!(shell.phase().as_str(), "uninitialized");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_binary_fails_sticky() {
        let mut config = Config::default_config().infra;
        config.binary = "/nonexistent/openstack".into();
        let shell = Shell::new(&config);
        let slots = Slots::new(2);

        let first = shell.ready(&slots, &[]).await.unwrap_err();
        assert_eq!(first.kind(), "initialization_failed");
        assert_eq!(shell.phase(), Phase::Failed);

        let second = shell.ready(&slots, &[]).await.unwrap_err();
        assert_eq!(second, first);
        assert_eq!(shell.loads(), 1);
        assert_eq!(slots.available(), 2);
    }
}
