use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

/// Environment variable naming an overlay file.
pub const CONFIG_ENV_VAR: &str = "OPS_TOOLGATE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Final (merged) config types ──

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub infra: InfraConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub debug: bool,
    /// Upper bound on concurrently running external processes.
    #[serde(default = "default_pool_size")]
    pub processes_pool_size: usize,
    /// Infra worker count; 0 follows `processes_pool_size`.
    #[serde(default)]
    pub workers: usize,
    /// Decision log path; empty disables it.
    #[serde(default)]
    pub decision_log: String,
}

fn default_pool_size() -> usize {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            processes_pool_size: default_pool_size(),
            workers: 0,
            decision_log: String::new(),
        }
    }
}

/// Global-option grammar and flag deny-lists for one tool.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ArgumentsConfig {
    /// Leading global options must be listed in `switches` or `options`.
    #[serde(default)]
    pub closed: bool,
    /// Long options may be shortened to any prefix.
    #[serde(default)]
    pub abbreviations: bool,
    /// Removed from the grammar entirely.
    #[serde(default)]
    pub delete: Vec<String>,
    /// Kept in the grammar for injection but refused from callers.
    #[serde(default)]
    pub reject: Vec<String>,
    /// Options that take no value.
    #[serde(default)]
    pub switches: Vec<String>,
    /// Options that take a value; `*` matches any run of characters.
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InfraConfig {
    #[serde(default = "default_infra_binary")]
    pub binary: String,
    #[serde(default)]
    pub allow_write: bool,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(default)]
    pub credential_dirs: Vec<String>,
    #[serde(default)]
    pub builtins: Vec<String>,
    #[serde(default)]
    pub accept_verbs: Vec<String>,
    #[serde(default)]
    pub arguments: ArgumentsConfig,
}

fn default_infra_binary() -> String {
    "openstack".into()
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            binary: default_infra_binary(),
            allow_write: false,
            insecure: false,
            ca_cert: None,
            credential_dirs: Vec::new(),
            builtins: Vec::new(),
            accept_verbs: Vec::new(),
            arguments: ArgumentsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    #[serde(default = "default_cluster_binary")]
    pub binary: String,
    #[serde(default)]
    pub allow_write: bool,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(default)]
    pub allowed_commands: Vec<String>,
    #[serde(default)]
    pub blocked_commands: Vec<String>,
    #[serde(default)]
    pub arguments: ArgumentsConfig,
}

fn default_cluster_binary() -> String {
    "oc".into()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            binary: default_cluster_binary(),
            allow_write: false,
            insecure: false,
            ca_cert: None,
            allowed_commands: Vec::new(),
            blocked_commands: Vec::new(),
            arguments: ArgumentsConfig::default(),
        }
    }
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    settings: SettingsOverlay,
    #[serde(default)]
    infra: InfraOverlay,
    #[serde(default)]
    cluster: ClusterOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct SettingsOverlay {
    debug: Option<bool>,
    processes_pool_size: Option<usize>,
    workers: Option<usize>,
    decision_log: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ArgumentsOverlay {
    #[serde(default)]
    replace: bool,
    closed: Option<bool>,
    abbreviations: Option<bool>,
    #[serde(default)]
    delete: Vec<String>,
    #[serde(default)]
    reject: Vec<String>,
    #[serde(default)]
    switches: Vec<String>,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    remove_delete: Vec<String>,
    #[serde(default)]
    remove_reject: Vec<String>,
    #[serde(default)]
    remove_switches: Vec<String>,
    #[serde(default)]
    remove_options: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct InfraOverlay {
    #[serde(default)]
    replace: bool,
    binary: Option<String>,
    allow_write: Option<bool>,
    insecure: Option<bool>,
    ca_cert: Option<String>,
    #[serde(default)]
    credential_dirs: Vec<String>,
    #[serde(default)]
    builtins: Vec<String>,
    #[serde(default)]
    accept_verbs: Vec<String>,
    #[serde(default)]
    remove_credential_dirs: Vec<String>,
    #[serde(default)]
    remove_builtins: Vec<String>,
    #[serde(default)]
    remove_accept_verbs: Vec<String>,
    #[serde(default)]
    arguments: ArgumentsOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct ClusterOverlay {
    #[serde(default)]
    replace: bool,
    binary: Option<String>,
    allow_write: Option<bool>,
    insecure: Option<bool>,
    ca_cert: Option<String>,
    #[serde(default)]
    allowed_commands: Vec<String>,
    #[serde(default)]
    blocked_commands: Vec<String>,
    #[serde(default)]
    remove_allowed_commands: Vec<String>,
    #[serde(default)]
    remove_blocked_commands: Vec<String>,
    #[serde(default)]
    arguments: ArgumentsOverlay,
}

// ── Merge logic ──

/// Merge a user list into a default list.
/// In replace mode: user list replaces default entirely.
/// In merge mode: remove items first, then extend with additions (deduped).
fn merge_list(base: &mut Vec<String>, add: Vec<String>, remove: &[String], replace: bool) {
    if replace {
        *base = add;
    } else {
        base.retain(|item| !remove.contains(item));
        for item in add {
            if !base.contains(&item) {
                base.push(item);
            }
        }
    }
}

fn merge_arguments(base: &mut ArgumentsConfig, a: ArgumentsOverlay) {
    if let Some(v) = a.closed {
        base.closed = v;
    }
    if let Some(v) = a.abbreviations {
        base.abbreviations = v;
    }
    merge_list(&mut base.delete, a.delete, &a.remove_delete, a.replace);
    merge_list(&mut base.reject, a.reject, &a.remove_reject, a.replace);
    merge_list(&mut base.switches, a.switches, &a.remove_switches, a.replace);
    merge_list(&mut base.options, a.options, &a.remove_options, a.replace);
}

/// Expand `~` and `$VAR` in a configured path, leaving it untouched on failure.
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge the overlay from `path`, else `$OPS_TOOLGATE_CONFIG`,
    ///    else ~/.config/ops-toolgate/config.toml (if it exists)
    ///
    /// User config merges with defaults: lists extend, scalars override.
    /// Set `replace = true` in any section to replace its defaults entirely.
    /// Use `remove_<field>` lists to subtract specific items from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default_config();
        if let Some(path) = Self::overlay_path(path) {
            let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let overlay: ConfigOverlay =
                toml::from_str(&content).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
            config.apply_overlay(overlay);
        }
        config.validate()?;
        Ok(config)
    }

    /// An explicit or env-named overlay must exist; the home overlay is optional.
    fn overlay_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(path));
        }
        let home = expand_path("~/.config/ops-toolgate/config.toml");
        home.is_file().then_some(home)
    }

    /// Apply an overlay on top of this config (merge semantics).
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        // Settings: scalar overrides
        let s = overlay.settings;
        if let Some(v) = s.debug {
            self.settings.debug = v;
        }
        if let Some(v) = s.processes_pool_size {
            self.settings.processes_pool_size = v;
        }
        if let Some(v) = s.workers {
            self.settings.workers = v;
        }
        if let Some(v) = s.decision_log {
            self.settings.decision_log = v;
        }

        // Infra
        let i = overlay.infra;
        if let Some(v) = i.binary {
            self.infra.binary = v;
        }
        if let Some(v) = i.allow_write {
            self.infra.allow_write = v;
        }
        if let Some(v) = i.insecure {
            self.infra.insecure = v;
        }
        if let Some(v) = i.ca_cert {
            self.infra.ca_cert = Some(v).filter(|p| !p.is_empty());
        }
        merge_list(
            &mut self.infra.credential_dirs,
            i.credential_dirs,
            &i.remove_credential_dirs,
            i.replace,
        );
        merge_list(
            &mut self.infra.builtins,
            i.builtins,
            &i.remove_builtins,
            i.replace,
        );
        merge_list(
            &mut self.infra.accept_verbs,
            i.accept_verbs,
            &i.remove_accept_verbs,
            i.replace,
        );
        merge_arguments(&mut self.infra.arguments, i.arguments);

        // Cluster
        let c = overlay.cluster;
        if let Some(v) = c.binary {
            self.cluster.binary = v;
        }
        if let Some(v) = c.allow_write {
            self.cluster.allow_write = v;
        }
        if let Some(v) = c.insecure {
            self.cluster.insecure = v;
        }
        if let Some(v) = c.ca_cert {
            self.cluster.ca_cert = Some(v).filter(|p| !p.is_empty());
        }
        merge_list(
            &mut self.cluster.allowed_commands,
            c.allowed_commands,
            &c.remove_allowed_commands,
            c.replace,
        );
        merge_list(
            &mut self.cluster.blocked_commands,
            c.blocked_commands,
            &c.remove_blocked_commands,
            c.replace,
        );
        merge_arguments(&mut self.cluster.arguments, c.arguments);
    }

    /// Reject settings the engine cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.processes_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "settings.processes_pool_size must be at least 1".into(),
            ));
        }
        // Infra jobs hold their slot while queued for a worker.
        let (workers, slots) = (self.settings.workers, self.settings.processes_pool_size);
        if workers != 0 && workers < slots {
            return Err(ConfigError::Invalid(format!(
                "settings.workers ({workers}) must be 0 or at least processes_pool_size ({slots})"
            )));
        }
        for (section, args) in [
            ("infra", &self.infra.arguments),
            ("cluster", &self.cluster.arguments),
        ] {
            if let Some(flag) = args.delete.iter().find(|f| args.reject.contains(f)) {
                return Err(ConfigError::Invalid(format!(
                    "{section}.arguments: {flag} is in both delete and reject"
                )));
            }
            if let Some(flag) = args
                .delete
                .iter()
                .chain(&args.reject)
                .find(|f| !f.starts_with('-') || f.contains('='))
            {
                return Err(ConfigError::Invalid(format!(
                    "{section}.arguments: {flag:?} is not a flag name"
                )));
            }
        }
        for (field, entries) in [
            ("allowed_commands", &self.cluster.allowed_commands),
            ("blocked_commands", &self.cluster.blocked_commands),
        ] {
            if entries.iter().any(|e| e.split_whitespace().next().is_none()) {
                return Err(ConfigError::Invalid(format!(
                    "cluster.{field} contains an empty entry"
                )));
            }
        }
        if self.infra.binary.trim().is_empty() || self.cluster.binary.trim().is_empty() {
            return Err(ConfigError::Invalid("tool binary must not be empty".into()));
        }
        Ok(())
    }

    /// Number of infra pool workers.
    pub fn workers(&self) -> usize {
        match self.settings.workers {
            0 => self.settings.processes_pool_size,
            n => n,
        }
    }

    /// Apply an overlay from a TOML string.
    #[cfg(test)]
    pub(crate) fn apply_overlay_str(&mut self, toml_str: &str) {
        let overlay: ConfigOverlay = toml::from_str(toml_str).unwrap();
        self.apply_overlay(overlay);
    }
}
