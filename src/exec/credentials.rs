//! Parameters the gate adds in front of every caller argv.

use std::path::Path;

use log::debug;

use crate::config::{Config, expand_path};
use crate::error::ToolError;
use crate::request::{Credentials, Tool};

/// Both must exist in the same directory for file-based infra credentials.
const CREDENTIAL_FILES: &[&str] = &["clouds.yaml", "secure.yaml"];

/// Per-tool TLS parameters from configuration.
pub fn static_args(config: &Config, tool: Tool) -> Vec<String> {
    let mut args = Vec::new();
    match tool {
        Tool::Infra => {
            if let Some(ca) = config.infra.ca_cert.as_deref() {
                args.push("--os-cacert".into());
                args.push(expand_path(ca).to_string_lossy().into_owned());
            }
            if config.infra.insecure {
                args.push("--insecure".into());
            }
        }
        Tool::Cluster => {
            if let Some(ca) = config.cluster.ca_cert.as_deref() {
                args.push(format!(
                    "--certificate-authority={}",
                    expand_path(ca).to_string_lossy()
                ));
            }
            if config.cluster.insecure {
                args.push("--insecure-skip-tls-verify=true".into());
            }
        }
    }
    args
}

fn has_credential_files(dir: &Path) -> bool {
    CREDENTIAL_FILES.iter().all(|f| dir.join(f).is_file())
}

/// Caller-scoped credential flags.
///
/// Infra needs the token and URL together; without them a clouds.yaml and
/// secure.yaml pair must be on disk or the request fails.
pub fn credential_args(
    config: &Config,
    tool: Tool,
    credentials: &Credentials,
) -> Result<Vec<String>, ToolError> {
    match tool {
        Tool::Infra => {
            if let (Some(token), Some(url)) = (&credentials.token, &credentials.endpoint) {
                debug!("infra credentials from request for {url}");
                return Ok(vec![
                    "--os-token".into(),
                    token.clone(),
                    "--os-url".into(),
                    url.clone(),
                ]);
            }
            let found = config
                .infra
                .credential_dirs
                .iter()
                .map(|d| expand_path(d))
                .find(|d| has_credential_files(d));
            match found {
                Some(dir) => {
                    debug!("infra credentials from {}", dir.display());
                    Ok(Vec::new())
                }
                None => Err(ToolError::MissingCredentials(
                    "Missing OpenStack credentials".into(),
                )),
            }
        }
        Tool::Cluster => {
            let mut args = Vec::new();
            if let Some(token) = &credentials.token {
                args.push("--token".into());
                args.push(token.clone());
            }
            if let Some(url) = &credentials.endpoint {
                args.push("--server".into());
                args.push(url.clone());
            }
            Ok(args)
        }
    }
}

/// Static parameters first, then credentials.
pub fn injected_args(
    config: &Config,
    tool: Tool,
    credentials: &Credentials,
) -> Result<Vec<String>, ToolError> {
    let mut args = static_args(config, tool);
    args.extend(credential_args(config, tool, credentials)?);
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(token: &str, url: &str) -> Credentials {
        Credentials::new(Some(token.into()), Some(url.into()))
    }

    fn temp_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("ops-toolgate-creds-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config_with_dirs(dirs: Vec<String>) -> Config {
        let mut config = Config::default_config();
        config.infra.credential_dirs = dirs;
        config
    }

    #[test]
    fn cluster_static_then_credentials() {
        let mut config = Config::default_config();
        config.cluster.insecure = true;
        config.cluster.ca_cert = Some("/etc/ca.pem".into());
        let args = injected_args(&config, Tool::Cluster, &creds("t0k", "https://api:6443")).unwrap();
        assert_eq!(
            args,
            vec![
                "--certificate-authority=/etc/ca.pem",
                "--insecure-skip-tls-verify=true",
                "--token",
                "t0k",
                "--server",
                "https://api:6443",
            ]
        );
    }

    #[test]
    fn cluster_token_only() {
        let config = Config::default_config();
        let args = credential_args(
            &config,
            Tool::Cluster,
            &Credentials::new(Some("t0k".into()), None),
        )
        .unwrap();
        assert_eq!(args, vec!["--token", "t0k"]);
    }

    #[test]
    fn cluster_without_credentials_uses_kubeconfig() {
        let config = Config::default_config();
        let args = injected_args(&config, Tool::Cluster, &Credentials::default()).unwrap();
        assert!(args.is_empty());
    }

    #[test]
    fn infra_static_then_credentials() {
        let mut config = Config::default_config();
        config.infra.ca_cert = Some("/etc/ca.pem".into());
        config.infra.insecure = true;
        let args = injected_args(&config, Tool::Infra, &creds("t0k", "https://nova")).unwrap();
        assert_eq!(
            args,
            vec![
                "--os-cacert",
                "/etc/ca.pem",
                "--insecure",
                "--os-token",
                "t0k",
                "--os-url",
                "https://nova",
            ]
        );
    }

    #[test]
    fn infra_without_credentials_or_files_fails() {
        let empty = temp_dir();
        let config = config_with_dirs(vec![empty.to_string_lossy().into_owned()]);
        let err = credential_args(&config, Tool::Infra, &Credentials::default()).unwrap_err();
        assert_eq!(err, ToolError::MissingCredentials("Missing OpenStack credentials".into()));
        std::fs::remove_dir_all(empty).ok();
    }

    #[test]
    fn infra_token_without_url_falls_back_to_files() {
        let empty = temp_dir();
        let config = config_with_dirs(vec![empty.to_string_lossy().into_owned()]);
        let err = credential_args(
            &config,
            Tool::Infra,
            &Credentials::new(Some("t0k".into()), None),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "missing_credentials");
        std::fs::remove_dir_all(empty).ok();
    }

    #[test]
    fn infra_files_need_both() {
        let dir = temp_dir();
        std::fs::write(dir.join("clouds.yaml"), "clouds: {}\n").unwrap();
        let config = config_with_dirs(vec![dir.to_string_lossy().into_owned()]);
        assert!(credential_args(&config, Tool::Infra, &Credentials::default()).is_err());

        std::fs::write(dir.join("secure.yaml"), "clouds: {}\n").unwrap();
        let args = credential_args(&config, Tool::Infra, &Credentials::default()).unwrap();
        assert!(args.is_empty());
        std::fs::remove_dir_all(dir).ok();
    }
}
