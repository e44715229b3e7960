use std::collections::BTreeMap;

use serde::Deserialize;

/// One row of `versions show -f json`.
#[derive(Debug, Deserialize)]
struct VersionRecord {
    #[serde(rename = "Service Type")]
    service_type: String,
    #[serde(rename = "Version", default)]
    version: Option<String>,
    #[serde(rename = "Max Microversion", default)]
    max_microversion: Option<String>,
    #[serde(rename = "Status", default)]
    status: Option<String>,
}

/// Services whose clients only accept a major version.
const MAJOR_ONLY: &[&str] = &["identity", "key_manager"];

/// API name used in `--os-<api>-api-version` for a service type.
pub fn api_name(service_type: &str) -> String {
    let mapped = match service_type {
        "block-storage" | "volumev2" | "volumev3" => "volume",
        "metric-storage" => "metric",
        "operator-policy" => "congressclient",
        "alarm" => "alarming",
        "resource-cluster" | "cluster" => "clustering",
        "application-container" => "container",
        "message" => "messaging",
        "resource-optimization" => "infra-optim",
        "root-cause-analysis" => "rca",
        "workflow" | "workflowv2" => "workflow_engine",
        other => other,
    };
    mapped.replace('-', "_")
}

/// The option carrying an API version: `infra_optim` → `--os-infra-optim-api-version`.
pub fn version_flag(api: &str) -> String {
    format!("--os-{}-api-version", api.replace('_', "-"))
}

/// Latest API version per service, applied as defaults to every command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiVersions {
    defaults: BTreeMap<String, String>,
}

impl ApiVersions {
    /// Decode a `versions show -f json` document, keeping CURRENT entries.
    pub fn parse(stdout: &str) -> Result<Self, serde_json::Error> {
        let records: Vec<VersionRecord> = serde_json::from_str(stdout.trim_start_matches('\0'))?;
        let mut defaults = BTreeMap::new();
        for record in records {
            if record.status.as_deref() != Some("CURRENT") {
                continue;
            }
            let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
            let Some(mut version) =
                non_empty(record.max_microversion).or_else(|| non_empty(record.version))
            else {
                continue;
            };
            let api = api_name(&record.service_type);
            if MAJOR_ONLY.contains(&api.as_str())
                && let Some((major, _)) = version.split_once('.')
            {
                version = major.to_string();
            }
            defaults.insert(api, version);
        }
        Ok(Self { defaults })
    }

    /// Drop services the installed client cannot take a version flag for.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.defaults.retain(|api, _| keep(api));
    }

    pub fn get(&self, api: &str) -> Option<&str> {
        self.defaults.get(api).map(String::as_str)
    }

    /// (api, version) pairs in api order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defaults.iter().map(|(a, v)| (a.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.defaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }

    /// Version flags for every service the caller did not set explicitly.
    pub fn apply(&self, user_flags: &[String]) -> Vec<String> {
        let mut args = Vec::with_capacity(self.defaults.len() * 2);
        for (api, version) in &self.defaults {
            let flag = version_flag(api);
            if !user_flags.contains(&flag) {
                args.push(flag);
                args.push(version.clone());
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSIONS: &str = r#"[
        {"Region Name": "regionOne", "Service Type": "identity", "Endpoint": "https://keystone/v3", "Status": "CURRENT", "Version": "3.14", "Min Microversion": null, "Max Microversion": null},
        {"Region Name": "regionOne", "Service Type": "compute", "Endpoint": "https://nova/v2.1", "Status": "CURRENT", "Version": "2.1", "Min Microversion": "2.1", "Max Microversion": "2.95"},
        {"Region Name": "regionOne", "Service Type": "compute", "Endpoint": "https://nova/v2", "Status": "SUPPORTED", "Version": "2.0", "Min Microversion": null, "Max Microversion": null},
        {"Region Name": "regionOne", "Service Type": "block-storage", "Endpoint": "https://cinder/v3", "Status": "CURRENT", "Version": "3.0", "Min Microversion": "3.0", "Max Microversion": "3.70"},
        {"Region Name": "regionOne", "Service Type": "key-manager", "Endpoint": "https://barbican/v1", "Status": "CURRENT", "Version": "1.1", "Min Microversion": null, "Max Microversion": ""},
        {"Region Name": "regionOne", "Service Type": "resource-optimization", "Endpoint": "https://watcher/v1", "Status": "CURRENT", "Version": "1.0", "Min Microversion": "1.0", "Max Microversion": "1.4"}
    ]"#;

    #[test]
    fn api_name_aliases() {
        assert_eq!(api_name("volumev3"), "volume");
        assert_eq!(api_name("cluster"), "clustering");
        assert_eq!(api_name("workflowv2"), "workflow_engine");
        assert_eq!(api_name("resource-optimization"), "infra_optim");
        assert_eq!(api_name("key-manager"), "key_manager");
        assert_eq!(api_name("network"), "network");
    }

    #[test]
    fn version_flag_uses_dashes() {
        assert_eq!(version_flag("infra_optim"), "--os-infra-optim-api-version");
        assert_eq!(version_flag("compute"), "--os-compute-api-version");
    }

    #[test]
    fn parse_keeps_current_max_microversion() {
        let versions = ApiVersions::parse(VERSIONS).unwrap();
        assert_eq!(versions.get("compute"), Some("2.95"));
        assert_eq!(versions.get("volume"), Some("3.70"));
        assert_eq!(versions.get("infra_optim"), Some("1.4"));
    }

    #[test]
    fn parse_truncates_major_only_services() {
        let versions = ApiVersions::parse(VERSIONS).unwrap();
        assert_eq!(versions.get("identity"), Some("3"));
        assert_eq!(versions.get("key_manager"), Some("1"));
    }

    #[test]
    fn parse_strips_leading_nul() {
        let versions = ApiVersions::parse(&format!("\0{VERSIONS}")).unwrap();
        assert_eq!(versions.len(), 5);
    }

    #[test]
    fn apply_respects_caller_override() {
        let mut versions = ApiVersions::parse(VERSIONS).unwrap();
        versions.retain(|api| api == "compute" || api == "volume");
        let args = versions.apply(&["--os-compute-api-version".to_string()]);
        assert_eq!(args, vec!["--os-volume-api-version", "3.70"]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(ApiVersions::parse("not json").is_err());
    }
}
