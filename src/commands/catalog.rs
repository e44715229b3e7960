use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::commands::{CommandPolicy, blocked_message};
use crate::eval::{CommandContext, PolicyDecision};
use crate::request::Mode;

/// Only groups in this namespace contribute commands.
const GROUP_NAMESPACE: &str = "openstack.";

/// Flags that make a command-less invocation informational.
const INFO_FLAGS: &[&str] = &["--help", "-h", "--version"];

/// One group of `command list -f json` output.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandGroup {
    #[serde(rename = "Command Group")]
    pub group: String,
    #[serde(rename = "Commands")]
    pub commands: Vec<String>,
}

/// Decode `command list -f json` output.
pub fn parse_command_list(stdout: &str) -> Result<Vec<CommandGroup>, serde_json::Error> {
    serde_json::from_str(stdout.trim_start_matches('\0'))
}

/// Split a command or verb into words: "volume_summary" and "volume summary" are equal.
fn words_of(name: &str) -> Vec<String> {
    name.split([' ', '_'])
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

/// Verbs and command names that keep a command runnable in read-only mode.
#[derive(Debug, Clone, Default)]
pub struct VerbWhitelist {
    entries: Vec<Vec<String>>,
}

impl VerbWhitelist {
    pub fn new(verbs: &[String]) -> Self {
        Self {
            entries: verbs
                .iter()
                .map(|v| words_of(v))
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// The first entry appearing as a contiguous run of `words`.
    pub fn matching(&self, words: &[String]) -> Option<String> {
        self.entries
            .iter()
            .find(|e| e.len() <= words.len() && words.windows(e.len()).any(|w| w == e.as_slice()))
            .map(|e| e.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Runnable,
    Blocked,
}

/// Installed commands of the infra tool, classified once.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, Entry>,
    max_words: usize,
    /// API names of the installed command groups (`openstack.<api>.v2` → `<api>`).
    apis: HashSet<String>,
}

impl Catalog {
    pub fn build(groups: &[CommandGroup], verbs: &VerbWhitelist, mode: Mode, builtins: &[String]) -> Self {
        let mut catalog = Self::default();
        for group in groups.iter().filter(|g| g.group.starts_with(GROUP_NAMESPACE)) {
            if let Some(api) = group.group[GROUP_NAMESPACE.len()..].split('.').next() {
                catalog.apis.insert(api.to_string());
            }
            for name in &group.commands {
                let words = words_of(name);
                if words.is_empty() {
                    continue;
                }
                let entry = match mode {
                    Mode::Write => Entry::Runnable,
                    Mode::ReadOnly if verbs.matching(&words).is_some() => Entry::Runnable,
                    Mode::ReadOnly => Entry::Blocked,
                };
                catalog.insert(words, entry);
            }
        }
        for builtin in builtins {
            let words = words_of(builtin);
            if !words.is_empty() {
                catalog.insert(words, Entry::Runnable);
            }
        }
        catalog
    }

    fn insert(&mut self, words: Vec<String>, entry: Entry) {
        self.max_words = self.max_words.max(words.len());
        // A name listed in several groups stays runnable if any listing is.
        let slot = self.entries.entry(words.join(" ")).or_insert(Entry::Blocked);
        if entry == Entry::Runnable {
            *slot = Entry::Runnable;
        }
    }

    pub fn has_api(&self, api: &str) -> bool {
        self.apis.contains(api)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Longest catalog command that is a prefix of `words`.
    pub fn lookup(&self, words: &[String]) -> Option<(String, &Entry)> {
        (1..=self.max_words.min(words.len())).rev().find_map(|k| {
            let name = words[..k].join(" ");
            self.entries.get(&name).map(|entry| (name, entry))
        })
    }

    /// Sorted (runnable, blocked) command names.
    pub fn partition(&self) -> (Vec<&str>, Vec<&str>) {
        let (mut runnable, mut blocked): (Vec<&str>, Vec<&str>) = (Vec::new(), Vec::new());
        for (name, entry) in &self.entries {
            match entry {
                Entry::Runnable => runnable.push(name.as_str()),
                Entry::Blocked => blocked.push(name.as_str()),
            }
        }
        runnable.sort_unstable();
        blocked.sort_unstable();
        (runnable, blocked)
    }
}

impl CommandPolicy for Catalog {
    fn classify(&self, ctx: &CommandContext) -> PolicyDecision {
        let words = ctx.words();
        if words.is_empty() {
            if ctx.has_any_flag(INFO_FLAGS) {
                return PolicyDecision::allow("informational");
            }
            return PolicyDecision::deny("openstack interactive mode is not available");
        }
        match self.lookup(words) {
            Some((name, Entry::Runnable)) => PolicyDecision::allow(format!("catalog command '{name}'")),
            Some((name, Entry::Blocked)) => PolicyDecision::deny(blocked_message(&name)),
            None => PolicyDecision::not_found(format!(
                "'{}' is not an openstack command",
                words.join(" ")
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::eval::Decision;
    use crate::parse::ArgSpec;
    use crate::request::{CommandRequest, Credentials, Tool};

    const COMMAND_LIST: &str = r#"[
        {"Command Group": "openstack.common", "Commands": ["availability zone list", "quota show", "quota set"]},
        {"Command Group": "openstack.compute.v2", "Commands": ["server list", "server show", "server delete", "server create"]},
        {"Command Group": "openstack.volume.v3", "Commands": ["volume summary", "volume delete", "volume list"]},
        {"Command Group": "openstack.alarming.v2", "Commands": ["alarm-history show", "alarm-history purge"]},
        {"Command Group": "cliff.demo", "Commands": ["demo list"]}
    ]"#;

    fn catalog(mode: Mode) -> Catalog {
        let config = Config::default_config();
        let groups = parse_command_list(COMMAND_LIST).unwrap();
        Catalog::build(
            &groups,
            &VerbWhitelist::new(&config.infra.accept_verbs),
            mode,
            &config.infra.builtins,
        )
    }

    fn eval(mode: Mode, cmd: &str) -> PolicyDecision {
        let config = Config::default_config();
        let req = CommandRequest::parse(Tool::Infra, cmd, mode, Credentials::default()).unwrap();
        let args = ArgSpec::from_config(&config.infra.arguments)
            .parse(&req.argv)
            .unwrap();
        catalog(mode).classify(&CommandContext::new(&req, args))
    }

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn command_list_tolerates_leading_nul() {
        let groups = parse_command_list(&format!("\0\0{COMMAND_LIST}")).unwrap();
        assert_eq!(groups.len(), 5);
    }

    #[test]
    fn verbs_match_single_words() {
        let verbs = VerbWhitelist::new(&["list".into()]);
        assert_eq!(verbs.matching(&words("server list")).as_deref(), Some("list"));
        assert!(verbs.matching(&words("server delete")).is_none());
    }

    #[test]
    fn verbs_match_contiguous_runs() {
        let verbs = VerbWhitelist::new(&["alarm-history show".into(), "volume_summary".into()]);
        assert!(verbs.matching(&words("alarm-history show")).is_some());
        assert!(verbs.matching(&words("volume summary")).is_some());
        assert!(verbs.matching(&words("show alarm-history")).is_none());
        assert!(verbs.matching(&words("alarm-history purge")).is_none());
    }

    #[test]
    fn build_skips_foreign_groups() {
        let c = catalog(Mode::Write);
        assert!(c.lookup(&words("demo list")).is_none());
        assert!(c.lookup(&words("server list")).is_some());
    }

    #[test]
    fn build_records_installed_apis() {
        let c = catalog(Mode::ReadOnly);
        assert!(c.has_api("compute"));
        assert!(c.has_api("alarming"));
        assert!(!c.has_api("demo"));
        assert!(!c.has_api("network"));
    }

    #[test]
    fn read_only_partition() {
        let c = catalog(Mode::ReadOnly);
        let (runnable, blocked) = c.partition();
        assert!(runnable.contains(&"server list"));
        assert!(runnable.contains(&"volume summary"));
        assert!(runnable.contains(&"alarm-history show"));
        assert!(runnable.contains(&"help"));
        assert!(blocked.contains(&"server delete"));
        assert!(blocked.contains(&"quota set"));
        assert!(blocked.contains(&"alarm-history purge"));
    }

    #[test]
    fn write_mode_everything_runnable() {
        let c = catalog(Mode::Write);
        let (_, blocked) = c.partition();
        assert!(blocked.is_empty());
    }

    #[test]
    fn lookup_is_longest_prefix() {
        let c = catalog(Mode::ReadOnly);
        let (name, entry) = c.lookup(&words("availability zone list --long")).unwrap();
        assert_eq!(name, "availability zone list");
        assert_eq!(entry, &Entry::Runnable);
    }

    #[test]
    fn allow_list() {
        assert_eq!(eval(Mode::ReadOnly, "server list --long").decision, Decision::Allow);
    }

    #[test]
    fn allow_show_with_argument() {
        assert_eq!(eval(Mode::ReadOnly, "server show my-server").decision, Decision::Allow);
    }

    #[test]
    fn blocked_is_denied() {
        let decision = eval(Mode::ReadOnly, "server delete my-server");
        assert_eq!(decision.decision, Decision::Deny);
        assert_eq!(
            decision.reason,
            "Command server delete is currently blocked for LLM use as it could modify the deployment."
        );
    }

    #[test]
    fn unknown_is_not_found() {
        let decision = eval(Mode::ReadOnly, "frobnicate everything");
        assert_eq!(decision.decision, Decision::NotFound);
        assert_eq!(decision.reason, "'frobnicate everything' is not an openstack command");
    }

    #[test]
    fn write_mode_runs_delete() {
        assert_eq!(eval(Mode::Write, "server delete my-server").decision, Decision::Allow);
    }

    #[test]
    fn help_builtin_is_runnable() {
        assert_eq!(eval(Mode::ReadOnly, "help server delete").decision, Decision::Allow);
    }

    #[test]
    fn bare_help_flag_is_informational() {
        assert_eq!(eval(Mode::ReadOnly, "--help").decision, Decision::Allow);
        assert_eq!(eval(Mode::ReadOnly, "--version").decision, Decision::Allow);
    }

    #[test]
    fn flags_without_command_are_denied() {
        assert_eq!(eval(Mode::ReadOnly, "--debug").decision, Decision::Deny);
    }
}
