//! Global-option grammar for a wrapped CLI.
//!
//! Two flag sets guard the grammar: *delete* flags are removed from it so any
//! use is an unrecognized argument, and *reject* flags stay in it (the gate
//! injects them) but are refused from callers before anything is parsed.

use crate::config::ArgumentsConfig;
use crate::error::ToolError;

/// Minimum characters after `--` for a token to count as an abbreviation.
const MIN_ABBREV: usize = 2;

/// How a flag token resolved against the grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolved {
    Switch(String),
    Option(String),
    Deleted(String),
    Ambiguous(Vec<String>),
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ArgSpec {
    delete: Vec<String>,
    reject: Vec<String>,
    switches: Vec<String>,
    options: Vec<String>,
    closed: bool,
    abbreviations: bool,
}

/// Caller argv reduced to what the policy engines look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArgs {
    /// Non-flag words, with flag values removed.
    pub words: Vec<String>,
    /// Non-flag words, treating every flag as a switch.
    pub bare_words: Vec<String>,
    /// Names of the flags present, resolved where the grammar knows them.
    pub flags: Vec<String>,
}

impl ParsedArgs {
    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|f| f == name)
    }
}

/// Match a flag name against a pattern with at most one `*`.
fn pattern_matches(pattern: &str, name: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == name,
        Some((head, tail)) => {
            name.len() > head.len() + tail.len() && name.starts_with(head) && name.ends_with(tail)
        }
    }
}

/// `--name=value` → `--name`; short flags are returned whole.
fn flag_name(token: &str) -> &str {
    if token.starts_with("--") {
        token.split_once('=').map_or(token, |(name, _)| name)
    } else {
        token
    }
}

/// Flag name as the wrapped CLI compares it: `--dry_run=x` → `--dry-run`.
fn canonical(token: &str) -> String {
    let name = flag_name(token);
    if name.starts_with("--") {
        name.replace('_', "-")
    } else {
        name.to_string()
    }
}

fn is_flag(token: &str) -> bool {
    token.len() > 1 && token.starts_with('-')
}

/// `-abc` → `abc`. Single short flags and long options are not clusters.
fn shorthand_cluster(token: &str) -> Option<&str> {
    token
        .strip_prefix('-')
        .filter(|rest| rest.chars().count() > 1 && !rest.starts_with('-'))
}

fn is_abbreviation(name: &str, of: &str) -> bool {
    name.starts_with("--") && name.len() >= 2 + MIN_ABBREV && of.starts_with(name)
}

/// How a shorthand cluster ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shorthand {
    /// Every letter was a switch, or the value was attached.
    Complete,
    /// The last letter takes a value from the next argument.
    NeedsValue,
    /// A letter the grammar does not know; `attached` when text follows it.
    Unknown { attached: bool },
}

impl ArgSpec {
    pub fn from_config(config: &ArgumentsConfig) -> Self {
        let names = |list: &[String]| -> Vec<String> { list.iter().map(|f| canonical(f)).collect() };
        Self {
            delete: names(&config.delete),
            reject: names(&config.reject),
            switches: names(&config.switches),
            options: names(&config.options),
            closed: config.closed,
            abbreviations: config.abbreviations,
        }
    }

    /// Refuse any caller token naming a reserved flag, wherever it appears.
    pub fn check_rejected(&self, argv: &[String]) -> Result<(), ToolError> {
        for token in argv.iter().filter(|t| is_flag(t)) {
            let hit = match shorthand_cluster(token) {
                Some(cluster) => self.rejected_in_cluster(cluster),
                None => self.rejected_flag(token),
            };
            if let Some(flag) = hit {
                return Err(ToolError::ArgumentRejected { flag: flag.clone() });
            }
        }
        Ok(())
    }

    /// `--flag`, `--flag=value`, `--fl` where abbreviations apply, or `-s`.
    fn rejected_flag(&self, token: &str) -> Option<&String> {
        let name = canonical(token);
        self.reject
            .iter()
            .find(|f| **f == name || (self.abbreviations && is_abbreviation(&name, f)))
    }

    /// Letters of `-abc` up to the first one that takes a value: `-As URL`,
    /// `-Ashttps://…` and `-shttps://…` all reach `-s`.
    fn rejected_in_cluster(&self, cluster: &str) -> Option<&String> {
        for c in cluster.chars() {
            if c == '=' {
                break;
            }
            let short = format!("-{c}");
            if let Some(flag) = self.reject.iter().find(|f| **f == short) {
                return Some(flag);
            }
            if self.is_option(&short) {
                break;
            }
        }
        None
    }

    fn is_switch(&self, name: &str) -> bool {
        self.switches.iter().any(|s| s == name)
    }

    fn is_option(&self, name: &str) -> bool {
        self.options.iter().any(|p| pattern_matches(p, name))
    }

    /// Walk `-abc` the way getopt-style parsers do, recording each flag.
    fn shorthand(&self, cluster: &str, flags: &mut Vec<String>) -> Shorthand {
        for (i, c) in cluster.char_indices() {
            let short = format!("-{c}");
            let attached = i + c.len_utf8() < cluster.len();
            if self.is_switch(&short) {
                flags.push(short);
                continue;
            }
            let known = self.is_option(&short);
            flags.push(short);
            return match (known, attached) {
                (true, true) => Shorthand::Complete,
                (true, false) => Shorthand::NeedsValue,
                (false, attached) => Shorthand::Unknown { attached },
            };
        }
        Shorthand::Complete
    }

    fn resolve(&self, token: &str) -> Resolved {
        let name = canonical(token);
        if self.is_switch(&name) {
            return Resolved::Switch(name);
        }
        if self.is_option(&name) {
            return Resolved::Option(name);
        }
        if self.delete.contains(&name) {
            return Resolved::Deleted(name);
        }
        if !self.abbreviations || !name.starts_with("--") {
            return Resolved::Unknown;
        }

        let grammar: Vec<&String> = self
            .switches
            .iter()
            .chain(self.options.iter().filter(|o| !o.contains('*')))
            .filter(|n| is_abbreviation(&name, n))
            .collect();
        let deleted: Vec<&String> = self.delete.iter().filter(|n| is_abbreviation(&name, n)).collect();
        match (grammar.as_slice(), deleted.as_slice()) {
            ([], []) => Resolved::Unknown,
            // A prefix reaching a deleted flag never resolves to something else.
            ([], [d, ..]) => Resolved::Deleted((*d).clone()),
            ([only], []) => {
                if self.is_switch(only) {
                    Resolved::Switch((*only).clone())
                } else {
                    Resolved::Option((*only).clone())
                }
            }
            (g, d) => Resolved::Ambiguous(g.iter().chain(d).map(|s| (*s).clone()).collect()),
        }
    }

    /// Parse caller argv (already cleared by [`ArgSpec::check_rejected`]).
    ///
    /// `words` drops the value of every flag not known to be a switch.
    /// `bare_words` drops only values of known options, so an unknown
    /// boolean flag cannot hide the word after it.
    pub fn parse(&self, argv: &[String]) -> Result<ParsedArgs, ToolError> {
        let mut parsed = ParsedArgs::default();
        let mut leading = true;
        let mut iter = argv.iter().peekable();

        while let Some(token) = iter.next() {
            if token == "--" {
                let rest: Vec<String> = iter.by_ref().cloned().collect();
                parsed.bare_words.extend(rest.iter().cloned());
                parsed.words.extend(rest);
                break;
            }
            if !is_flag(token) {
                leading = false;
                parsed.words.push(token.clone());
                parsed.bare_words.push(token.clone());
                continue;
            }

            let resolved = match shorthand_cluster(token) {
                Some(cluster) => match self.shorthand(cluster, &mut parsed.flags) {
                    Shorthand::Complete => continue,
                    Shorthand::NeedsValue => Resolved::Option(String::new()),
                    Shorthand::Unknown { attached: true } if !(leading && self.closed) => continue,
                    Shorthand::Unknown { .. } => Resolved::Unknown,
                },
                None => self.resolve(token),
            };
            let has_value = token.starts_with("--") && token.contains('=');
            match resolved {
                Resolved::Deleted(_) => {
                    return Err(ToolError::InvalidCommand(format!(
                        "unrecognized arguments: {token}"
                    )));
                }
                Resolved::Ambiguous(candidates) if leading || self.closed => {
                    return Err(ToolError::InvalidCommand(format!(
                        "ambiguous option: {} could match {}",
                        flag_name(token),
                        candidates.join(", ")
                    )));
                }
                Resolved::Switch(name) => parsed.flags.push(name),
                Resolved::Option(name) => {
                    if !has_value {
                        if leading {
                            // The value is taken verbatim, even if it looks like a flag.
                            if iter.next().is_none() {
                                return Err(ToolError::InvalidCommand(format!(
                                    "argument {}: expected one argument",
                                    flag_name(token)
                                )));
                            }
                        } else {
                            iter.next_if(|next| !is_flag(next) && *next != "--");
                        }
                    }
                    if !name.is_empty() {
                        parsed.flags.push(name);
                    }
                }
                Resolved::Unknown if leading && self.closed => {
                    return Err(ToolError::InvalidCommand(format!(
                        "unrecognized arguments: {token}"
                    )));
                }
                _ => {
                    if shorthand_cluster(token).is_none() {
                        parsed.flags.push(canonical(token));
                    }
                    if !has_value {
                        // Unknown arity: the next word may be a value, or not.
                        if let Some(value) = iter.next_if(|next| !is_flag(next) && *next != "--") {
                            parsed.bare_words.push(value.clone());
                        }
                    }
                }
            }
        }
        Ok(parsed)
    }
}
