use crate::commands::{CommandPolicy, blocked_message};
use crate::config::ClusterConfig;
use crate::eval::{CommandContext, PolicyDecision};
use crate::request::Mode;

/// Allow/block lists of command-word prefixes.
pub struct PrefixPolicy {
    allowed: Vec<Vec<String>>,
    blocked: Vec<Vec<String>>,
    max_allowed: usize,
    max_blocked: usize,
}

fn entries(list: &[String]) -> Vec<Vec<String>> {
    list.iter()
        .map(|e| e.split_whitespace().map(String::from).collect())
        .collect()
}

fn longest(entries: &[Vec<String>]) -> usize {
    entries.iter().map(Vec::len).max().unwrap_or(0)
}

/// First entry equal to a prefix of `words`, shortest prefix first.
fn first_match<'a>(entries: &'a [Vec<String>], max: usize, words: &[String]) -> Option<&'a [String]> {
    (1..=max.min(words.len())).find_map(|k| {
        entries
            .iter()
            .find(|e| e.as_slice() == &words[..k])
            .map(Vec::as_slice)
    })
}

impl PrefixPolicy {
    pub fn from_config(config: &ClusterConfig) -> Self {
        let allowed = entries(&config.allowed_commands);
        let blocked = entries(&config.blocked_commands);
        Self {
            max_allowed: longest(&allowed),
            max_blocked: longest(&blocked),
            allowed,
            blocked,
        }
    }

    fn allowed_by(&self, words: &[String]) -> Option<&[String]> {
        first_match(&self.allowed, self.max_allowed, words)
    }

    fn blocked_by(&self, words: &[String]) -> Option<&[String]> {
        first_match(&self.blocked, self.max_blocked, words)
    }
}

impl CommandPolicy for PrefixPolicy {
    fn classify(&self, ctx: &CommandContext) -> PolicyDecision {
        match ctx.mode() {
            // An unknown flag may be a switch, so the word after it counts both ways.
            Mode::ReadOnly => match (
                self.allowed_by(ctx.words()),
                self.allowed_by(&ctx.args.bare_words),
            ) {
                (Some(entry), Some(_)) => {
                    PolicyDecision::allow(format!("allowed command '{}'", entry.join(" ")))
                }
                _ => PolicyDecision::deny(blocked_message(&ctx.display())),
            },
            Mode::Write => {
                let hit = self
                    .blocked_by(ctx.words())
                    .or_else(|| self.blocked_by(&ctx.args.bare_words));
                match hit {
                    Some(_) => PolicyDecision::deny(blocked_message(&ctx.display())),
                    None => PolicyDecision::allow("not on the block list"),
                }
            }
        }
    }
}
