use crate::parse::ParsedArgs;
use crate::request::{CommandRequest, Mode};

/// Context for classifying a single request.
#[derive(Debug)]
pub struct CommandContext<'a> {
    pub request: &'a CommandRequest,
    /// The caller's argv after the reject scan and grammar parse.
    pub args: ParsedArgs,
}

impl<'a> CommandContext<'a> {
    pub fn new(request: &'a CommandRequest, args: ParsedArgs) -> Self {
        Self { request, args }
    }

    pub fn mode(&self) -> Mode {
        self.request.mode
    }

    /// Command words, flags and their values stripped.
    pub fn words(&self) -> &[String] {
        &self.args.words
    }

    /// Check if the caller passed a flag (resolved name).
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.has_flag(flag)
    }

    /// Check if any of the given flags was passed.
    pub fn has_any_flag(&self, flags: &[&str]) -> bool {
        flags.iter().any(|f| self.has_flag(f))
    }

    /// The command as typed, for messages and logs.
    pub fn display(&self) -> String {
        self.request.display()
    }
}
