use crate::error::ToolError;
use crate::request::Tool;

/// Basename of a command word: /usr/bin/oc → oc, ./openstack → openstack.
pub fn base_command(word: &str) -> &str {
    match word.rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => name,
        _ => word,
    }
}

/// Tokenize a command string into words using shlex (POSIX word splitting).
///
/// Unlike a shell, unbalanced quotes are an error rather than a best-effort split.
pub fn tokenize(command: &str) -> Result<Vec<String>, ToolError> {
    shlex::split(command)
        .ok_or_else(|| ToolError::InvalidCommand("Unbalanced quotes in command".into()))
}

/// Split a caller's command and drop a leading tool name.
pub fn split_command(tool: Tool, command: &str) -> Result<Vec<String>, ToolError> {
    let mut argv = tokenize(command.trim())?;
    if argv
        .first()
        .is_some_and(|w| base_command(w) == tool.program())
    {
        argv.remove(0);
        if argv.is_empty() && tool == Tool::Infra {
            return Err(ToolError::InvalidCommand(
                "openstack interactive mode is not available".into(),
            ));
        }
    }
    if argv.is_empty() {
        return Err(ToolError::InvalidCommand("No command provided".into()));
    }
    Ok(argv)
}
