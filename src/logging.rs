use std::io::Write;
use std::path::Path;

use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

use crate::eval::PolicyDecision;
use crate::request::CommandRequest;

/// Install the stderr logger. `Debug` when `debug`, else `Info`.
pub fn init(debug: bool) -> Result<(), log::SetLoggerError> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();
    TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto)
}

/// Append a decision record to the decision log.
/// Best-effort: failures are silently ignored (logging must never block a request).
pub fn log_decision(path: &Path, request: &CommandRequest, decision: &PolicyDecision) {
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    else {
        return;
    };
    let _ = file.write_all(record(request, decision).as_bytes());
}

/// One tab-separated line: timestamp, request id, tool, decision, command, reason.
fn record(request: &CommandRequest, decision: &PolicyDecision) -> String {
    let one_line = |s: &str| s.replace(['\n', '\t'], " ");
    let command: String = request.display().chars().take(200).collect();
    format!(
        "{ts}\t{id}\t{tool}\t{decision}\t{cmd}\t{reason}\n",
        ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
        id = request.id,
        tool = request.tool,
        decision = decision.decision.as_str(),
        cmd = one_line(&command),
        reason = one_line(&decision.reason),
    )
}
