use std::io;
use std::process::{ExitStatus, Stdio};

use log::{debug, warn};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

use crate::error::ToolError;
use crate::exec::slots::Slot;
use crate::parse::base_command;

/// A program and its full argument list.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Short name used in messages: /usr/bin/oc → oc.
    pub fn name(&self) -> &str {
        base_command(&self.program)
    }
}

/// Output of one finished child. Each child gets its own buffers.
#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    /// Success text, or the failure the caller sees.
    pub fn into_output(self, tool: &str) -> Result<String, ToolError> {
        if !self.status.success() {
            return Err(ToolError::execution(tool, self.status.code(), &self.stderr));
        }
        let stdout = self.stdout.trim_start_matches('\0');
        if stdout.is_empty() {
            Ok(self.stderr)
        } else {
            Ok(stdout.to_string())
        }
    }
}

pub(crate) type Reply = oneshot::Sender<Result<Captured, ToolError>>;

/// Run an invocation under `slot` and wait for it.
///
/// Dropping the returned future kills the child; the slot is released once
/// the child has been reaped.
pub async fn run(invocation: Invocation, slot: Slot) -> Result<Captured, ToolError> {
    let name = invocation.name().to_string();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(supervise(invocation, slot, tx));
    rx.await.map_err(|_| ToolError::ExecutionFailed {
        code: None,
        message: format!("{name} was abandoned before completion"),
    })?
}

/// Own one child from spawn to reap, then answer on `reply`.
pub(crate) async fn supervise(invocation: Invocation, slot: Slot, mut reply: Reply) {
    if reply.is_closed() {
        debug!("{}: caller gone before spawn", invocation.name());
        return;
    }

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let (mut child, running) = match slot.spawn(&mut command) {
        Ok(spawned) => spawned,
        Err(e) => {
            drop(slot);
            let detail = format!("cannot start {}: {e}", invocation.program);
            let _ = reply.send(Err(ToolError::execution(invocation.name(), None, &detail)));
            return;
        }
    };
    debug!("{}: spawned pid {:?}", invocation.name(), child.id());

    let finished = tokio::select! {
        result = collect(&mut child) => Some(result),
        _ = reply.closed() => None,
    };

    let result = match finished {
        Some(Ok(captured)) => Ok(captured),
        Some(Err(e)) => {
            warn!("{}: lost track of child: {e}", invocation.name());
            let _ = child.kill().await;
            Err(ToolError::execution(invocation.name(), None, &e.to_string()))
        }
        None => {
            debug!("{}: caller gone, killing pid {:?}", invocation.name(), child.id());
            if let Err(e) = child.kill().await {
                warn!("{}: kill failed: {e}", invocation.name());
            }
            drop(running);
            return;
        }
    };

    // Capacity is free before the caller sees the result.
    drop(running);
    drop(slot);
    let _ = reply.send(result);
}

async fn collect(child: &mut Child) -> io::Result<Captured> {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut out = Vec::new();
    let mut err = Vec::new();

    let read_out = async {
        match stdout.as_mut() {
            Some(pipe) => pipe.read_to_end(&mut out).await.map(|_| ()),
            None => Ok(()),
        }
    };
    let read_err = async {
        match stderr.as_mut() {
            Some(pipe) => pipe.read_to_end(&mut err).await.map(|_| ()),
            None => Ok(()),
        }
    };
    let (read_out, read_err) = tokio::join!(read_out, read_err);
    read_out?;
    read_err?;

    let status = child.wait().await?;
    Ok(Captured {
        status,
        stdout: String::from_utf8_lossy(&out).into_owned(),
        stderr: String::from_utf8_lossy(&err).into_owned(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::exec::slots::Slots;
    use std::os::unix::process::ExitStatusExt;

    fn captured(code: i32, stdout: &str, stderr: &str) -> Captured {
        Captured {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    fn sh(script: &str) -> Invocation {
        Invocation::new("/bin/sh", vec!["-c".into(), script.into()])
    }

    #[test]
    fn output_prefers_stdout() {
        let out = captured(0, "\0\0ok\n", "warn").into_output("oc").unwrap();
        assert_eq!(out, "ok\n");
    }

    #[test]
    fn output_falls_back_to_stderr() {
        let out = captured(0, "", "only stderr").into_output("oc").unwrap();
        assert_eq!(out, "only stderr");
    }

    #[test]
    fn nonzero_exit_is_execution_failure() {
        let err = captured(3, "partial", "boom").into_output("oc").unwrap_err();
        assert_eq!(
            err,
            ToolError::ExecutionFailed {
                code: Some(3),
                message: "oc failed with error code 3: boom".into()
            }
        );
    }

    #[test]
    fn invocation_name_is_basename() {
        assert_eq!(Invocation::new("/usr/bin/oc", vec![]).name(), "oc");
    }

    #[tokio::test]
    async fn run_captures_both_streams() {
        let slots = Slots::new(1);
        let slot = slots.acquire().await.unwrap();
        let captured = run(sh("echo out; echo err >&2"), slot).await.unwrap();
        assert!(captured.status.success());
        assert_eq!(captured.stdout, "out\n");
        assert_eq!(captured.stderr, "err\n");
        assert_eq!(slots.available(), 1);
        assert_eq!(slots.running(), 0);
    }

    #[tokio::test]
    async fn run_reports_spawn_failure() {
        let slots = Slots::new(1);
        let slot = slots.acquire().await.unwrap();
        let err = run(Invocation::new("/nonexistent/ops-toolgate-test", vec![]), slot)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "execution_failed");
        assert_eq!(slots.spawned(), 0);
        assert_eq!(slots.available(), 1);
    }
}
