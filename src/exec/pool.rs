use std::sync::Arc;

use log::debug;
use tokio::sync::{Mutex, mpsc};

use crate::error::ToolError;
use crate::exec::process::{self, Invocation, Reply};
use crate::exec::slots::Slot;
use crate::shell::ShellState;

/// One infra command handed to a worker, with the slot already held.
pub(crate) struct Job {
    pub injected: Vec<String>,
    pub user: Vec<String>,
    /// Flags the caller set, so negotiated defaults do not override them.
    pub user_flags: Vec<String>,
    pub slot: Slot,
    pub reply: Reply,
}

/// Pre-started workers holding the loaded shell state.
///
/// Each worker runs one child at a time, so the worker count bounds
/// concurrent infra commands independently of the shared slots.
pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
    workers: usize,
}

impl WorkerPool {
    pub fn start(workers: usize, program: String, state: Arc<ShellState>) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<Job>(workers);
        let rx = Arc::new(Mutex::new(rx));

        for id in 0..workers {
            let rx = Arc::clone(&rx);
            let program = program.clone();
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(job) = next else { break };
                    let mut args = job.injected;
                    args.extend(state.versions.apply(&job.user_flags));
                    args.extend(job.user);
                    debug!("worker {id}: dispatching job");
                    process::supervise(Invocation::new(program.clone(), args), job.slot, job.reply).await;
                }
                debug!("worker {id}: stopped");
            });
        }
        debug!("started {workers} infra workers");
        Self { tx, workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub(crate) async fn submit(&self, job: Job) -> Result<(), ToolError> {
        self.tx.send(job).await.map_err(|_| ToolError::ExecutionFailed {
            code: None,
            message: "infra worker pool is not running".into(),
        })
    }
}
