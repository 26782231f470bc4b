//! Hook execution for the CLI host.
//!
//! There is no dial plan to hand applications to, so "executing" a hook means
//! recording and logging it. Foreground hooks run on the calling thread;
//! background hooks are queued to a single worker thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use amd_core::HookCommand;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedHook {
    pub channel: String,
    pub application: String,
    pub argument: Option<String>,
    pub background: bool,
}

/// Submits hooks. Cheap to clone; every call channel holds one.
#[derive(Clone)]
pub struct HookExecutor {
    tx: Sender<ExecutedHook>,
    executed: Arc<Mutex<Vec<ExecutedHook>>>,
}

/// Owns the background thread. `join` once every executor is dropped.
pub struct HookWorker {
    handle: JoinHandle<()>,
    executed: Arc<Mutex<Vec<ExecutedHook>>>,
}

pub fn spawn_executor() -> (HookExecutor, HookWorker) {
    let (tx, rx) = unbounded::<ExecutedHook>();
    let executed = Arc::new(Mutex::new(Vec::new()));
    let worker_log = Arc::clone(&executed);
    let handle = thread::spawn(move || run_worker(rx, worker_log));
    (
        HookExecutor {
            tx,
            executed: Arc::clone(&executed),
        },
        HookWorker { handle, executed },
    )
}

fn run_worker(rx: Receiver<ExecutedHook>, executed: Arc<Mutex<Vec<ExecutedHook>>>) {
    for hook in rx {
        record(&executed, hook);
    }
    debug!("hook worker drained");
}

fn record(executed: &Mutex<Vec<ExecutedHook>>, hook: ExecutedHook) {
    info!(
        channel = %hook.channel,
        background = hook.background,
        "executing [{}] [{}]",
        hook.application,
        hook.argument.as_deref().unwrap_or("")
    );
    executed.lock().push(hook);
}

impl HookExecutor {
    pub fn execute(&self, channel: &str, command: &HookCommand) {
        let hook = ExecutedHook {
            channel: channel.to_string(),
            application: command.application.clone(),
            argument: command.argument.clone(),
            background: command.background,
        };
        if !hook.background {
            record(&self.executed, hook);
            return;
        }
        // The worker only stops once every sender is gone, so this cannot
        // fail while `self` is alive.
        if let Err(e) = self.tx.send(hook) {
            record(&self.executed, e.into_inner());
        }
    }
}

impl HookWorker {
    /// Wait for queued background hooks and return everything executed.
    pub fn join(self) -> Vec<ExecutedHook> {
        if self.handle.join().is_err() {
            tracing::error!("hook worker panicked");
        }
        std::mem::take(&mut *self.executed.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreground_and_background_hooks_are_all_recorded() {
        let (executor, worker) = spawn_executor();
        let fg = HookCommand::parse("transfer 1000").expect("fg");
        let bg = HookCommand::parse("perl /scripts/notify.pl").expect("bg");
        assert!(!fg.background);
        assert!(bg.background);

        executor.execute("call-1", &fg);
        executor.clone().execute("call-2", &bg);
        drop(executor);

        let mut executed = worker.join();
        executed.sort_by(|a, b| a.channel.cmp(&b.channel));
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[0].application, "transfer");
        assert_eq!(executed[0].argument.as_deref(), Some("1000"));
        assert!(!executed[0].background);
        assert_eq!(executed[1].channel, "call-2");
        assert!(executed[1].background);
    }

    #[test]
    fn join_without_hooks_is_empty() {
        let (executor, worker) = spawn_executor();
        drop(executor);
        assert!(worker.join().is_empty());
    }
}
