//! Background rotation scheduling.
//!
//! One long-lived task per manager owns a [`DelayQueue`] of resource names.
//! Scheduling a name that is already queued moves its deadline. When a deadline
//! passes, the callback runs on its own task so a slow CA never delays other
//! rotations. The task stops when its [`CancellationToken`] fires.

use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, info};

/// Backoff policy for re-issuing a secret after a failed rotation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Maximum backoff duration (cap for exponential growth)
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 for doubling)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff after `failures` consecutive failures; zero failures means no wait.
    pub fn backoff_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let multiplier = self.backoff_multiplier.powi(failures.saturating_sub(1) as i32);
        let backoff_ms = self.initial_backoff.as_millis() as f64 * multiplier;
        let capped_ms = backoff_ms.min(self.max_backoff.as_millis() as f64);

        Duration::from_millis(capped_ms as u64)
    }
}

enum Command {
    Schedule { resource_name: String, delay: Duration },
    Cancel { resource_name: String },
}

/// Owned handle to the rotation task.
#[derive(Debug)]
pub(crate) struct RotationScheduler {
    commands: mpsc::UnboundedSender<Command>,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Schedule { resource_name, delay } => {
                write!(f, "Schedule({}, {:?})", resource_name, delay)
            }
            Command::Cancel { resource_name } => write!(f, "Cancel({})", resource_name),
        }
    }
}

impl RotationScheduler {
    /// Spawn the rotation task. Must be called inside a Tokio runtime.
    pub(crate) fn spawn<F, Fut>(on_due: F) -> Self
    where
        F: Fn(String) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (commands, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let task = tokio::spawn(run(rx, token.clone(), on_due));

        Self { commands, token, task: Mutex::new(Some(task)) }
    }

    /// Run rotation for `resource_name` after `delay`, replacing any earlier deadline.
    pub(crate) fn schedule(&self, resource_name: &str, delay: Duration) {
        let command = Command::Schedule { resource_name: resource_name.to_string(), delay };
        if self.commands.send(command).is_err() {
            debug!(resource_name = %resource_name, "Rotation task stopped; schedule dropped");
        }
    }

    pub(crate) fn cancel(&self, resource_name: &str) {
        let _ = self.commands.send(Command::Cancel { resource_name: resource_name.to_string() });
    }

    /// Signal the task to stop without waiting for it.
    pub(crate) fn stop(&self) {
        self.token.cancel();
    }

    /// Stop the task and wait for it to exit.
    pub(crate) async fn shutdown(&self) {
        self.stop();

        let task = self.task.lock().ok().and_then(|mut guard| guard.take());
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for RotationScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run<F, Fut>(
    mut rx: mpsc::UnboundedReceiver<Command>,
    token: CancellationToken,
    on_due: F,
) where
    F: Fn(String) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut queue: DelayQueue<String> = DelayQueue::new();
    let mut keys: HashMap<String, delay_queue::Key> = HashMap::new();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            command = rx.recv() => match command {
                Some(Command::Schedule { resource_name, delay }) => {
                    debug!(resource_name = %resource_name, delay_ms = delay.as_millis() as u64, "Rotation scheduled");
                    match keys.get(&resource_name) {
                        Some(key) => queue.reset(key, delay),
                        None => {
                            let key = queue.insert(resource_name.clone(), delay);
                            keys.insert(resource_name, key);
                        }
                    }
                }
                Some(Command::Cancel { resource_name }) => {
                    if let Some(key) = keys.remove(&resource_name) {
                        queue.remove(&key);
                    }
                }
                None => break,
            },
            Some(expired) = queue.next() => {
                let resource_name = expired.into_inner();
                keys.remove(&resource_name);
                tokio::spawn(on_due(resource_name));
            }
        }
    }

    info!(pending = keys.len(), "Rotation task stopped");
}
