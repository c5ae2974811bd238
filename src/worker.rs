//! Named persistent workers.
//!
//! A worker is a long-lived child process reachable by name. The transport
//! behind it (pipes, sockets, a queue service) is an external collaborator;
//! the supervisor owns only the invocation semantics: name uniqueness,
//! one call at a time per worker, per-call timeouts, and respawning a
//! worker whose child exited. There is no in-memory queueing; callers
//! wait their turn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time;
use tracing::{info, warn};

/// Worker invocation errors.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A worker with this name is already registered.
    #[error("worker '{name}' already registered")]
    Exists { name: String },

    /// No worker registered under this name.
    #[error("worker '{name}' not found")]
    NotFound { name: String },

    /// The call exceeded the worker's per-call timeout.
    #[error("worker '{name}' call timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// The transport reported a call failure.
    #[error("worker '{name}' call failed: {reason}")]
    Call { name: String, reason: String },

    /// Respawning the worker's child process failed.
    #[error("worker '{name}' respawn failed: {reason}")]
    Respawn { name: String, reason: String },
}

/// The external collaborator carrying calls to a worker's child process.
///
/// Implementations own the IPC mechanism, the child process itself, and
/// whatever serialization the channel needs. The supervisor never assumes
/// more than this surface.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// Deliver one call and wait for its reply.
    async fn dispatch(&self, args: Value) -> Result<Value, WorkerError>;

    /// Pid of the child process currently backing this worker, if any.
    /// Lets the supervisor match reaped children back to workers.
    fn child_pid(&self) -> Option<u32> {
        None
    }

    /// Start a fresh child process after the previous one exited.
    async fn respawn(&self) -> Result<(), WorkerError> {
        Ok(())
    }

    /// Stop the child process.
    async fn shutdown(&self) {}
}

/// Per-worker policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Maximum wall time for a single call; `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
    /// Respawn the child process when it exits.
    pub restart_on_exit: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            call_timeout: None,
            restart_on_exit: true,
        }
    }
}

/// A registered worker: name, transport, policy, and the call gate.
pub struct WorkerHandle {
    name: String,
    options: WorkerOptions,
    transport: Arc<dyn WorkerTransport>,
    busy: Mutex<()>,
}

impl WorkerHandle {
    /// The worker's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The worker's policy.
    pub fn options(&self) -> WorkerOptions {
        self.options
    }

    /// Invoke the worker.
    ///
    /// Workers process one call at a time; concurrent callers queue on the
    /// call gate in arrival order. The configured timeout covers the
    /// dispatch only, not the time spent waiting for the gate.
    pub async fn call(&self, args: Value) -> Result<Value, WorkerError> {
        let _gate = self.busy.lock().await;

        match self.options.call_timeout {
            Some(timeout) => match time::timeout(timeout, self.transport.dispatch(args)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(WorkerError::Timeout {
                    name: self.name.clone(),
                    timeout,
                }),
            },
            None => self.transport.dispatch(args).await,
        }
    }
}

/// The supervisor's name → worker mapping.
#[derive(Default)]
pub struct WorkerSet {
    workers: HashMap<String, Arc<WorkerHandle>>,
}

impl WorkerSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker under a unique name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        transport: Arc<dyn WorkerTransport>,
        options: WorkerOptions,
    ) -> Result<(), WorkerError> {
        let name = name.into();
        if self.workers.contains_key(&name) {
            return Err(WorkerError::Exists { name });
        }

        info!("Registered worker '{name}'");
        let handle = Arc::new(WorkerHandle {
            name: name.clone(),
            options,
            transport,
            busy: Mutex::new(()),
        });
        self.workers.insert(name, handle);
        Ok(())
    }

    /// Look up a worker by name.
    pub fn worker(&self, name: &str) -> Option<Arc<WorkerHandle>> {
        self.workers.get(name).cloned()
    }

    /// Invoke a worker by name.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value, WorkerError> {
        let handle = self.worker(name).ok_or_else(|| WorkerError::NotFound {
            name: name.to_string(),
        })?;
        handle.call(args).await
    }

    /// Registered worker names, sorted for stable output.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.workers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no workers are registered.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Offer a reaped child pid to the set.
    ///
    /// The owning worker is respawned when its policy asks for it.
    /// Returns `true` when some worker claimed the pid.
    pub async fn notify_child_exit(&self, pid: u32) -> bool {
        for handle in self.workers.values() {
            if handle.transport.child_pid() != Some(pid) {
                continue;
            }

            if handle.options.restart_on_exit {
                info!("Worker '{}' child {pid} exited; respawning", handle.name);
                if let Err(e) = handle.transport.respawn().await {
                    warn!("{e}");
                }
            } else {
                info!("Worker '{}' child {pid} exited; not restarting", handle.name);
            }
            return true;
        }
        false
    }

    /// Shut down every worker's child process.
    pub async fn shutdown_all(&self) {
        for handle in self.workers.values() {
            handle.transport.shutdown().await;
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
