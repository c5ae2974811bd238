//! # vigil
//!
//! Supervision framework for long-running daemons: give it a unit of
//! periodic work and it becomes a well-behaved, singleton, auto-restarting
//! background service with signal-driven lifecycle control and
//! process-level parallelism.
//!
//! ## Features
//!
//! - Fixed-interval run loop with drift-aware sleep and overrun reporting
//! - Signal-driven lifecycle (SIGTERM/SIGINT shutdown, SIGHUP restart,
//!   SIGUSR1 status dump), extra signals forwarded as events
//! - Typed event bus with ordered, panic-isolated listeners
//! - Plugin lifecycle (environment check, setup, teardown) with a
//!   singleton lock interface and a file-backed lock built in
//! - Forked one-shot tasks and named persistent workers, with
//!   non-blocking zombie reaping from the run loop
//! - Self-restart by exec of the original image, with lock hand-off and
//!   a restart storm limiter
//! - PID file whose removal is tied to ownership, daemonization, init
//!   script generation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use vigil::{App, Daemon, DaemonConfig, DaemonContext, DaemonError};
//!
//! struct PollFeeds {
//!     polled: u64,
//! }
//!
//! #[async_trait]
//! impl App for PollFeeds {
//!     async fn execute(&mut self, ctx: &mut DaemonContext) -> Result<(), DaemonError> {
//!         self.polled += 1;
//!         if self.polled > 10_000 {
//!             ctx.request_shutdown();
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), DaemonError> {
//!     let mut config = DaemonConfig::named("poll-feeds");
//!     config.loop_interval_secs = 0.5;
//!
//!     let daemon = Daemon::from_args(config, PollFeeds { polled: 0 })?;
//!     daemon.run().await
//! }
//! ```

pub mod app;
pub mod cli;
pub mod clock;
pub mod config;
pub mod daemon;
mod daemon_impl;
pub mod error;
pub mod events;
pub mod fork;
pub mod install;
pub mod lock;
pub mod log;
pub mod pid;
pub mod plugin;
pub mod restart;
pub mod signal;
pub mod worker;

pub use app::App;
pub use clock::{LoopClock, LoopTiming};
pub use config::{DaemonConfig, MIN_RESTART_SECS};
pub use daemon::{Daemon, DaemonContext, DaemonStatus};
pub use error::DaemonError;
pub use events::{Event, EventBus, EventKey, Listener, ListenerHandle};
pub use lock::FileLock;
pub use log::DaemonLog;
pub use pid::PidFile;
pub use plugin::{LockPlugin, Plugin, PluginHost};
pub use signal::{SignalInjector, SignalRouter};
pub use worker::{WorkerError, WorkerHandle, WorkerOptions, WorkerSet, WorkerTransport};

/// Initialize `tracing` for a binary embedding the crate: env-filtered,
/// human-readable output. Applications with their own subscriber setup
/// should skip this.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}
