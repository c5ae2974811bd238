//! The supervisor: state, context, and construction.
//!
//! [`Daemon`] owns the application and a [`DaemonContext`] carrying every
//! supervision facility (event bus, plugins, workers, pid file, daemon
//! log, loop clock, signal router). The context is what the application
//! sees from its hooks; the lifecycle itself is driven from
//! `daemon_impl.rs`.
//!
//! At most one daemon may be constructed per process. The construction
//! guard is released when the instance is dropped, so tests can build
//! daemons sequentially, but two live instances never coexist.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error, info};

use crate::app::App;
use crate::clock::LoopClock;
use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::events::{EventBus, EventKey};
use crate::fork;
use crate::log::DaemonLog;
use crate::pid::PidFile;
use crate::plugin::PluginHost;
use crate::restart::RestartWindow;
use crate::signal::SignalRouter;
use crate::worker::{WorkerError, WorkerSet};

static INSTANCE_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Point-in-time snapshot of the running daemon.
#[derive(Debug, Clone)]
pub struct DaemonStatus {
    pub name: String,
    pub pid: u32,
    pub is_parent: bool,
    pub daemonized: bool,
    pub uptime: Duration,
    pub loop_interval: Duration,
    pub auto_restart_interval_secs: u64,
    pub plugins: Vec<String>,
    pub workers: Vec<String>,
    pub user: Option<String>,
    pub memory: Option<String>,
}

/// Supervision facilities handed to the application's hooks.
pub struct DaemonContext {
    pub(crate) config: DaemonConfig,
    pub(crate) bus: EventBus,
    pub(crate) plugins: PluginHost,
    pub(crate) workers: WorkerSet,
    pub(crate) log: DaemonLog,
    pub(crate) clock: LoopClock,
    pub(crate) signals: Option<SignalRouter>,
    pub(crate) pid_file: Option<PidFile>,
    pub(crate) pid: u32,
    pub(crate) is_parent: bool,
    pub(crate) shutdown: bool,
    pub(crate) start_time: Instant,
}

impl DaemonContext {
    fn new(config: DaemonConfig) -> Self {
        let clock = LoopClock::new(config.loop_interval());
        let log = DaemonLog::new(config.log_file.clone(), config.verbose);
        let pid_file = config.pid_file.clone().map(PidFile::new);

        Self {
            config,
            bus: EventBus::new(),
            plugins: PluginHost::new(),
            workers: WorkerSet::new(),
            log,
            clock,
            signals: None,
            pid_file,
            pid: std::process::id(),
            is_parent: true,
            shutdown: false,
            start_time: Instant::now(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Current process id; refreshed in child branches after a fork.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether this is the original process (false in child branches).
    pub fn is_parent(&self) -> bool {
        self.is_parent
    }

    /// How long the current process image has been running.
    pub fn runtime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Latch the shutdown flag; the loop exits after the current
    /// iteration.
    pub fn request_shutdown(&mut self) {
        self.shutdown = true;
    }

    /// Whether the shutdown latch is set.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown
    }

    /// Fold signal-delivered shutdown requests into the latch.
    pub(crate) fn sync_shutdown_flag(&mut self) {
        if let Some(router) = &self.signals {
            if router.shutdown_requested() {
                self.shutdown = true;
            }
        }
    }

    /// The event bus: listener registration and dispatch.
    pub fn events(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// The plugin registry.
    pub fn plugins(&self) -> &PluginHost {
        &self.plugins
    }

    /// The worker registry.
    pub fn workers(&self) -> &WorkerSet {
        &self.workers
    }

    /// Mutable worker registry, for registrations outside the
    /// [`App::register_workers`] hook.
    pub fn workers_mut(&mut self) -> &mut WorkerSet {
        &mut self.workers
    }

    /// Invoke a named worker.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value, WorkerError> {
        self.workers.invoke(name, args).await
    }

    /// The daemon log artifact.
    pub fn log(&mut self) -> &mut DaemonLog {
        &mut self.log
    }

    /// Replace the signal router, e.g. with a detached router fed by an
    /// embedder's own signal source.
    pub fn set_signal_router(&mut self, router: SignalRouter) {
        self.signals = Some(router);
    }

    /// Fork a one-shot child that runs `body` and exits.
    ///
    /// The parent returns immediately (`true` on success, `false` when the
    /// fork failed) and reaps the child from the run loop. The child never
    /// returns: its plugin registry is cleared without teardown so exiting
    /// cannot release locks or files owned by the parent.
    pub async fn fork<F, Fut>(&mut self, body: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), DaemonError>>,
    {
        self.fork_inner(None, body).await
    }

    /// Like [`fork`](Self::fork), but the child re-runs the application's
    /// setup first, reconnecting resources invalidated across the fork.
    pub async fn fork_with_setup<F, Fut>(&mut self, app: &mut dyn App, body: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), DaemonError>>,
    {
        self.fork_inner(Some(app), body).await
    }

    async fn fork_inner<F, Fut>(&mut self, app: Option<&mut dyn App>, body: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), DaemonError>>,
    {
        self.bus.dispatch(&EventKey::Fork, Value::Null);

        let fork_result = match fork::fork_process() {
            Ok(result) => result,
            Err(e) => {
                error!("{e}");
                self.log.error(&format!("fork failed: {e}"));
                return false;
            }
        };

        match fork_result {
            nix::unistd::ForkResult::Parent { child } => {
                debug!("Forked child {}", child);
                true
            }
            nix::unistd::ForkResult::Child => {
                self.is_parent = false;
                self.pid = std::process::id();
                self.plugins.clear_without_teardown();

                if let Some(app) = app {
                    if let Err(e) = app.setup(self).await {
                        self.log.error(&format!("forked child setup failed: {e}"));
                        std::process::exit(1);
                    }
                }

                let code = match body().await {
                    Ok(()) => 0,
                    Err(e) => {
                        self.log.error(&format!("forked task failed: {e}"));
                        1
                    }
                };
                std::process::exit(code);
            }
        }
    }

    /// Snapshot the daemon's runtime state.
    pub fn status(&self) -> DaemonStatus {
        DaemonStatus {
            name: self.config.name.clone(),
            pid: self.pid,
            is_parent: self.is_parent,
            daemonized: self.config.daemonize,
            uptime: self.runtime(),
            loop_interval: self.config.loop_interval(),
            auto_restart_interval_secs: self.config.auto_restart_interval_secs,
            plugins: self.plugins.aliases().iter().map(|s| s.to_string()).collect(),
            workers: self.workers.names().iter().map(|s| s.to_string()).collect(),
            user: current_user(),
            memory: memory_summary(),
        }
    }

    /// Write the runtime summary to the daemon log (SIGUSR1 default
    /// action).
    pub fn dump(&mut self) {
        let status = self.status();
        let line = format!(
            "Status: pid={} uptime={:.1}s loop_interval={:.3}s restart_interval={}s \
             plugins=[{}] workers=[{}] user={} memory={}",
            status.pid,
            status.uptime.as_secs_f64(),
            status.loop_interval.as_secs_f64(),
            status.auto_restart_interval_secs,
            status.plugins.join(","),
            status.workers.join(","),
            status.user.as_deref().unwrap_or("unknown"),
            status.memory.as_deref().unwrap_or("unknown"),
        );
        self.log.info(&line);
        info!("{line}");
    }
}

/// Resident and peak memory of this process, from procfs when available.
fn memory_summary() -> Option<String> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let field = |tag: &str| {
        status
            .lines()
            .find(|l| l.starts_with(tag))
            .map(|l| l[tag.len()..].trim().to_string())
    };

    let rss = field("VmRSS:")?;
    let peak = field("VmPeak:").unwrap_or_else(|| "?".to_string());
    Some(format!("rss={rss} peak={peak}"))
}

/// Name of the user this process runs as.
fn current_user() -> Option<String> {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|u| u.name)
}

/// A supervised daemon: the application plus its supervision context.
pub struct Daemon<A: App> {
    pub(crate) app: A,
    pub(crate) ctx: DaemonContext,
    pub(crate) restart_window: RestartWindow,
}

impl<A: App> Daemon<A> {
    /// Construct the process's daemon instance.
    ///
    /// Construct once: a second live instance in the same process is a
    /// configuration error. The slot is freed when this instance drops.
    pub fn new(config: DaemonConfig, app: A) -> Result<Self, DaemonError> {
        if INSTANCE_CLAIMED.swap(true, Ordering::SeqCst) {
            return Err(DaemonError::AlreadyConstructed);
        }

        Ok(Self {
            app,
            ctx: DaemonContext::new(config),
            restart_window: RestartWindow::new(),
        })
    }

    /// The supervision context.
    pub fn context(&self) -> &DaemonContext {
        &self.ctx
    }

    /// Mutable supervision context, e.g. for registering listeners before
    /// [`run`](Self::run).
    pub fn context_mut(&mut self) -> &mut DaemonContext {
        &mut self.ctx
    }

    /// The application.
    pub fn app(&self) -> &A {
        &self.app
    }
}

impl<A: App> Drop for Daemon<A> {
    fn drop(&mut self) {
        INSTANCE_CLAIMED.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NullApp;

    #[async_trait]
    impl App for NullApp {
        async fn execute(&mut self, _ctx: &mut DaemonContext) -> Result<(), DaemonError> {
            Ok(())
        }
    }

    // The construction guard is process-global; serialize the tests that
    // exercise it.
    static TEST_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn guard() -> std::sync::MutexGuard<'static, ()> {
        TEST_GUARD.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn test_singleton_construction() {
        let _guard = guard();
        let first = Daemon::new(DaemonConfig::default(), NullApp).unwrap();
        let second = Daemon::new(DaemonConfig::default(), NullApp);
        assert!(matches!(second, Err(DaemonError::AlreadyConstructed)));

        drop(first);
        let third = Daemon::new(DaemonConfig::default(), NullApp);
        assert!(third.is_ok());
    }

    #[test]
    fn test_context_defaults() {
        let _guard = guard();
        let daemon = Daemon::new(DaemonConfig::default(), NullApp).unwrap();
        let ctx = daemon.context();

        assert!(ctx.is_parent());
        assert!(!ctx.shutdown_requested());
        assert_eq!(ctx.pid(), std::process::id());
        assert!(ctx.runtime() < Duration::from_secs(1));
    }

    #[test]
    fn test_request_shutdown_latches() {
        let _guard = guard();
        let mut daemon = Daemon::new(DaemonConfig::default(), NullApp).unwrap();
        daemon.context_mut().request_shutdown();
        assert!(daemon.context().shutdown_requested());
    }

    #[test]
    fn test_status_snapshot() {
        let _guard = guard();
        let daemon = Daemon::new(DaemonConfig::named("snap"), NullApp).unwrap();
        let status = daemon.context().status();

        assert_eq!(status.name, "snap");
        assert_eq!(status.pid, std::process::id());
        assert!(status.is_parent);
        assert!(status.plugins.is_empty());
        assert!(status.workers.is_empty());
    }
}
