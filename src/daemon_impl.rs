//! Daemon lifecycle: init, run loop, restart, shutdown.

use std::os::fd::AsRawFd;
use std::time::Duration;

use clap::Parser;
use nix::unistd::ForkResult;
use serde_json::{json, Value};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::cli::DaemonArgs;
use crate::clock::LoopTiming;
use crate::config::MIN_RESTART_SECS;
use crate::daemon::Daemon;
use crate::error::DaemonError;
use crate::events::EventKey;
use crate::fork;
use crate::install;
use crate::log::DaemonLog;
use crate::restart::{
    auto_restart_due, silence_std_streams, spawn_replacement, FATAL_RESTART_PAUSE,
};
use crate::signal::SignalRouter;

impl<A: App> Daemon<A> {
    /// Construct a daemon from the process's command-line flags.
    ///
    /// The help (`-H`), install-instructions (`-i`), and init-script
    /// (`-I`) flags are handled here and terminate the process with
    /// status 0; the remaining flags are applied on top of `config`.
    pub fn from_args(config: crate::config::DaemonConfig, app: A) -> Result<Self, DaemonError> {
        let args = DaemonArgs::parse();

        if args.help {
            print!("{}", install::help_text(&config));
            std::process::exit(0);
        }
        if args.instructions {
            print!(
                "{}",
                install::install_instructions(&config, &app.install_instructions())
            );
            std::process::exit(0);
        }
        if args.init_script {
            match install::write_init_script(&config) {
                Ok(path) => println!("Init script written to {}", path.display()),
                Err(e) => {
                    eprintln!("Could not write the init script: {e}");
                    eprint!("{}", install::help_text(&config));
                }
            }
            std::process::exit(0);
        }

        Self::new(args.apply(config), app)
    }

    /// Drive the daemon through its whole lifecycle.
    ///
    /// Returns when the run loop exits normally (shutdown latch), or with
    /// the fatal error that stopped it. Restart paths replace the process
    /// image and do not return.
    pub async fn run(mut self) -> Result<(), DaemonError> {
        if let Err(e) = self.init().await {
            error!("Initialization failed: {e}");
            self.ctx.log.error(&format!("initialization failed: {e}"));
            return Err(e);
        }

        match self.run_loop().await {
            Ok(()) => {
                self.shutdown_normally().await;
                Ok(())
            }
            Err(e) => self.fatal(e).await,
        }
    }

    /// Initialization: detach, claim identity, check the environment,
    /// bring up plugins and workers, hand over to the application.
    async fn init(&mut self) -> Result<(), DaemonError> {
        if self.ctx.config.daemonize {
            self.daemonize()?;
        }

        if let Some(pid_file) = &mut self.ctx.pid_file {
            pid_file.write()?;
        }

        if self.ctx.signals.is_none() {
            self.ctx.signals = Some(SignalRouter::install()?);
        }

        self.app.load_plugins(&mut self.ctx.plugins)?;

        let mut errors = self.ctx.config.validate();
        errors.extend(self.app.check_environment());
        errors.extend(self.ctx.plugins.check_environment());
        if !errors.is_empty() {
            return Err(DaemonError::Environment { errors });
        }

        self.ctx.plugins.setup_all().await?;
        self.app.register_workers(&mut self.ctx.workers)?;

        self.ctx.bus.dispatch(&EventKey::Init, Value::Null);
        self.app.setup(&mut self.ctx).await?;

        let started = format!(
            "{} started (pid {}, loop interval {:.3}s)",
            self.ctx.config.name,
            self.ctx.pid,
            self.ctx.config.loop_interval_secs
        );
        info!("{started}");
        self.ctx.log.info(&started);
        Ok(())
    }

    /// The supervision loop.
    ///
    /// Iteration order: signal edge, auto-restart guard, `Run` dispatch,
    /// application execute, drift-aware sleep, child reaping. A shutdown
    /// signal received mid-iteration lets the iteration finish; the loop
    /// exits before the next one starts.
    async fn run_loop(&mut self) -> Result<(), DaemonError> {
        loop {
            self.service_signals().await?;
            if self.ctx.shutdown || !self.ctx.is_parent {
                break;
            }

            self.ctx.clock.start();

            if auto_restart_due(
                self.ctx.config.daemonize,
                self.ctx.config.auto_restart_interval_secs,
                self.ctx.runtime(),
            ) {
                self.restart().await?;
            }

            self.ctx.bus.dispatch(&EventKey::Run, Value::Null);
            self.app.execute(&mut self.ctx).await?;

            let timing = self.ctx.clock.stop_and_sleep().await?;
            self.log_timing(timing);

            for child in fork::reap_children() {
                self.ctx.workers.notify_child_exit(child.pid).await;
            }
        }
        Ok(())
    }

    /// Drain queued signals at the loop edge: dispatch `Signal` events in
    /// arrival order, then apply the deferred default actions.
    async fn service_signals(&mut self) -> Result<(), DaemonError> {
        let drained = match &mut self.ctx.signals {
            Some(router) => router.drain(),
            None => Vec::new(),
        };

        for signo in drained {
            self.ctx.log.info(&format!("Signal {signo} received"));
            self.ctx
                .bus
                .dispatch(&EventKey::Signal, json!({ "signal": signo }));
        }

        self.ctx.sync_shutdown_flag();

        let (restart, dump) = match &self.ctx.signals {
            Some(router) => (router.take_restart(), router.take_dump()),
            None => (false, false),
        };

        if dump {
            self.ctx.dump();
        }
        if restart {
            self.restart().await?;
        }
        Ok(())
    }

    /// Classify the iteration's timing in the daemon log.
    fn log_timing(&mut self, timing: LoopTiming) {
        let interval = self.ctx.config.loop_interval();
        match timing {
            LoopTiming::Overrun { elapsed } if !interval.is_zero() => {
                let msg = format!(
                    "run loop iteration took {:.4}s, over the {:.4}s loop interval",
                    elapsed.as_secs_f64(),
                    interval.as_secs_f64()
                );
                error!("{msg}");
                self.ctx.log.error(&msg);
                self.ctx
                    .bus
                    .dispatch(&EventKey::Error, json!({ "message": msg }));
            }
            LoopTiming::Tight { elapsed } => {
                let msg = format!(
                    "run loop iteration used {:.4}s of the {:.4}s loop interval",
                    elapsed.as_secs_f64(),
                    interval.as_secs_f64()
                );
                warn!("{msg}");
                self.ctx.log.warn(&msg);
            }
            _ => {}
        }
    }

    /// Replace this process with a freshly spawned instance.
    ///
    /// No-op outside the parent. The lock is released before the spawn so
    /// the replacement can acquire; stdout/stderr are pointed at the null
    /// device so the replacement inherits no blocked pipes. Does not
    /// return on success.
    async fn restart(&mut self) -> Result<(), DaemonError> {
        if !self.ctx.is_parent {
            return Ok(());
        }

        info!("Restarting {}", self.ctx.config.name);
        self.ctx.log.info("Restarting");
        self.ctx.bus.dispatch(&EventKey::Restart, Value::Null);

        self.ctx.plugins.teardown_locks().await;
        silence_std_streams()?;

        let replacement = spawn_replacement(&self.ctx.config)?;
        self.ctx
            .log
            .info(&format!("Replacement running (pid {replacement}); exiting"));
        std::process::exit(0);
    }

    /// Fatal-error path: log, then restart when uptime and the storm
    /// limiter allow it, otherwise tear down and surface the error.
    async fn fatal(&mut self, err: DaemonError) -> Result<(), DaemonError> {
        error!("Fatal: {err}");
        self.ctx.log.error(&err.to_string());
        self.ctx
            .bus
            .dispatch(&EventKey::Error, json!({ "message": err.to_string() }));
        self.ctx.log.info("Shutting down after fatal error");

        let uptime = self.ctx.runtime();
        if self.ctx.is_parent && uptime >= Duration::from_secs(MIN_RESTART_SECS) {
            let window = self.ctx.config.restart_window();
            let max = self.ctx.config.max_restarts;
            let recent = self.restart_window.record(window);

            if recent > max {
                let msg =
                    format!("restart limit hit: {recent} restarts within {window:?}");
                error!("{msg}");
                self.ctx.log.error(&msg);
                self.teardown_after_fatal().await;
                return Err(DaemonError::MaxRestartsExceeded { max });
            }
            self.ctx
                .log
                .info(&format!("Fatal restart {recent} of {max} within the window"));

            // Give transient external resources a moment before the
            // replacement starts.
            time::sleep(FATAL_RESTART_PAUSE).await;
            if let Err(e) = self.restart().await {
                self.ctx.log.error(&format!("restart failed: {e}"));
            }
        }

        self.teardown_after_fatal().await;
        Err(err)
    }

    /// Normal shutdown: `Shutdown` dispatch, application teardown, reverse
    /// plugin teardown, pid-file release.
    async fn shutdown_normally(&mut self) {
        self.ctx.bus.dispatch(&EventKey::Shutdown, Value::Null);
        self.app.teardown().await;
        self.ctx.workers.shutdown_all().await;
        self.ctx.plugins.teardown_all().await;
        self.release_pid_file();

        let stopped = format!("{} stopped", self.ctx.config.name);
        info!("{stopped}");
        self.ctx.log.info(&stopped);
    }

    /// Teardown after a fatal error. The `Shutdown` event is reserved for
    /// normal loop exit and is not dispatched here.
    async fn teardown_after_fatal(&mut self) {
        self.app.teardown().await;
        self.ctx.workers.shutdown_all().await;
        self.ctx.plugins.teardown_all().await;
        self.release_pid_file();
    }

    fn release_pid_file(&mut self) {
        if let Some(pid_file) = &mut self.ctx.pid_file {
            match pid_file.release() {
                Ok(removed) => debug!("PID file released (removed: {removed})"),
                Err(e) => self.ctx.log.warn(&format!("pid file release failed: {e}")),
            }
        }
    }

    /// Detach from the controlling terminal: double fork with an
    /// intervening `setsid`, optional chdir, standard streams pointed at
    /// the null device.
    fn daemonize(&mut self) -> Result<(), DaemonError> {
        info!("Detaching from the terminal");

        match fork::fork_process()? {
            ForkResult::Parent { .. } => std::process::exit(0),
            ForkResult::Child => {}
        }

        nix::unistd::setsid()
            .map_err(|e| DaemonError::ForkFailed(format!("setsid failed: {e}")))?;

        // Second fork: the session leader could still acquire a
        // controlling terminal.
        match fork::fork_process()? {
            ForkResult::Parent { .. } => std::process::exit(0),
            ForkResult::Child => {}
        }

        if let Some(dir) = &self.ctx.config.work_dir {
            nix::unistd::chdir(dir.as_path())
                .map_err(|e| DaemonError::ForkFailed(format!("chdir failed: {e}")))?;
        }

        // A detached daemon with no log file would be mute.
        if self.ctx.config.log_file.is_none() {
            let path = self.ctx.config.default_log_path();
            self.ctx.config.log_file = Some(path.clone());
            self.ctx.log = DaemonLog::new(Some(path), false);
        }

        let dev_null = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/null")?;
        let fd = dev_null.as_raw_fd();
        let _ = nix::unistd::dup2(fd, 0);
        let _ = nix::unistd::dup2(fd, 1);
        let _ = nix::unistd::dup2(fd, 2);

        self.ctx.log.set_detached();
        self.ctx.pid = std::process::id();
        self.ctx
            .bus
            .dispatch(&EventKey::NewPid, json!({ "pid": self.ctx.pid }));

        info!("Detached (pid {})", self.ctx.pid);
        Ok(())
    }
}
