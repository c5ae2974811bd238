//! Signal-to-event bridging.
//!
//! Forwarder tasks capture OS signals and do the minimum that is safe in
//! asynchronous context: set a lifecycle flag and enqueue the signal
//! number. The run loop drains the queue at each loop edge, dispatches
//! `Signal` events, and performs the heavier default actions (restart,
//! runtime dump) itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::DaemonError;

/// Default action bound to a captured signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignalAction {
    /// SIGTERM / SIGINT: latch the shutdown flag.
    Shutdown,
    /// SIGHUP: request a restart.
    Restart,
    /// SIGUSR1: request a runtime status dump.
    Dump,
    /// Forwarded as a `Signal` event only.
    Forward,
}

/// The deduplicated capture plan: signal number and its default action.
///
/// SIGKILL and SIGSTOP cannot be caught and are intentionally absent.
pub(crate) fn capture_plan() -> Vec<(i32, SignalAction)> {
    let raw: &[(i32, SignalAction)] = &[
        (nix::libc::SIGTERM, SignalAction::Shutdown),
        (nix::libc::SIGINT, SignalAction::Shutdown),
        (nix::libc::SIGHUP, SignalAction::Restart),
        (nix::libc::SIGUSR1, SignalAction::Dump),
        (nix::libc::SIGUSR2, SignalAction::Forward),
        (nix::libc::SIGCONT, SignalAction::Forward),
        (nix::libc::SIGIO, SignalAction::Forward),
        (nix::libc::SIGALRM, SignalAction::Forward),
    ];

    let mut seen = std::collections::BTreeSet::new();
    raw.iter()
        .filter(|(signo, _)| seen.insert(*signo))
        .copied()
        .collect()
}

/// Captures OS signals and exposes them as flags plus a drainable queue.
pub struct SignalRouter {
    shutdown: Arc<AtomicBool>,
    restart: Arc<AtomicBool>,
    dump: Arc<AtomicBool>,
    queue: mpsc::UnboundedReceiver<i32>,
}

impl SignalRouter {
    /// Install handlers for the whole capture plan and start one forwarder
    /// task per signal.
    pub fn install() -> Result<Self, DaemonError> {
        let (tx, queue) = mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let restart = Arc::new(AtomicBool::new(false));
        let dump = Arc::new(AtomicBool::new(false));

        for (signo, action) in capture_plan() {
            let mut stream = signal(SignalKind::from_raw(signo))
                .map_err(|e| DaemonError::SignalSetup(format!("signal {signo}: {e}")))?;

            let tx = tx.clone();
            let shutdown = Arc::clone(&shutdown);
            let restart = Arc::clone(&restart);
            let dump = Arc::clone(&dump);

            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    debug!("Captured signal {signo}");
                    match action {
                        SignalAction::Shutdown => shutdown.store(true, Ordering::SeqCst),
                        SignalAction::Restart => restart.store(true, Ordering::SeqCst),
                        SignalAction::Dump => dump.store(true, Ordering::SeqCst),
                        SignalAction::Forward => {}
                    }
                    if tx.send(signo).is_err() {
                        break;
                    }
                }
            });
        }

        Ok(Self {
            shutdown,
            restart,
            dump,
            queue,
        })
    }

    /// A router with no OS handlers attached; signals can only be injected
    /// through the returned controls. Used by tests and embedders that
    /// bridge their own signal source.
    pub fn detached() -> (Self, SignalInjector) {
        let (tx, queue) = mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let restart = Arc::new(AtomicBool::new(false));
        let dump = Arc::new(AtomicBool::new(false));

        let router = Self {
            shutdown: Arc::clone(&shutdown),
            restart: Arc::clone(&restart),
            dump: Arc::clone(&dump),
            queue,
        };
        let injector = SignalInjector {
            shutdown,
            restart,
            dump,
            tx,
        };
        (router, injector)
    }

    /// Whether a shutdown-class signal has arrived.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Latch the shutdown flag programmatically.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Consume a pending restart request.
    pub fn take_restart(&self) -> bool {
        self.restart.swap(false, Ordering::SeqCst)
    }

    /// Consume a pending dump request.
    pub fn take_dump(&self) -> bool {
        self.dump.swap(false, Ordering::SeqCst)
    }

    /// Drain the queued signal numbers, in arrival order.
    pub fn drain(&mut self) -> Vec<i32> {
        let mut signals = Vec::new();
        while let Ok(signo) = self.queue.try_recv() {
            signals.push(signo);
        }
        signals
    }
}

/// Test/bridge-side handle that feeds a detached [`SignalRouter`].
pub struct SignalInjector {
    shutdown: Arc<AtomicBool>,
    restart: Arc<AtomicBool>,
    dump: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<i32>,
}

impl SignalInjector {
    /// Inject a signal as if the OS delivered it.
    pub fn deliver(&self, signo: i32) {
        match signo {
            s if s == nix::libc::SIGTERM || s == nix::libc::SIGINT => {
                self.shutdown.store(true, Ordering::SeqCst)
            }
            s if s == nix::libc::SIGHUP => self.restart.store(true, Ordering::SeqCst),
            s if s == nix::libc::SIGUSR1 => self.dump.store(true, Ordering::SeqCst),
            _ => {}
        }
        let _ = self.tx.send(signo);
    }
}
