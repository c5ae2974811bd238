//! The application contract.
//!
//! Implement [`App`] to turn a unit of periodic work into a supervised
//! daemon. The supervisor drives the hooks in a fixed order: plugins are
//! loaded and checked before anything runs, `setup` runs once after the
//! `Init` event, `execute` runs every loop iteration, and `teardown` runs
//! on normal shutdown. A forked child may re-run `setup` to reconnect
//! resources (database handles, sockets) invalidated across the fork.

use async_trait::async_trait;

use crate::daemon::DaemonContext;
use crate::error::DaemonError;
use crate::plugin::PluginHost;
use crate::worker::WorkerSet;

/// A supervised application.
#[async_trait]
pub trait App: Send + 'static {
    /// Report environment problems (missing binaries, unwritable paths).
    /// Findings join the supervisor's composite check; any finding is
    /// fatal before initialization.
    fn check_environment(&self) -> Vec<String> {
        Vec::new()
    }

    /// Install plugins. Runs before the environment check so plugin
    /// findings are part of the composite report.
    fn load_plugins(&mut self, _plugins: &mut PluginHost) -> Result<(), DaemonError> {
        Ok(())
    }

    /// Register named workers. Runs after plugin setup, before `Init`.
    fn register_workers(&mut self, _workers: &mut WorkerSet) -> Result<(), DaemonError> {
        Ok(())
    }

    /// One-time initialization. Runs after the `Init` event; also re-run
    /// in a forked child when requested via
    /// [`DaemonContext::fork_with_setup`].
    async fn setup(&mut self, _ctx: &mut DaemonContext) -> Result<(), DaemonError> {
        Ok(())
    }

    /// One iteration of work. Called every loop interval; an error
    /// escaping this hook is fatal (and triggers a restart attempt when
    /// uptime allows).
    async fn execute(&mut self, ctx: &mut DaemonContext) -> Result<(), DaemonError>;

    /// Final cleanup on normal shutdown.
    async fn teardown(&mut self) {}

    /// Extra lines for the `-i` install-instructions output.
    fn install_instructions(&self) -> Vec<String> {
        Vec::new()
    }
}
