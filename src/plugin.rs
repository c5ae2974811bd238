//! Pluggable components with a common lifecycle contract.
//!
//! Plugins are bound to the supervisor under an alias and participate in
//! the composite environment check. Setup runs in installation order,
//! teardown in reverse. After a fork the child clears the registry without
//! tearing anything down, so child exit never releases resources owned by
//! the parent.

use async_trait::async_trait;
use tracing::debug;

use crate::error::DaemonError;

/// Lifecycle contract every plugin implements.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable plugin name; the default installation alias.
    fn name(&self) -> &str;

    /// Report environment problems. Findings are aggregated into the
    /// supervisor's composite check; an empty list means "ready".
    fn check_environment(&self) -> Vec<String> {
        Vec::new()
    }

    /// Prepare the plugin for use. Runs before the application's setup.
    async fn setup(&mut self) -> Result<(), DaemonError>;

    /// Release plugin resources. Runs in reverse installation order on
    /// normal supervisor teardown.
    async fn teardown(&mut self);
}

/// A plugin that guarantees at-most-one live supervisor per identity.
#[async_trait]
pub trait LockPlugin: Plugin {
    /// Claim the singleton token. Fails while another live holder exists.
    async fn acquire(&mut self) -> Result<(), DaemonError>;

    /// Whether another live instance currently holds the token.
    /// Safe to poll at any time.
    fn is_held_by_other(&self) -> bool;
}

enum PluginEntry {
    Plain {
        alias: String,
        plugin: Box<dyn Plugin>,
    },
    Lock {
        alias: String,
        plugin: Box<dyn LockPlugin>,
    },
}

impl PluginEntry {
    fn alias(&self) -> &str {
        match self {
            PluginEntry::Plain { alias, .. } | PluginEntry::Lock { alias, .. } => alias,
        }
    }

    fn as_plugin(&self) -> &dyn Plugin {
        match self {
            PluginEntry::Plain { plugin, .. } => plugin.as_ref(),
            PluginEntry::Lock { plugin, .. } => plugin.as_ref(),
        }
    }
}

/// Ordered plugin registry owned by the supervisor.
#[derive(Default)]
pub struct PluginHost {
    entries: Vec<PluginEntry>,
}

impl PluginHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a plugin under its own name.
    pub fn install(&mut self, plugin: Box<dyn Plugin>) -> Result<(), DaemonError> {
        let alias = plugin.name().to_string();
        self.install_as(alias, plugin)
    }

    /// Install a plugin under an explicit alias.
    pub fn install_as(
        &mut self,
        alias: impl Into<String>,
        plugin: Box<dyn Plugin>,
    ) -> Result<(), DaemonError> {
        let alias = alias.into();
        self.ensure_free(&alias)?;
        debug!("Installed plugin '{alias}'");
        self.entries.push(PluginEntry::Plain { alias, plugin });
        Ok(())
    }

    /// Install a lock plugin under its own name.
    pub fn install_lock(&mut self, plugin: Box<dyn LockPlugin>) -> Result<(), DaemonError> {
        let alias = plugin.name().to_string();
        self.install_lock_as(alias, plugin)
    }

    /// Install a lock plugin under an explicit alias.
    pub fn install_lock_as(
        &mut self,
        alias: impl Into<String>,
        plugin: Box<dyn LockPlugin>,
    ) -> Result<(), DaemonError> {
        let alias = alias.into();
        self.ensure_free(&alias)?;
        debug!("Installed lock plugin '{alias}'");
        self.entries.push(PluginEntry::Lock { alias, plugin });
        Ok(())
    }

    fn ensure_free(&self, alias: &str) -> Result<(), DaemonError> {
        if self.entries.iter().any(|e| e.alias() == alias) {
            return Err(DaemonError::Plugin {
                alias: alias.to_string(),
                reason: "alias already installed".to_string(),
            });
        }
        Ok(())
    }

    /// Look up an installed plugin by alias.
    pub fn plugin(&self, alias: &str) -> Option<&dyn Plugin> {
        self.entries
            .iter()
            .find(|e| e.alias() == alias)
            .map(PluginEntry::as_plugin)
    }

    /// Installed aliases in installation order.
    pub fn aliases(&self) -> Vec<&str> {
        self.entries.iter().map(PluginEntry::alias).collect()
    }

    /// Number of installed plugins.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aggregate every plugin's environment findings, prefixed by alias.
    pub fn check_environment(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for entry in &self.entries {
            for finding in entry.as_plugin().check_environment() {
                errors.push(format!("{}: {}", entry.alias(), finding));
            }
        }
        errors
    }

    /// Set up every plugin in installation order.
    ///
    /// Lock plugins claim their token first; a token held by another live
    /// instance aborts initialization.
    pub async fn setup_all(&mut self) -> Result<(), DaemonError> {
        for entry in self.entries.iter_mut() {
            match entry {
                PluginEntry::Plain { alias, plugin } => {
                    plugin.setup().await.map_err(|e| DaemonError::Plugin {
                        alias: alias.clone(),
                        reason: e.to_string(),
                    })?;
                }
                PluginEntry::Lock { alias, plugin } => {
                    plugin.acquire().await?;
                    if plugin.is_held_by_other() {
                        return Err(DaemonError::Plugin {
                            alias: alias.clone(),
                            reason: "singleton token held by another instance".to_string(),
                        });
                    }
                    plugin.setup().await.map_err(|e| DaemonError::Plugin {
                        alias: alias.clone(),
                        reason: e.to_string(),
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Tear down every plugin, in reverse installation order.
    pub async fn teardown_all(&mut self) {
        for entry in self.entries.iter_mut().rev() {
            match entry {
                PluginEntry::Plain { plugin, .. } => plugin.teardown().await,
                PluginEntry::Lock { plugin, .. } => plugin.teardown().await,
            }
        }
        self.entries.clear();
    }

    /// Tear down lock plugins only, leaving the rest installed.
    ///
    /// Run before exec'ing a replacement process so it can acquire.
    pub async fn teardown_locks(&mut self) {
        for entry in self.entries.iter_mut().rev() {
            if let PluginEntry::Lock { alias, plugin } = entry {
                debug!("Releasing lock plugin '{alias}' ahead of restart");
                plugin.teardown().await;
            }
        }
    }

    /// Whether any lock plugin reports its token held elsewhere.
    pub fn lock_held_by_other(&self) -> bool {
        self.entries.iter().any(|e| match e {
            PluginEntry::Lock { plugin, .. } => plugin.is_held_by_other(),
            PluginEntry::Plain { .. } => false,
        })
    }

    /// Drop every registry entry without running teardown.
    ///
    /// Child branches call this right after a fork: teardown is driven by
    /// the registry, so an empty registry means the child cannot release
    /// locks or files owned by the parent.
    pub fn clear_without_teardown(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
#[path = "plugin_tests.rs"]
mod tests;
