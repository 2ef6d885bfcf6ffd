use std::sync::Arc;

use tracing::info;

use proxiscan_sinks::settings::{SettingsError, SettingsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Enabled,
    Disabled,
    Unchanged,
}

/// User-controlled permission to scan, persisted across restarts.
pub struct EnablementToggle {
    store: Arc<dyn SettingsStore>,
    key: String,
    enabled: bool,
}

impl EnablementToggle {
    /// Reads the stored flag; never stored means disabled.
    pub async fn restore(
        store: Arc<dyn SettingsStore>,
        key: &str,
    ) -> Result<EnablementToggle, SettingsError> {
        let enabled = store.load_flag(key).await?.unwrap_or(false);
        info!("[EnablementToggle] Restored discovery enabled = {}", enabled);
        Ok(EnablementToggle {
            store,
            key: key.to_string(),
            enabled,
        })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Persists first; the in-memory flag only changes once the store has
    /// accepted the new value.
    pub async fn set(&mut self, enabled: bool) -> Result<Transition, SettingsError> {
        if enabled == self.enabled {
            return Ok(Transition::Unchanged);
        }
        self.store.store_flag(&self.key, enabled).await?;
        self.enabled = enabled;
        Ok(if enabled {
            Transition::Enabled
        } else {
            Transition::Disabled
        })
    }
}
