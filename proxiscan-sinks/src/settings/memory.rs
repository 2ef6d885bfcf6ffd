use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{SettingsError, SettingsStore};

/// Process-local store; nothing survives a restart.
#[derive(Default, Debug)]
pub struct MemorySettingsStore {
    flags: Mutex<HashMap<String, bool>>,
}

impl MemorySettingsStore {
    #[must_use]
    pub fn with_flag(key: &str, value: bool) -> Self {
        let store = Self::default();
        store.set(key, value);
        store
    }

    fn set(&self, key: &str, value: bool) {
        let mut flags = self.flags.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        flags.insert(key.to_string(), value);
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load_flag(&self, key: &str) -> Result<Option<bool>, SettingsError> {
        let flags = self.flags.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(flags.get(key).copied())
    }

    async fn store_flag(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.set(key, value);
        Ok(())
    }
}
