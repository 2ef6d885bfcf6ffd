use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, radio-assigned id for a peripheral. Only meaningful to the adapter
/// that produced it and may change between sessions of the radio.
#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Serialize, Deserialize)]
pub struct CandidateHandle(String);

impl CandidateHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for CandidateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One advertisement as heard by the radio.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub date_time: DateTime<Utc>,
    pub handle: CandidateHandle,
    pub local_name: Option<String>,
    pub services: Vec<Uuid>,
    pub rssi: i16,
}

impl Advertisement {
    pub fn new(
        date_time: DateTime<Utc>,
        handle: CandidateHandle,
        local_name: Option<String>,
        services: Vec<Uuid>,
        rssi: i16,
    ) -> Self {
        Self {
            date_time,
            handle,
            local_name,
            services,
            rssi,
        }
    }

    /// Name if advertised, otherwise the handle.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.local_name {
            Some(name) => name.clone(),
            None => self.handle.to_string(),
        }
    }

    /// True when the name equals `name` and, if this advertisement lists any
    /// services at all, `service` is among them.
    #[must_use]
    pub fn is_target(&self, name: &str, service: Uuid) -> bool {
        let name_matches = self.local_name.as_deref() == Some(name);
        let service_matches = self.services.is_empty() || self.services.contains(&service);
        name_matches && service_matches
    }
}
