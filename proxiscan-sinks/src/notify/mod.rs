pub mod sqllite;
pub mod trace;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use proxiscan_domain::device::DiscoveredDevice;

/// Emitted once each time a peripheral's identity is newly resolved.
#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct DeviceFound {
    pub date_time: DateTime<Utc>,
    pub identity: Uuid,
    pub name: String,
    /// `None` when the radio gave no usable signal strength.
    pub distance: Option<f64>,
}

impl DeviceFound {
    #[must_use]
    pub fn from_device(device: &DiscoveredDevice) -> DeviceFound {
        DeviceFound {
            date_time: device.last_seen_at,
            identity: device.identity,
            name: device.advertised_name.clone(),
            distance: device.distance(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Receives "device found" notifications. Whether a notification is actually
/// surfaced to a user is up to the implementation.
#[async_trait]
pub trait DeviceFoundSink: Send {
    async fn device_found(&mut self, event: &DeviceFound) -> Result<(), SinkError>;
    async fn close(mut self: Box<Self>) -> Result<(), SinkError>;
}
