use async_trait::async_trait;
use tracing::info;

use super::{DeviceFound, DeviceFoundSink, SinkError};

/// Logs each resolution at `info`.
#[derive(Default)]
pub struct TracingDeviceFoundSink;

#[async_trait]
impl DeviceFoundSink for TracingDeviceFoundSink {
    async fn device_found(&mut self, event: &DeviceFound) -> Result<(), SinkError> {
        match event.distance {
            Some(distance) => info!(
                identity = %event.identity,
                "{} is nearby ({distance:.2}m)",
                event.name
            ),
            None => info!(identity = %event.identity, "{} is nearby", event.name),
        }
        Ok(())
    }
    async fn close(mut self: Box<Self>) -> Result<(), SinkError> {
        Ok(())
    }
}
