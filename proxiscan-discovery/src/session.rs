//! Connect, discover, read, disconnect: turning a transient handle into the
//! identity the peripheral reports about itself.

use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};
use uuid::Uuid;

use proxiscan_domain::advertisement::CandidateHandle;

use crate::{DiscoveryError, RadioAdapter, RadioError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    DiscoveringService,
    DiscoveringCharacteristic,
    ReadingValue,
    Disconnecting,
}

/// Where the identity lives on the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattTarget {
    pub service: Uuid,
    pub characteristic: Uuid,
}

/// The characteristic carries the identity as UTF-8 text; surrounding
/// whitespace is ignored.
pub fn parse_identity(payload: &[u8]) -> Result<Uuid, DiscoveryError> {
    let text = std::str::from_utf8(payload).map_err(|_| DiscoveryError::InvalidData)?;
    Uuid::parse_str(text.trim()).map_err(|_| DiscoveryError::InvalidData)
}

/// One identity read against one peripheral. Not reusable across handles.
pub struct IdentitySession<'a> {
    radio: &'a dyn RadioAdapter,
    handle: CandidateHandle,
    target: GattTarget,
    phase: SessionPhase,
    history: Vec<SessionPhase>,
}

impl<'a> IdentitySession<'a> {
    pub fn new(radio: &'a dyn RadioAdapter, handle: CandidateHandle, target: GattTarget) -> Self {
        Self {
            radio,
            handle,
            target,
            phase: SessionPhase::Idle,
            history: vec![],
        }
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Every phase entered so far, in order.
    #[must_use]
    pub fn history(&self) -> &[SessionPhase] {
        &self.history
    }

    /// Runs to exactly one outcome. `timeout` covers the whole session and
    /// fires `cancel`, so an expired timer and an explicit cancellation take
    /// the same path. Disconnect is issued once on every path and is given
    /// `timeout` again on its own.
    pub async fn run(
        &mut self,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Uuid, DiscoveryError> {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DiscoveryError::Cancelled),
            outcome = self.steps() => outcome,
            () = time::sleep(timeout) => {
                cancel.cancel();
                Err(DiscoveryError::ConnectionTimeout)
            }
        };
        self.disconnect(timeout).await;
        match &outcome {
            Ok(identity) => trace!("[IdentitySession] {} resolved to {}", self.handle, identity),
            Err(e) => trace!("[IdentitySession] {} failed: {}", self.handle, e),
        }
        outcome
    }

    fn enter(&mut self, phase: SessionPhase) {
        trace!("[IdentitySession] {} -> {:?}", self.handle, phase);
        self.phase = phase;
        self.history.push(phase);
    }

    async fn steps(&mut self) -> Result<Uuid, DiscoveryError> {
        let radio = self.radio;
        let handle = self.handle.clone();
        let GattTarget {
            service,
            characteristic,
        } = self.target;

        self.enter(SessionPhase::Connecting);
        radio.connect(&handle).await.map_err(|e| match e {
            RadioError::UnknownPeripheral => DiscoveryError::DeviceNotFound,
            other => {
                warn!("[IdentitySession] Failed to connect to {}: {}", handle, other);
                DiscoveryError::ConnectionTimeout
            }
        })?;

        self.enter(SessionPhase::DiscoveringService);
        match radio.discover_service(&handle, service).await {
            Ok(true) => {}
            Ok(false) => return Err(DiscoveryError::ServiceNotFound),
            Err(e) => {
                warn!("[IdentitySession] Service discovery on {} failed: {}", handle, e);
                return Err(DiscoveryError::ServiceNotFound);
            }
        }

        self.enter(SessionPhase::DiscoveringCharacteristic);
        match radio
            .discover_characteristic(&handle, service, characteristic)
            .await
        {
            Ok(true) => {}
            Ok(false) => return Err(DiscoveryError::CharacteristicNotFound),
            Err(e) => {
                warn!("[IdentitySession] Characteristic discovery on {} failed: {}", handle, e);
                return Err(DiscoveryError::CharacteristicNotFound);
            }
        }

        self.enter(SessionPhase::ReadingValue);
        let payload = radio
            .read_value(&handle, service, characteristic)
            .await
            .map_err(|e| {
                warn!("[IdentitySession] Read from {} failed: {}", handle, e);
                DiscoveryError::ReadFailed
            })?;
        parse_identity(&payload)
    }

    async fn disconnect(&mut self, timeout: Duration) {
        self.enter(SessionPhase::Disconnecting);
        match time::timeout(timeout, self.radio.disconnect(&self.handle)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("[IdentitySession] Disconnect from {} failed: {}", self.handle, e);
            }
            Err(_) => {
                warn!(
                    "[IdentitySession] Disconnect from {} still pending after {:?}, giving up",
                    self.handle, timeout
                );
            }
        }
        self.enter(SessionPhase::Idle);
    }
}
