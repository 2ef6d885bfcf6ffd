//! Discovery of nearby target peripherals and resolution of their identity.
//!
//! Radio hardware sits behind [`RadioAdapter`] so the scanner and session
//! logic can run against [`memory::MemoryRadio`] as well as real Bluetooth
//! ([`local::LocalRadio`]).

pub mod error;
pub mod local;
pub mod memory;
pub mod scanner;
pub mod service;
pub mod session;
pub mod toggle;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use proxiscan_domain::advertisement::{Advertisement, CandidateHandle};

pub use error::{DiscoveryError, RadioError};
pub use service::DiscoveryService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Unknown,
    PoweredOff,
    PoweredOn,
    Resetting,
    Unauthorized,
    Unsupported,
}

impl std::fmt::Display for RadioState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RadioState::Unknown => "unknown",
            RadioState::PoweredOff => "powered off",
            RadioState::PoweredOn => "powered on",
            RadioState::Resetting => "resetting",
            RadioState::Unauthorized => "unauthorized",
            RadioState::Unsupported => "unsupported",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    StateChanged(RadioState),
    Advertisement(Advertisement),
}

/// What the discovery core needs from a Bluetooth central.
#[async_trait]
pub trait RadioAdapter: Send + Sync {
    /// Radio state changes and advertisements, in the order they happened.
    /// May only be taken once.
    async fn events(&self) -> Result<BoxStream<'static, RadioEvent>, RadioError>;

    async fn start_scan(&self) -> Result<(), RadioError>;
    async fn stop_scan(&self) -> Result<(), RadioError>;

    async fn connect(&self, handle: &CandidateHandle) -> Result<(), RadioError>;

    /// `Ok(false)` if the peripheral does not expose `service`.
    async fn discover_service(
        &self,
        handle: &CandidateHandle,
        service: Uuid,
    ) -> Result<bool, RadioError>;

    /// `Ok(false)` if `service` has no `characteristic`.
    async fn discover_characteristic(
        &self,
        handle: &CandidateHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<bool, RadioError>;

    async fn read_value(
        &self,
        handle: &CandidateHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, RadioError>;

    async fn disconnect(&self, handle: &CandidateHandle) -> Result<(), RadioError>;
}
