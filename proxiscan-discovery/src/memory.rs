//! A scripted radio with no hardware behind it.
//!
//! Peripherals are registered up front with the behaviour each GATT step
//! should show; every call made against the radio is recorded so callers can
//! assert on exactly what the discovery core did.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time;
use uuid::Uuid;

use proxiscan_domain::advertisement::{Advertisement, CandidateHandle};

use crate::{RadioAdapter, RadioError, RadioEvent, RadioState};

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectBehaviour {
    Accept,
    Refuse,
    /// Accept after the given delay.
    Delay(Duration),
    /// Never complete.
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectBehaviour {
    Accept,
    Delay(Duration),
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadBehaviour {
    Value(Vec<u8>),
    Fail,
    Hang,
}

#[derive(Debug, Clone)]
pub struct SimulatedPeripheral {
    connect: ConnectBehaviour,
    disconnect: DisconnectBehaviour,
    services: HashMap<Uuid, HashMap<Uuid, ReadBehaviour>>,
}

impl SimulatedPeripheral {
    #[must_use]
    pub fn new(connect: ConnectBehaviour) -> Self {
        Self {
            connect,
            disconnect: DisconnectBehaviour::Accept,
            services: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_disconnect(mut self, disconnect: DisconnectBehaviour) -> Self {
        self.disconnect = disconnect;
        self
    }

    /// Adds `service` with no characteristics.
    #[must_use]
    pub fn with_service(mut self, service: Uuid) -> Self {
        self.services.entry(service).or_default();
        self
    }

    #[must_use]
    pub fn with_characteristic(
        mut self,
        service: Uuid,
        characteristic: Uuid,
        read: ReadBehaviour,
    ) -> Self {
        self.services
            .entry(service)
            .or_default()
            .insert(characteristic, read);
        self
    }

    /// A peripheral that answers the read with `identity` as text.
    #[must_use]
    pub fn exposing_identity(service: Uuid, characteristic: Uuid, identity: &str) -> Self {
        Self::new(ConnectBehaviour::Accept).with_characteristic(
            service,
            characteristic,
            ReadBehaviour::Value(identity.as_bytes().to_vec()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    StartScan,
    StopScan,
    Connect(CandidateHandle),
    DiscoverService(CandidateHandle),
    DiscoverCharacteristic(CandidateHandle),
    Read(CandidateHandle),
    Disconnect(CandidateHandle),
}

pub struct MemoryRadio {
    peripherals: Mutex<HashMap<CandidateHandle, SimulatedPeripheral>>,
    calls: Mutex<Vec<RadioCall>>,
    scan_denied: AtomicBool,
    sender: UnboundedSender<RadioEvent>,
    receiver: Mutex<Option<UnboundedReceiver<RadioEvent>>>,
}

impl Default for MemoryRadio {
    fn default() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            peripherals: Mutex::default(),
            calls: Mutex::default(),
            scan_denied: AtomicBool::new(false),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }
}

impl MemoryRadio {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_peripheral(&self, handle: CandidateHandle, peripheral: SimulatedPeripheral) {
        self.peripherals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, peripheral);
    }

    pub fn remove_peripheral(&self, handle: &CandidateHandle) {
        self.peripherals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle);
    }

    /// Makes every later `start_scan` fail as if the user had refused
    /// Bluetooth access.
    pub fn deny_scan_permission(&self) {
        self.scan_denied.store(true, Ordering::SeqCst);
    }

    /// Queues `event` on the stream returned by [`RadioAdapter::events`].
    /// Dropped silently once nobody is listening.
    pub fn emit(&self, event: RadioEvent) {
        let _ = self.sender.send(event);
    }

    pub fn set_state(&self, state: RadioState) {
        self.emit(RadioEvent::StateChanged(state));
    }

    pub fn advertise(&self, handle: &CandidateHandle, name: &str, rssi: i16) {
        self.emit(RadioEvent::Advertisement(Advertisement::new(
            Utc::now(),
            handle.clone(),
            Some(name.to_string()),
            vec![],
            rssi,
        )));
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RadioCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn count(&self, matches: impl Fn(&RadioCall) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| matches(c))
            .count()
    }

    fn record(&self, call: RadioCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn peripheral(&self, handle: &CandidateHandle) -> Result<SimulatedPeripheral, RadioError> {
        self.peripherals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .cloned()
            .ok_or(RadioError::UnknownPeripheral)
    }
}

#[async_trait]
impl RadioAdapter for MemoryRadio {
    async fn events(&self) -> Result<BoxStream<'static, RadioEvent>, RadioError> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| RadioError::Backend("event stream already taken".into()))?;
        Ok(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        })
        .boxed())
    }

    async fn start_scan(&self) -> Result<(), RadioError> {
        self.record(RadioCall::StartScan);
        if self.scan_denied.load(Ordering::SeqCst) {
            return Err(RadioError::PermissionDenied);
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        self.record(RadioCall::StopScan);
        Ok(())
    }

    async fn connect(&self, handle: &CandidateHandle) -> Result<(), RadioError> {
        self.record(RadioCall::Connect(handle.clone()));
        match self.peripheral(handle)?.connect {
            ConnectBehaviour::Accept => Ok(()),
            ConnectBehaviour::Refuse => Err(RadioError::Backend("connection refused".into())),
            ConnectBehaviour::Delay(delay) => {
                time::sleep(delay).await;
                Ok(())
            }
            ConnectBehaviour::Hang => std::future::pending().await,
        }
    }

    async fn discover_service(
        &self,
        handle: &CandidateHandle,
        service: Uuid,
    ) -> Result<bool, RadioError> {
        self.record(RadioCall::DiscoverService(handle.clone()));
        Ok(self.peripheral(handle)?.services.contains_key(&service))
    }

    async fn discover_characteristic(
        &self,
        handle: &CandidateHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<bool, RadioError> {
        self.record(RadioCall::DiscoverCharacteristic(handle.clone()));
        Ok(self
            .peripheral(handle)?
            .services
            .get(&service)
            .is_some_and(|c| c.contains_key(&characteristic)))
    }

    async fn read_value(
        &self,
        handle: &CandidateHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, RadioError> {
        self.record(RadioCall::Read(handle.clone()));
        let read = self
            .peripheral(handle)?
            .services
            .get(&service)
            .and_then(|c| c.get(&characteristic))
            .cloned()
            .ok_or_else(|| RadioError::Backend("characteristic missing".into()))?;
        match read {
            ReadBehaviour::Value(value) => Ok(value),
            ReadBehaviour::Fail => Err(RadioError::Backend("read failed".into())),
            ReadBehaviour::Hang => std::future::pending().await,
        }
    }

    async fn disconnect(&self, handle: &CandidateHandle) -> Result<(), RadioError> {
        self.record(RadioCall::Disconnect(handle.clone()));
        let Ok(peripheral) = self.peripheral(handle) else {
            return Ok(());
        };
        match peripheral.disconnect {
            DisconnectBehaviour::Accept => {}
            DisconnectBehaviour::Delay(delay) => time::sleep(delay).await,
            DisconnectBehaviour::Hang => std::future::pending().await,
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use futures::StreamExt;
    use uuid::Uuid;

    use proxiscan_domain::advertisement::CandidateHandle;

    use crate::{RadioAdapter, RadioError, RadioEvent, RadioState};

    use super::{MemoryRadio, RadioCall, ReadBehaviour, SimulatedPeripheral};

    const SERVICE: Uuid = Uuid::from_u128(0x10);
    const CHARACTERISTIC: Uuid = Uuid::from_u128(0x11);

    #[tokio::test]
    async fn events_arrive_in_order() {
        let radio = MemoryRadio::new();
        let handle = CandidateHandle::new("a");
        radio.set_state(RadioState::PoweredOn);
        radio.advertise(&handle, "rpi-camera", -60);
        let mut events = radio.events().await.unwrap();
        assert_eq!(events.next().await, Some(RadioEvent::StateChanged(RadioState::PoweredOn)));
        assert!(matches!(events.next().await, Some(RadioEvent::Advertisement(a)) if a.handle == handle));
    }

    #[tokio::test]
    async fn events_can_only_be_taken_once() {
        let radio = MemoryRadio::new();
        assert!(radio.events().await.is_ok());
        assert!(matches!(radio.events().await, Err(RadioError::Backend(_))));
    }

    #[tokio::test]
    async fn unknown_peripheral_is_reported() {
        let radio = MemoryRadio::new();
        let result = radio.connect(&CandidateHandle::new("ghost")).await;
        assert!(matches!(result, Err(RadioError::UnknownPeripheral)));
        assert_eq!(radio.calls(), vec![RadioCall::Connect(CandidateHandle::new("ghost"))]);
    }

    #[tokio::test]
    async fn scripted_gatt_layout() {
        let radio = MemoryRadio::new();
        let handle = CandidateHandle::new("a");
        radio.add_peripheral(
            handle.clone(),
            SimulatedPeripheral::exposing_identity(SERVICE, CHARACTERISTIC, "id"),
        );
        assert!(radio.discover_service(&handle, SERVICE).await.unwrap());
        assert!(!radio.discover_service(&handle, CHARACTERISTIC).await.unwrap());
        assert!(radio.discover_characteristic(&handle, SERVICE, CHARACTERISTIC).await.unwrap());
        assert_eq!(radio.read_value(&handle, SERVICE, CHARACTERISTIC).await.unwrap(), b"id");
    }

    #[tokio::test]
    async fn removed_peripheral_is_unknown() {
        let radio = MemoryRadio::new();
        let handle = CandidateHandle::new("a");
        radio.add_peripheral(
            handle.clone(),
            SimulatedPeripheral::exposing_identity(SERVICE, CHARACTERISTIC, "id"),
        );
        radio.remove_peripheral(&handle);
        assert!(matches!(radio.connect(&handle).await, Err(RadioError::UnknownPeripheral)));
        assert!(radio.disconnect(&handle).await.is_ok());
    }

    #[tokio::test]
    async fn denied_scan() {
        let radio = MemoryRadio::new();
        radio.deny_scan_permission();
        assert!(matches!(radio.start_scan().await, Err(RadioError::PermissionDenied)));
        assert_eq!(radio.calls(), vec![RadioCall::StartScan]);
    }

    #[tokio::test]
    async fn failing_read() {
        let radio = MemoryRadio::new();
        let handle = CandidateHandle::new("a");
        radio.add_peripheral(
            handle.clone(),
            SimulatedPeripheral::new(super::ConnectBehaviour::Accept).with_characteristic(
                SERVICE,
                CHARACTERISTIC,
                ReadBehaviour::Fail,
            ),
        );
        assert!(radio.read_value(&handle, SERVICE, CHARACTERISTIC).await.is_err());
    }
}
