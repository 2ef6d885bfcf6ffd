use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{error, trace};
use uuid::Uuid;

use proxiscan_domain::advertisement::{Advertisement, CandidateHandle};

use crate::{RadioAdapter, RadioError, RadioEvent, RadioState};

type KnownPeripherals = Arc<Mutex<HashMap<CandidateHandle, PeripheralId>>>;

/// The first Bluetooth adapter of this machine, via btleplug.
///
/// A machine without a usable adapter still yields a radio; it reports
/// itself as unsupported or unauthorized and refuses every operation.
pub struct LocalRadio {
    adapter: Result<Adapter, RadioState>,
    known: KnownPeripherals,
}

async fn first_adapter() -> Result<Adapter, RadioError> {
    let manager = Manager::new().await?;
    let mut adapter_list = manager.adapters().await?;
    adapter_list.pop().ok_or(RadioError::NoAdapter)
}

/// Reports `state` once and then stays silent.
fn stuck_in(state: RadioState) -> BoxStream<'static, RadioEvent> {
    stream::once(async move { RadioEvent::StateChanged(state) })
        .chain(stream::pending())
        .boxed()
}

impl LocalRadio {
    pub async fn new() -> LocalRadio {
        let adapter = first_adapter().await.map_err(|e| {
            error!("No usable Bluetooth adapter: {}", e);
            e.radio_state().unwrap_or(RadioState::Unsupported)
        });
        LocalRadio {
            adapter,
            known: Arc::default(),
        }
    }

    fn adapter(&self) -> Result<&Adapter, RadioError> {
        match &self.adapter {
            Ok(adapter) => Ok(adapter),
            Err(RadioState::Unauthorized) => Err(RadioError::PermissionDenied),
            Err(_) => Err(RadioError::NoAdapter),
        }
    }

    async fn peripheral(&self, handle: &CandidateHandle) -> Result<Peripheral, RadioError> {
        let id = self
            .known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .cloned()
            .ok_or(RadioError::UnknownPeripheral)?;
        Ok(self.adapter()?.peripheral(&id).await?)
    }

    async fn subscribe(&self, adapter: &Adapter) -> Result<BoxStream<'static, RadioEvent>, RadioError> {
        let initial = radio_state(adapter.adapter_state().await?);
        let central_events = adapter.events().await?;
        let adapter = adapter.clone();
        let known = Arc::clone(&self.known);
        let translated = central_events.filter_map(move |event| {
            let adapter = adapter.clone();
            let known = Arc::clone(&known);
            async move { translate(&adapter, &known, event).await }
        });
        Ok(stream::once(async move { RadioEvent::StateChanged(initial) })
            .chain(translated)
            .boxed())
    }
}

fn handle_for(id: &PeripheralId) -> CandidateHandle {
    CandidateHandle::new(format!("{id:?}"))
}

fn radio_state(state: CentralState) -> RadioState {
    match state {
        CentralState::PoweredOn => RadioState::PoweredOn,
        CentralState::PoweredOff => RadioState::PoweredOff,
        _ => RadioState::Unknown,
    }
}

fn find_characteristic(
    peripheral: &Peripheral,
    service: Uuid,
    characteristic: Uuid,
) -> Option<Characteristic> {
    peripheral
        .services()
        .into_iter()
        .find(|s| s.uuid == service)
        .and_then(|s| s.characteristics.into_iter().find(|c| c.uuid == characteristic))
}

async fn translate(adapter: &Adapter, known: &KnownPeripherals, event: CentralEvent) -> Option<RadioEvent> {
    match event {
        CentralEvent::StateUpdate(state) => Some(RadioEvent::StateChanged(radio_state(state))),
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
            let peripheral = match adapter.peripheral(&id).await {
                Ok(peripheral) => peripheral,
                Err(e) => {
                    trace!("[LocalRadio] peripheral vanished before lookup: {}", e);
                    return None;
                }
            };
            let properties = peripheral.properties().await.ok().flatten()?;
            let rssi = properties.rssi?;
            let handle = handle_for(&id);
            known
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(handle.clone(), id);
            Some(RadioEvent::Advertisement(Advertisement::new(
                Utc::now(),
                handle,
                properties.local_name,
                properties.services,
                rssi,
            )))
        }
        _ => None,
    }
}

#[async_trait]
impl RadioAdapter for LocalRadio {
    /// Never fails: an adapter that cannot be watched is reported as
    /// unauthorized or unsupported.
    async fn events(&self) -> Result<BoxStream<'static, RadioEvent>, RadioError> {
        let adapter = match &self.adapter {
            Ok(adapter) => adapter,
            Err(state) => return Ok(stuck_in(*state)),
        };
        match self.subscribe(adapter).await {
            Ok(events) => Ok(events),
            Err(e) => {
                error!("Unable to watch Bluetooth adapter: {}", e);
                Ok(stuck_in(e.radio_state().unwrap_or(RadioState::Unsupported)))
            }
        }
    }

    async fn start_scan(&self) -> Result<(), RadioError> {
        trace!("[LocalRadio] Starting BLE scan");
        self.adapter()?.start_scan(ScanFilter::default()).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        trace!("[LocalRadio] Stopping BLE scan");
        self.adapter()?.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, handle: &CandidateHandle) -> Result<(), RadioError> {
        let peripheral = self.peripheral(handle).await?;
        peripheral.connect().await?;
        Ok(())
    }

    async fn discover_service(
        &self,
        handle: &CandidateHandle,
        service: Uuid,
    ) -> Result<bool, RadioError> {
        let peripheral = self.peripheral(handle).await?;
        peripheral.discover_services().await?;
        let services = peripheral.services();
        trace!("[LocalRadio] {} exposes {} services", handle, services.len());
        Ok(services.iter().any(|s| s.uuid == service))
    }

    async fn discover_characteristic(
        &self,
        handle: &CandidateHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<bool, RadioError> {
        let peripheral = self.peripheral(handle).await?;
        Ok(find_characteristic(&peripheral, service, characteristic).is_some())
    }

    async fn read_value(
        &self,
        handle: &CandidateHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, RadioError> {
        let peripheral = self.peripheral(handle).await?;
        let characteristic = find_characteristic(&peripheral, service, characteristic)
            .ok_or_else(|| RadioError::Backend("characteristic disappeared".into()))?;
        let data = peripheral.read(&characteristic).await?;
        trace!("[LocalRadio] Read {} bytes from {}", data.len(), handle);
        Ok(data)
    }

    async fn disconnect(&self, handle: &CandidateHandle) -> Result<(), RadioError> {
        let peripheral = self.peripheral(handle).await?;
        peripheral.disconnect().await?;
        Ok(())
    }
}
