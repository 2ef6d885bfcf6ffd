//! The discovery core as one explicitly constructed service.
//!
//! All mutable state sits behind a single [`tokio::sync::Mutex`]. Radio events
//! are applied one at a time; an identity-read session runs in its own task
//! and reports back through the same lock, so no two transitions ever
//! interleave. At most one session is in flight at any time.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use proxiscan_domain::advertisement::{Advertisement, CandidateHandle};
use proxiscan_domain::config::DiscoveryConfig;
use proxiscan_domain::device::{DiscoveredDevice, PendingCandidate};
use proxiscan_domain::distance::UNKNOWN_DISTANCE;
use proxiscan_domain::ignored::{IgnoredAdvertisement, IgnoredAdvertisements};
use proxiscan_domain::registry::{Registry, Upsert};
use proxiscan_sinks::notify::{DeviceFound, DeviceFoundSink};
use proxiscan_sinks::settings::SettingsStore;

use crate::scanner::{AdvertisementFilter, RadioScanner};
use crate::session::{GattTarget, IdentitySession};
use crate::toggle::{EnablementToggle, Transition};
use crate::{DiscoveryError, RadioAdapter, RadioEvent, RadioState};

/// What became of one advertisement.
#[derive(Debug)]
pub enum AdvertisementOutcome {
    /// Discovery is switched off.
    Disabled,
    /// Not a target; kept in the ignored list.
    Filtered,
    /// Identity already known; the registry entry was refreshed.
    Refreshed(Uuid),
    /// The candidate currently being resolved was refreshed.
    PendingRefreshed,
    /// Another candidate is being resolved; dropped.
    Busy,
    /// Unknown distance or beyond the threshold.
    TooFar,
    SessionStarted(JoinHandle<Result<Uuid, DiscoveryError>>),
}

struct ActiveSession {
    id: u64,
    candidate: PendingCandidate,
    cancel: CancellationToken,
    /// Set on disable or shutdown. The slot stays taken until the session has
    /// disconnected; its result is then dropped.
    abandoned: bool,
}

struct DiscoveryState {
    scanner: RadioScanner,
    toggle: EnablementToggle,
    registry: Registry,
    /// Handles whose identity has been read.
    resolved: HashMap<CandidateHandle, Uuid>,
    /// Latest sighting of every unresolved target, used for manual retries.
    sightings: HashMap<CandidateHandle, PendingCandidate>,
    active: Option<ActiveSession>,
    ignored: IgnoredAdvertisements,
    next_session: u64,
}

impl DiscoveryState {
    fn begin_session(&mut self, candidate: PendingCandidate) -> (u64, CancellationToken) {
        self.next_session += 1;
        let cancel = CancellationToken::new();
        info!(
            "[DiscoveryService] Resolving {} ({}) at {}",
            candidate.advertised_name,
            candidate.handle,
            describe_distance(candidate.distance())
        );
        self.active = Some(ActiveSession {
            id: self.next_session,
            candidate,
            cancel: cancel.clone(),
            abandoned: false,
        });
        (self.next_session, cancel)
    }

    fn forget(&mut self) {
        self.registry.clear();
        self.resolved.clear();
        self.sightings.clear();
        self.ignored.clear();
        self.abandon_session();
    }

    fn abandon_session(&mut self) {
        if let Some(active) = self.active.as_mut() {
            debug!("[DiscoveryService] Discarding session for {}", active.candidate.handle);
            active.abandoned = true;
            active.cancel.cancel();
        }
    }

    /// Drops unresolved sightings older than `window` at `now`.
    fn prune_sightings(&mut self, now: DateTime<Utc>, window: chrono::Duration) {
        self.sightings.retain(|_, c| now - c.seen_at < window);
    }
}

fn describe_distance(distance: Option<f64>) -> String {
    match distance {
        Some(d) => format!("{d:.2}m"),
        None => "unknown distance".to_string(),
    }
}

#[derive(Clone)]
pub struct DiscoveryService {
    config: Arc<DiscoveryConfig>,
    radio: Arc<dyn RadioAdapter>,
    sink: Arc<Mutex<Option<Box<dyn DeviceFoundSink>>>>,
    state: Arc<Mutex<DiscoveryState>>,
}

impl DiscoveryService {
    /// Restores the enablement flag from `settings`. Scanning starts once the
    /// radio reports itself powered on.
    pub async fn new(
        config: DiscoveryConfig,
        radio: Arc<dyn RadioAdapter>,
        settings: Arc<dyn SettingsStore>,
        sink: Box<dyn DeviceFoundSink>,
    ) -> Result<DiscoveryService, DiscoveryError> {
        let toggle = EnablementToggle::restore(settings, &config.settings_key).await?;
        let filter = AdvertisementFilter {
            name: config.target_name.clone(),
            service: config.target_service,
        };
        let state = DiscoveryState {
            scanner: RadioScanner::new(Arc::clone(&radio), filter),
            toggle,
            registry: Registry::default(),
            resolved: HashMap::new(),
            sightings: HashMap::new(),
            active: None,
            ignored: IgnoredAdvertisements::new(config.ignored_capacity),
            next_session: 0,
        };
        Ok(DiscoveryService {
            config: Arc::new(config),
            radio,
            sink: Arc::new(Mutex::new(Some(sink))),
            state: Arc::new(Mutex::new(state)),
        })
    }

    #[must_use]
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.toggle.is_enabled()
    }

    /// Persists `enabled`. Turning discovery off stops the scan, empties the
    /// registry and abandons any session in flight; turning it on starts
    /// scanning if the radio is powered on.
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), DiscoveryError> {
        let mut state = self.state.lock().await;
        match state.toggle.set(enabled).await? {
            Transition::Enabled => {
                info!("[DiscoveryService] Discovery enabled");
                if let Err(e) = state.scanner.start().await {
                    warn!("[DiscoveryService] Unable to start scanning: {}", e);
                }
            }
            Transition::Disabled => {
                info!("[DiscoveryService] Discovery disabled");
                if let Err(e) = state.scanner.stop().await {
                    warn!("[DiscoveryService] Unable to stop scanning: {}", e);
                }
                state.forget();
            }
            Transition::Unchanged => {}
        }
        Ok(())
    }

    pub async fn nearest_device(&self) -> Option<DiscoveredDevice> {
        self.nearest_device_at(Utc::now()).await
    }

    pub async fn nearest_device_at(&self, now: DateTime<Utc>) -> Option<DiscoveredDevice> {
        let state = self.state.lock().await;
        state.registry.nearest(now, self.config.staleness_window())
    }

    /// Whether the nearest fresh device is within the distance threshold.
    pub async fn is_device_found(&self) -> bool {
        self.nearest_device()
            .await
            .is_some_and(|d| self.config.is_close_enough(d.distance()))
    }

    /// Every fresh device, closest first.
    pub async fn snapshot(&self) -> Vec<DiscoveredDevice> {
        let state = self.state.lock().await;
        state
            .registry
            .snapshot(Utc::now(), self.config.staleness_window())
    }

    /// Stale entries included.
    pub async fn stored_device_count(&self) -> usize {
        self.state.lock().await.registry.len()
    }

    pub async fn radio_state(&self) -> RadioState {
        self.state.lock().await.scanner.radio_state()
    }

    pub async fn is_scanning(&self) -> bool {
        self.state.lock().await.scanner.is_scanning()
    }

    pub async fn session_active(&self) -> bool {
        self.state.lock().await.active.is_some()
    }

    pub async fn ignored_advertisements(&self) -> Vec<IgnoredAdvertisement> {
        self.state.lock().await.ignored.get_sorted()
    }

    /// Applies radio events until the stream ends.
    pub async fn run(&self, mut events: BoxStream<'static, RadioEvent>) {
        while let Some(event) = events.next().await {
            self.handle_event(event).await;
        }
        info!("[DiscoveryService] Radio event stream ended");
    }

    pub async fn handle_event(&self, event: RadioEvent) {
        match event {
            RadioEvent::StateChanged(radio_state) => self.handle_radio_state(radio_state).await,
            RadioEvent::Advertisement(advertisement) => {
                self.handle_advertisement(advertisement).await;
            }
        }
    }

    /// A power-off keeps the registry; the outage is assumed to be transient.
    pub async fn handle_radio_state(&self, radio_state: RadioState) {
        let mut state = self.state.lock().await;
        let enabled = state.toggle.is_enabled();
        state.scanner.on_state_changed(radio_state, enabled).await;
    }

    pub async fn handle_advertisement(&self, advertisement: Advertisement) -> AdvertisementOutcome {
        let mut state = self.state.lock().await;
        if !state.toggle.is_enabled() {
            return AdvertisementOutcome::Disabled;
        }
        if !state.scanner.filter().matches(&advertisement) {
            debug!(
                "[DiscoveryService] Ignoring {} ({})",
                advertisement.label(),
                advertisement.rssi
            );
            state.ignored.record(&advertisement);
            return AdvertisementOutcome::Filtered;
        }

        let calibration = &self.config.calibration;
        if let Some(identity) = state.resolved.get(&advertisement.handle).copied() {
            let upsert = state.registry.upsert(
                identity,
                &advertisement.label(),
                advertisement.rssi,
                calibration.estimate(advertisement.rssi),
                advertisement.date_time,
            );
            let found = (upsert == Upsert::Inserted)
                .then(|| state.registry.get(&identity).map(DeviceFound::from_device))
                .flatten();
            drop(state);
            if let Some(found) = found {
                self.notify(&found).await;
            }
            return AdvertisementOutcome::Refreshed(identity);
        }

        state.prune_sightings(advertisement.date_time, self.config.staleness_window());
        if let Some(active) = state.active.as_mut() {
            if !active.abandoned && active.candidate.handle == advertisement.handle {
                active.candidate.update(&advertisement, calibration);
                return AdvertisementOutcome::PendingRefreshed;
            }
            debug!(
                "[DiscoveryService] Session in progress, dropping {}",
                advertisement.handle
            );
            state
                .sightings
                .entry(advertisement.handle.clone())
                .and_modify(|c| c.update(&advertisement, calibration))
                .or_insert_with(|| PendingCandidate::from_advertisement(&advertisement, calibration));
            return AdvertisementOutcome::Busy;
        }

        let candidate = PendingCandidate::from_advertisement(&advertisement, calibration);
        state
            .sightings
            .insert(candidate.handle.clone(), candidate.clone());
        if !self.config.is_close_enough(candidate.distance()) {
            debug!(
                "[DiscoveryService] {} is too far away ({})",
                candidate.handle,
                describe_distance(candidate.distance())
            );
            return AdvertisementOutcome::TooFar;
        }

        let handle = candidate.handle.clone();
        let (id, cancel) = state.begin_session(candidate);
        drop(state);
        let service = self.clone();
        AdvertisementOutcome::SessionStarted(tokio::spawn(async move {
            service.resolve(id, handle, cancel).await
        }))
    }

    /// Runs a session for `handle` in the caller's task. Refused while another
    /// session is in flight.
    pub async fn connect_and_read_identity(
        &self,
        handle: CandidateHandle,
    ) -> Result<Uuid, DiscoveryError> {
        let (id, cancel) = {
            let mut state = self.state.lock().await;
            if state.active.is_some() {
                return Err(DiscoveryError::SessionInProgress);
            }
            let candidate = state
                .sightings
                .get(&handle)
                .cloned()
                .unwrap_or_else(|| PendingCandidate {
                    handle: handle.clone(),
                    advertised_name: handle.to_string(),
                    rssi: 0,
                    estimated_distance: UNKNOWN_DISTANCE,
                    seen_at: Utc::now(),
                });
            state.begin_session(candidate)
        };
        self.resolve(id, handle, cancel).await
    }

    /// Cancels the session in flight, if any. Its result is still applied
    /// (as a `Cancelled` failure) once it has disconnected.
    pub async fn cancel_session(&self) -> bool {
        let state = self.state.lock().await;
        match &state.active {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Stops scanning, abandons any session and closes the sink.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock().await;
            state.abandon_session();
            if let Err(e) = state.scanner.stop().await {
                warn!("[DiscoveryService] Unable to stop scanning: {}", e);
            }
        }
        if let Some(sink) = self.sink.lock().await.take()
            && let Err(e) = sink.close().await
        {
            warn!("[DiscoveryService] Failed to close sink: {}", e);
        }
    }

    fn target(&self) -> GattTarget {
        GattTarget {
            service: self.config.target_service,
            characteristic: self.config.target_characteristic,
        }
    }

    async fn resolve(
        &self,
        id: u64,
        handle: CandidateHandle,
        cancel: CancellationToken,
    ) -> Result<Uuid, DiscoveryError> {
        let mut session = IdentitySession::new(self.radio.as_ref(), handle, self.target());
        let result = session
            .run(self.config.connection_timeout(), cancel)
            .await;
        self.finish_session(id, &result).await;
        result
    }

    async fn finish_session(&self, id: u64, result: &Result<Uuid, DiscoveryError>) {
        let mut state = self.state.lock().await;
        let Some(active) = state.active.take_if(|a| a.id == id) else {
            return;
        };
        if active.abandoned {
            debug!("[DiscoveryService] Session {} was abandoned, result dropped", id);
            return;
        }
        let candidate = active.candidate;
        let identity = match result {
            Ok(identity) => *identity,
            Err(e) => {
                info!(
                    "[DiscoveryService] Could not resolve {}: {}",
                    candidate.handle, e
                );
                return;
            }
        };
        if !state.toggle.is_enabled() {
            debug!("[DiscoveryService] Discovery disabled, not recording {}", identity);
            return;
        }
        info!(
            "[DiscoveryService] {} is {} ({})",
            candidate.handle,
            identity,
            describe_distance(candidate.distance())
        );
        state.sightings.remove(&candidate.handle);
        state.resolved.insert(candidate.handle.clone(), identity);
        let upsert = state.registry.upsert(
            identity,
            &candidate.advertised_name,
            candidate.rssi,
            candidate.estimated_distance,
            Utc::now(),
        );
        let found = (upsert == Upsert::Inserted)
            .then(|| state.registry.get(&identity).map(DeviceFound::from_device))
            .flatten();
        drop(state);
        if let Some(found) = found {
            self.notify(&found).await;
        }
    }

    async fn notify(&self, found: &DeviceFound) {
        let mut sink = self.sink.lock().await;
        if let Some(sink) = sink.as_mut()
            && let Err(e) = sink.device_found(found).await
        {
            warn!("[DiscoveryService] Failed to deliver device found: {}", e);
        }
    }
}
