use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use proxiscan_domain::advertisement::Advertisement;

use crate::{RadioAdapter, RadioError, RadioState};

/// Which advertisements are passed downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvertisementFilter {
    pub name: String,
    pub service: Uuid,
}

impl AdvertisementFilter {
    #[must_use]
    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        advertisement.is_target(&self.name, self.service)
    }
}

/// Tracks radio power and whether a scan is running. Starting and stopping
/// are idempotent.
pub struct RadioScanner {
    radio: Arc<dyn RadioAdapter>,
    filter: AdvertisementFilter,
    state: RadioState,
    scanning: bool,
}

impl RadioScanner {
    pub fn new(radio: Arc<dyn RadioAdapter>, filter: AdvertisementFilter) -> Self {
        Self {
            radio,
            filter,
            state: RadioState::Unknown,
            scanning: false,
        }
    }

    #[must_use]
    pub fn radio_state(&self) -> RadioState {
        self.state
    }

    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    #[must_use]
    pub fn filter(&self) -> &AdvertisementFilter {
        &self.filter
    }

    /// No-op unless powered on and idle. A refusal that stands for a lasting
    /// condition, such as denied permission, becomes the radio state.
    pub async fn start(&mut self) -> Result<(), RadioError> {
        if self.scanning {
            debug!("[RadioScanner] Already scanning");
            return Ok(());
        }
        if self.state != RadioState::PoweredOn {
            debug!("[RadioScanner] Radio is {}, not scanning", self.state);
            return Ok(());
        }
        if let Err(e) = self.radio.start_scan().await {
            if let Some(state) = e.radio_state() {
                warn!("[RadioScanner] Scan refused, Bluetooth is {}", state);
                self.state = state;
            }
            return Err(e);
        }
        self.scanning = true;
        info!("[RadioScanner] Scanning for {}", self.filter.name);
        Ok(())
    }

    /// No-op unless scanning. The scan is considered stopped even if the
    /// radio reports an error.
    pub async fn stop(&mut self) -> Result<(), RadioError> {
        if !self.scanning {
            return Ok(());
        }
        self.scanning = false;
        info!("[RadioScanner] Stopping scan");
        self.radio.stop_scan().await
    }

    /// Applies a power state report. Scanning resumes on power-on only when
    /// `enabled`.
    pub async fn on_state_changed(&mut self, state: RadioState, enabled: bool) {
        if state == self.state {
            return;
        }
        info!("[RadioScanner] Bluetooth is {}", state);
        self.state = state;
        let result = if state == RadioState::PoweredOn {
            if enabled { self.start().await } else { Ok(()) }
        } else {
            self.stop().await
        };
        if let Err(e) = result {
            warn!("[RadioScanner] Radio refused scan change while {}: {}", state, e);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use uuid::Uuid;

    use crate::RadioState;
    use crate::memory::{MemoryRadio, RadioCall};

    use super::{AdvertisementFilter, RadioScanner};

    fn scanner() -> (Arc<MemoryRadio>, RadioScanner) {
        let radio = Arc::new(MemoryRadio::new());
        let filter = AdvertisementFilter {
            name: "rpi-camera".to_string(),
            service: Uuid::from_u128(1),
        };
        (radio.clone(), RadioScanner::new(radio, filter))
    }

    #[tokio::test]
    async fn does_not_scan_until_powered_on() {
        let (radio, mut scanner) = scanner();
        scanner.start().await.unwrap();
        assert!(!scanner.is_scanning());
        assert_eq!(radio.count(|c| *c == RadioCall::StartScan), 0);
    }

    #[tokio::test]
    async fn power_on_starts_when_enabled() {
        let (radio, mut scanner) = scanner();
        scanner.on_state_changed(RadioState::PoweredOn, true).await;
        assert!(scanner.is_scanning());
        assert_eq!(radio.count(|c| *c == RadioCall::StartScan), 1);
    }

    #[tokio::test]
    async fn power_on_waits_when_disabled() {
        let (radio, mut scanner) = scanner();
        scanner.on_state_changed(RadioState::PoweredOn, false).await;
        assert!(!scanner.is_scanning());
        assert_eq!(radio.calls(), vec![]);
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let (radio, mut scanner) = scanner();
        scanner.on_state_changed(RadioState::PoweredOn, false).await;
        scanner.start().await.unwrap();
        scanner.start().await.unwrap();
        scanner.stop().await.unwrap();
        scanner.stop().await.unwrap();
        assert_eq!(radio.calls(), vec![RadioCall::StartScan, RadioCall::StopScan]);
    }

    #[tokio::test]
    async fn power_off_stops() {
        let (_radio, mut scanner) = scanner();
        scanner.on_state_changed(RadioState::PoweredOn, true).await;
        scanner.on_state_changed(RadioState::PoweredOff, true).await;
        assert!(!scanner.is_scanning());
        assert_eq!(scanner.radio_state(), RadioState::PoweredOff);
    }

    #[tokio::test]
    async fn denied_permission_becomes_unauthorized() {
        let (radio, mut scanner) = scanner();
        radio.deny_scan_permission();
        scanner.on_state_changed(RadioState::PoweredOn, true).await;
        assert_eq!(scanner.radio_state(), RadioState::Unauthorized);
        assert!(!scanner.is_scanning());

        assert!(scanner.start().await.is_ok());
        assert_eq!(radio.count(|c| *c == RadioCall::StartScan), 1);
    }

    #[tokio::test]
    async fn unauthorized_never_scans() {
        let (radio, mut scanner) = scanner();
        scanner.on_state_changed(RadioState::Unauthorized, true).await;
        scanner.start().await.unwrap();
        assert!(!scanner.is_scanning());
        assert_eq!(scanner.radio_state(), RadioState::Unauthorized);
        assert_eq!(radio.calls(), vec![]);
    }
}
