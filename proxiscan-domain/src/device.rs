use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::advertisement::{Advertisement, CandidateHandle};
use crate::distance::{Calibration, known};

/// A peripheral whose identity has been read over GATT.
#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct DiscoveredDevice {
    pub identity: Uuid,
    pub advertised_name: String,
    pub rssi: i16,
    pub estimated_distance: f64,
    pub last_seen_at: DateTime<Utc>,
}

impl DiscoveredDevice {
    #[must_use]
    pub fn new(
        identity: Uuid,
        advertised_name: String,
        rssi: i16,
        estimated_distance: f64,
        last_seen_at: DateTime<Utc>,
    ) -> DiscoveredDevice {
        DiscoveredDevice {
            identity,
            advertised_name,
            rssi,
            estimated_distance,
            last_seen_at,
        }
    }

    /// Never moves `last_seen_at` backwards.
    pub fn refresh(&mut self, rssi: i16, estimated_distance: f64, seen_at: DateTime<Utc>) {
        self.rssi = rssi;
        self.estimated_distance = estimated_distance;
        self.last_seen_at = self.last_seen_at.max(seen_at);
    }

    #[must_use]
    pub fn distance(&self) -> Option<f64> {
        known(self.estimated_distance)
    }

    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, staleness_window: chrono::Duration) -> bool {
        now - self.last_seen_at < staleness_window
    }
}

/// A matching peripheral awaiting, or undergoing, identity resolution.
#[derive(PartialEq, Debug, Clone)]
pub struct PendingCandidate {
    pub handle: CandidateHandle,
    pub advertised_name: String,
    pub rssi: i16,
    pub estimated_distance: f64,
    pub seen_at: DateTime<Utc>,
}

impl PendingCandidate {
    #[must_use]
    pub fn from_advertisement(
        advertisement: &Advertisement,
        calibration: &Calibration,
    ) -> PendingCandidate {
        PendingCandidate {
            handle: advertisement.handle.clone(),
            advertised_name: advertisement.label(),
            rssi: advertisement.rssi,
            estimated_distance: calibration.estimate(advertisement.rssi),
            seen_at: advertisement.date_time,
        }
    }

    pub fn update(&mut self, advertisement: &Advertisement, calibration: &Calibration) {
        self.rssi = advertisement.rssi;
        self.estimated_distance = calibration.estimate(advertisement.rssi);
        self.seen_at = self.seen_at.max(advertisement.date_time);
    }

    #[must_use]
    pub fn distance(&self) -> Option<f64> {
        known(self.estimated_distance)
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use crate::advertisement::{Advertisement, CandidateHandle};
    use crate::distance::Calibration;

    use super::{DiscoveredDevice, PendingCandidate};

    #[test]
    fn refresh_keeps_latest_timestamp() {
        let later = Utc.timestamp_opt(10, 0).unwrap();
        let earlier = Utc.timestamp_opt(5, 0).unwrap();
        let mut device =
            DiscoveredDevice::new(Uuid::from_u128(1), "rpi-camera".to_string(), -60, 1.0, later);
        device.refresh(-50, 0.5, earlier);
        assert_eq!(device.last_seen_at, later);
        assert_eq!(device.rssi, -50);
        assert_eq!(device.estimated_distance, 0.5);
    }

    #[test]
    fn freshness_is_strict() {
        let seen = Utc.timestamp_opt(0, 0).unwrap();
        let device =
            DiscoveredDevice::new(Uuid::from_u128(1), "rpi-camera".to_string(), -60, 1.0, seen);
        assert!(device.is_fresh(Utc.timestamp_opt(4, 0).unwrap(), Duration::seconds(5)));
        assert!(!device.is_fresh(Utc.timestamp_opt(5, 0).unwrap(), Duration::seconds(5)));
    }

    #[test]
    fn candidate_tracks_latest_advertisement() {
        let calibration = Calibration::default();
        let first = Advertisement::new(
            Utc.timestamp_opt(1, 0).unwrap(),
            CandidateHandle::new("a"),
            Some("rpi-camera".to_string()),
            vec![],
            -80,
        );
        let mut candidate = PendingCandidate::from_advertisement(&first, &calibration);
        let second = Advertisement {
            rssi: -59,
            date_time: Utc.timestamp_opt(2, 0).unwrap(),
            ..first
        };
        candidate.update(&second, &calibration);
        assert_eq!(candidate.rssi, -59);
        assert_eq!(candidate.distance(), Some(1.0));
        assert_eq!(candidate.seen_at, second.date_time);
    }
}
