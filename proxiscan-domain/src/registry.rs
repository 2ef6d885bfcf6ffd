use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::device::DiscoveredDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Refreshed,
}

/// Last known sighting of every resolved identity.
///
/// Stale entries are kept and only filtered out at query time; `clear` is the
/// only way anything is removed.
#[derive(Default, Debug)]
pub struct Registry {
    devices: HashMap<Uuid, DiscoveredDevice>,
}

impl Registry {
    pub fn upsert(
        &mut self,
        identity: Uuid,
        advertised_name: &str,
        rssi: i16,
        estimated_distance: f64,
        now: DateTime<Utc>,
    ) -> Upsert {
        match self.devices.get_mut(&identity) {
            Some(device) => {
                device.refresh(rssi, estimated_distance, now);
                Upsert::Refreshed
            }
            None => {
                self.devices.insert(
                    identity,
                    DiscoveredDevice::new(
                        identity,
                        advertised_name.to_string(),
                        rssi,
                        estimated_distance,
                        now,
                    ),
                );
                Upsert::Inserted
            }
        }
    }

    /// Closest entry seen within `staleness_window` of `now`. Entries whose
    /// distance is unknown rank behind every known distance.
    #[must_use]
    pub fn nearest(
        &self,
        now: DateTime<Utc>,
        staleness_window: Duration,
    ) -> Option<DiscoveredDevice> {
        self.devices
            .values()
            .filter(|d| d.is_fresh(now, staleness_window))
            .min_by(|a, b| by_distance(a, b))
            .cloned()
    }

    /// All fresh entries, closest first.
    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>, staleness_window: Duration) -> Vec<DiscoveredDevice> {
        let mut fresh: Vec<DiscoveredDevice> = self
            .devices
            .values()
            .filter(|d| d.is_fresh(now, staleness_window))
            .cloned()
            .collect();
        fresh.sort_by(by_distance);
        fresh
    }

    #[must_use]
    pub fn get(&self, identity: &Uuid) -> Option<&DiscoveredDevice> {
        self.devices.get(identity)
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    /// Stored entries, stale ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

fn by_distance(a: &DiscoveredDevice, b: &DiscoveredDevice) -> Ordering {
    match (a.distance(), b.distance()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use crate::distance::UNKNOWN_DISTANCE;

    use super::{Registry, Upsert};

    const A: Uuid = Uuid::from_u128(0xa);
    const B: Uuid = Uuid::from_u128(0xb);

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn empty_registry_has_no_nearest() {
        let registry = Registry::default();
        assert_eq!(registry.nearest(at(0), Duration::seconds(5)), None);
    }

    #[test]
    fn nearest_picks_smallest_distance() {
        let mut registry = Registry::default();
        registry.upsert(A, "rpi-camera", -70, 3.0, at(0));
        registry.upsert(B, "rpi-camera", -60, 1.5, at(0));
        let nearest = registry.nearest(at(1), Duration::seconds(5)).unwrap();
        assert_eq!(nearest.identity, B);
    }

    #[test]
    fn all_stale_gives_none() {
        let mut registry = Registry::default();
        registry.upsert(A, "rpi-camera", -70, 3.0, at(0));
        registry.upsert(B, "rpi-camera", -60, 1.5, at(0));
        assert_eq!(registry.nearest(at(10), Duration::seconds(5)), None);
    }

    #[test]
    fn stale_entries_are_kept_but_skipped() {
        let mut registry = Registry::default();
        registry.upsert(A, "rpi-camera", -70, 3.0, at(8));
        registry.upsert(B, "rpi-camera", -60, 1.5, at(0));
        let nearest = registry.nearest(at(10), Duration::seconds(5)).unwrap();
        assert_eq!(nearest.identity, A);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn upsert_reports_insert_then_refresh() {
        let mut registry = Registry::default();
        assert_eq!(registry.upsert(A, "rpi-camera", -70, 3.0, at(0)), Upsert::Inserted);
        assert_eq!(registry.upsert(A, "rpi-camera", -65, 2.0, at(1)), Upsert::Refreshed);
        let device = registry.get(&A).unwrap();
        assert_eq!(device.rssi, -65);
        assert_eq!(device.last_seen_at, at(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn last_seen_never_goes_backwards() {
        let mut registry = Registry::default();
        registry.upsert(A, "rpi-camera", -70, 3.0, at(5));
        registry.upsert(A, "rpi-camera", -70, 3.0, at(2));
        assert_eq!(registry.get(&A).unwrap().last_seen_at, at(5));
    }

    #[test]
    fn unknown_distance_ranks_last() {
        let mut registry = Registry::default();
        registry.upsert(A, "rpi-camera", 0, UNKNOWN_DISTANCE, at(0));
        registry.upsert(B, "rpi-camera", -90, 40.0, at(0));
        assert_eq!(registry.nearest(at(0), Duration::seconds(5)).unwrap().identity, B);
    }

    #[test]
    fn snapshot_orders_fresh_entries() {
        let mut registry = Registry::default();
        registry.upsert(A, "rpi-camera", -70, 3.0, at(0));
        registry.upsert(B, "rpi-camera", -60, 1.5, at(0));
        registry.upsert(Uuid::from_u128(0xc), "rpi-camera", -50, 0.5, at(-20));
        let ids: Vec<Uuid> = registry
            .snapshot(at(1), Duration::seconds(5))
            .into_iter()
            .map(|d| d.identity)
            .collect();
        assert_eq!(ids, vec![B, A]);
    }

    #[test]
    fn clear_empties() {
        let mut registry = Registry::default();
        registry.upsert(A, "rpi-camera", -70, 3.0, at(0));
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.nearest(at(0), Duration::seconds(5)), None);
    }
}
