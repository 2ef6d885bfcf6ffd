//! Bounded record of advertisements that did not match the target, kept for
//! debugging only.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::advertisement::Advertisement;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct IgnoredAdvertisement {
    /// Advertised name, or the handle for unnamed peripherals
    pub label: String,
    pub rssi: i16,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug)]
pub struct IgnoredAdvertisements {
    entries: HashMap<String, IgnoredAdvertisement>,
    capacity: usize,
}

impl IgnoredAdvertisements {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, advertisement: &Advertisement) {
        if self.capacity == 0 {
            return;
        }
        let label = advertisement.label();
        if let Some(entry) = self.entries.get_mut(&label) {
            entry.rssi = advertisement.rssi;
            entry.last_seen = entry.last_seen.max(advertisement.date_time);
            return;
        }
        if self.entries.len() >= self.capacity
            && let Some(oldest) = self
                .entries
                .values()
                .min_by_key(|e| e.last_seen)
                .map(|e| e.label.clone())
        {
            self.entries.remove(&oldest);
        }
        self.entries.insert(
            label.clone(),
            IgnoredAdvertisement {
                label,
                rssi: advertisement.rssi,
                last_seen: advertisement.date_time,
            },
        );
    }

    /// Most recently seen first.
    #[must_use]
    pub fn get_sorted(&self) -> Vec<IgnoredAdvertisement> {
        let mut entries: Vec<IgnoredAdvertisement> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Utc};

    use crate::advertisement::{Advertisement, CandidateHandle};

    use super::IgnoredAdvertisements;

    fn heard(name: &str, secs: i64) -> Advertisement {
        Advertisement::new(
            Utc.timestamp_opt(secs, 0).unwrap(),
            CandidateHandle::new(format!("h-{name}")),
            Some(name.to_string()),
            vec![],
            -70,
        )
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut ignored = IgnoredAdvertisements::new(2);
        ignored.record(&heard("tv", 1));
        ignored.record(&heard("watch", 2));
        ignored.record(&heard("phone", 3));
        let labels: Vec<String> = ignored.get_sorted().into_iter().map(|e| e.label).collect();
        assert_eq!(labels, vec!["phone".to_string(), "watch".to_string()]);
    }

    #[test]
    fn repeat_sighting_updates_in_place() {
        let mut ignored = IgnoredAdvertisements::new(2);
        ignored.record(&heard("tv", 1));
        ignored.record(&heard("watch", 2));
        ignored.record(&heard("tv", 3));
        ignored.record(&heard("phone", 4));
        let labels: Vec<String> = ignored.get_sorted().into_iter().map(|e| e.label).collect();
        assert_eq!(labels, vec!["phone".to_string(), "tv".to_string()]);
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let mut ignored = IgnoredAdvertisements::new(0);
        ignored.record(&heard("tv", 1));
        assert!(ignored.is_empty());
    }
}
