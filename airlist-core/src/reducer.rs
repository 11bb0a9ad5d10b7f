use crate::cipher::classify;
use crate::traits::{RankedNetwork, ScanRecord};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Maps raw RSSI onto a fixed number of signal buckets.
///
/// Values at or below `min_rssi` land in bucket 0, values at or above
/// `max_rssi` in the top bucket, everything in between linearly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SignalScale {
    pub levels: u8,
    pub min_rssi: i32,
    pub max_rssi: i32,
}

impl Default for SignalScale {
    fn default() -> Self {
        Self {
            levels: 5,
            min_rssi: -100,
            max_rssi: -55,
        }
    }
}

impl SignalScale {
    pub fn level(&self, rssi: i32) -> u8 {
        let top = self.levels.saturating_sub(1);
        if rssi <= self.min_rssi {
            0
        } else if rssi >= self.max_rssi {
            top
        } else {
            let input_range = i64::from(self.max_rssi) - i64::from(self.min_rssi);
            let offset = i64::from(rssi) - i64::from(self.min_rssi);
            (offset * i64::from(top) / input_range) as u8
        }
    }
}

/// Deduplicates and ranks one scan batch using `scale` as the level function.
pub fn reduce(records: &[ScanRecord], scale: &SignalScale) -> Vec<RankedNetwork> {
    reduce_with(records, |rssi| scale.level(rssi))
}

/// Same as [`reduce`] with an arbitrary level function.
///
/// Records with an empty ssid are dropped. Per `(ssid, capabilities)` the
/// record with the highest level survives; on a tie the first one seen is
/// kept. Output is ordered by level descending, then ssid ascending ignoring
/// case. The sort is stable.
pub fn reduce_with<F>(records: &[ScanRecord], level: F) -> Vec<RankedNetwork>
where
    F: Fn(i32) -> u8,
{
    let mut kept: Vec<RankedNetwork> = Vec::new();
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();

    for record in records.iter().filter(|r| !r.ssid.is_empty()) {
        let candidate_level = level(record.rssi);
        let key = (record.ssid.as_str(), record.capabilities.as_str());
        match index.get(&key) {
            Some(&pos) => {
                if candidate_level > kept[pos].signal_level {
                    kept[pos] = rank(record, candidate_level);
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(rank(record, candidate_level));
            }
        }
    }

    kept.sort_by(compare);
    kept
}

fn rank(record: &ScanRecord, signal_level: u8) -> RankedNetwork {
    RankedNetwork {
        ssid: record.ssid.clone(),
        cipher: classify(&record.capabilities),
        signal_level,
        rssi: record.rssi,
        bssid: record.bssid.clone(),
        capabilities: record.capabilities.clone(),
    }
}

fn compare(a: &RankedNetwork, b: &RankedNetwork) -> Ordering {
    b.signal_level
        .cmp(&a.signal_level)
        .then_with(|| cmp_ignore_case(&a.ssid, &b.ssid))
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}
