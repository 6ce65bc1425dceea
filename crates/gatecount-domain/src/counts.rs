use garde::Validate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Count-update batch as reported by a monitor unit.
///
/// `entrances` and `exits` are `(count, epoch_seconds)` pairs; a missing
/// field is a deserialization error at the boundary, before any state is
/// touched.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CountUpdate {
    #[garde(length(min = 1))]
    pub device_id: String,
    #[garde(skip)]
    pub entrances: Vec<(i64, i64)>,
    #[garde(skip)]
    pub exits: Vec<(i64, i64)>,
}

/// One persisted counting bucket: all events of a batch sharing an exact
/// timestamp collapse into a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountRecord {
    pub timestamp: i64,
    pub device_id: String,
    pub entered: i64,
    pub exited: i64,
}

impl CountUpdate {
    /// Buckets the batch into one [`CountRecord`] per distinct event
    /// timestamp, summing counts per direction. Output is ordered by
    /// timestamp.
    pub fn bucket_records(&self) -> Vec<CountRecord> {
        let mut buckets: BTreeMap<i64, (i64, i64)> = BTreeMap::new();
        for (count, timestamp) in &self.entrances {
            buckets.entry(*timestamp).or_default().0 += count;
        }
        for (count, timestamp) in &self.exits {
            buckets.entry(*timestamp).or_default().1 += count;
        }
        buckets
            .into_iter()
            .map(|(timestamp, (entered, exited))| CountRecord {
                timestamp,
                device_id: self.device_id.clone(),
                entered,
                exited,
            })
            .collect()
    }
}

/// Query scope for count aggregations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    All,
    Device(String),
}

impl DeviceSelector {
    pub fn matches(&self, device_id: &str) -> bool {
        match self {
            DeviceSelector::All => true,
            DeviceSelector::Device(id) => id == device_id,
        }
    }
}

/// Aggregated entered/exited counts for one device (or the fleet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTotals {
    pub device_id: String,
    pub entered: i64,
    pub exited: i64,
}

/// Occupancy estimate inside a time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Occupancy {
    pub entered: i64,
    pub exited: i64,
}

impl Occupancy {
    pub fn total(&self) -> i64 {
        self.entered - self.exited
    }
}

/// Wire payload pushed to occupancy subscribers on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyUpdate {
    pub tot: i64,
    #[serde(rename = "in")]
    pub entered: i64,
    #[serde(rename = "out")]
    pub exited: i64,
    pub error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_merges_same_timestamp_entrances() {
        let update = CountUpdate {
            device_id: "gate-a".to_string(),
            entrances: vec![(2, 1000), (3, 1000)],
            exits: vec![],
        };

        let records = update.bucket_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entered, 5);
        assert_eq!(records[0].exited, 0);
        assert_eq!(records[0].timestamp, 1000);
    }

    #[test]
    fn bucket_joins_entrances_and_exits_sharing_a_timestamp() {
        let update = CountUpdate {
            device_id: "gate-a".to_string(),
            entrances: vec![(1, 1000), (1, 2000)],
            exits: vec![(2, 1000)],
        };

        let records = update.bucket_records();
        assert_eq!(
            records,
            vec![
                CountRecord {
                    timestamp: 1000,
                    device_id: "gate-a".to_string(),
                    entered: 1,
                    exited: 2,
                },
                CountRecord {
                    timestamp: 2000,
                    device_id: "gate-a".to_string(),
                    entered: 1,
                    exited: 0,
                },
            ]
        );
    }

    #[test]
    fn bucket_of_empty_batch_is_empty() {
        let update = CountUpdate {
            device_id: "gate-a".to_string(),
            entrances: vec![],
            exits: vec![],
        };
        assert!(update.bucket_records().is_empty());
    }

    #[test]
    fn update_deserializes_from_device_json() {
        let update: CountUpdate = serde_json::from_str(
            r#"{"device_id":"gate-a","entrances":[[1,1000],[2,1003]],"exits":[[1,1001]]}"#,
        )
        .expect("valid payload");
        assert_eq!(update.device_id, "gate-a");
        assert_eq!(update.entrances, vec![(1, 1000), (2, 1003)]);
        assert_eq!(update.exits, vec![(1, 1001)]);
    }

    #[test]
    fn update_without_exits_field_is_rejected() {
        let result: Result<CountUpdate, _> =
            serde_json::from_str(r#"{"device_id":"gate-a","entrances":[]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn occupancy_update_uses_wire_field_names() {
        let update = OccupancyUpdate {
            tot: 4,
            entered: 5,
            exited: 1,
            error: false,
        };
        let json = serde_json::to_string(&update).expect("serializable");
        assert_eq!(json, r#"{"tot":4,"in":5,"out":1,"error":false}"#);
    }
}
