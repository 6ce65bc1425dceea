//! In-memory implementations of the storage traits. Default backing for
//! the collector binary and substrate for the integration tests.

use crate::counts::{CountRecord, DeviceSelector, DeviceTotals};
use crate::error::DomainResult;
use crate::repository::{
    CloseCalendarRepository, CountRecordRepository, MismatchRepository, StatusLogRepository,
};
use crate::status::{MismatchRecord, StatusLogRecord};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

const AGGREGATE_ROW: &str = "aggregate";

pub struct InMemoryCountStore {
    records: RwLock<Vec<CountRecord>>,
}

impl InMemoryCountStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryCountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CountRecordRepository for InMemoryCountStore {
    async fn insert_records(&self, records: Vec<CountRecord>) -> DomainResult<()> {
        self.records.write().await.extend(records);
        Ok(())
    }

    async fn sum_in_range(
        &self,
        selector: DeviceSelector,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        per_device: bool,
    ) -> DomainResult<Vec<DeviceTotals>> {
        let (from_ts, to_ts) = (from.timestamp(), to.timestamp());
        let records = self.records.read().await;
        let in_range = records.iter().filter(|record| {
            record.timestamp >= from_ts
                && record.timestamp <= to_ts
                && selector.matches(&record.device_id)
        });

        if per_device {
            let mut by_device: BTreeMap<String, (i64, i64)> = BTreeMap::new();
            for record in in_range {
                let entry = by_device.entry(record.device_id.clone()).or_default();
                entry.0 += record.entered;
                entry.1 += record.exited;
            }
            Ok(by_device
                .into_iter()
                .map(|(device_id, (entered, exited))| DeviceTotals {
                    device_id,
                    entered,
                    exited,
                })
                .collect())
        } else {
            let (mut entered, mut exited) = (0, 0);
            for record in in_range {
                entered += record.entered;
                exited += record.exited;
            }
            Ok(vec![DeviceTotals {
                device_id: AGGREGATE_ROW.to_string(),
                entered,
                exited,
            }])
        }
    }

    async fn events_in_range(
        &self,
        selector: DeviceSelector,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DomainResult<Vec<CountRecord>> {
        let (from_ts, to_ts) = (from.timestamp(), to.timestamp());
        let records = self.records.read().await;
        let mut buckets: BTreeMap<(i64, String), (i64, i64)> = BTreeMap::new();
        for record in records.iter().filter(|record| {
            record.timestamp >= from_ts
                && record.timestamp <= to_ts
                && selector.matches(&record.device_id)
        }) {
            let entry = buckets
                .entry((record.timestamp, record.device_id.clone()))
                .or_default();
            entry.0 += record.entered;
            entry.1 += record.exited;
        }
        Ok(buckets
            .into_iter()
            .map(|((timestamp, device_id), (entered, exited))| CountRecord {
                timestamp,
                device_id,
                entered,
                exited,
            })
            .collect())
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let cutoff_ts = cutoff.timestamp();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| record.timestamp >= cutoff_ts);
        Ok((before - records.len()) as u64)
    }
}

pub struct InMemoryStatusLog {
    records: RwLock<Vec<StatusLogRecord>>,
}

impl InMemoryStatusLog {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn records(&self) -> Vec<StatusLogRecord> {
        self.records.read().await.clone()
    }
}

impl Default for InMemoryStatusLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusLogRepository for InMemoryStatusLog {
    async fn append(&self, record: StatusLogRecord) -> DomainResult<()> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let cutoff_ts = cutoff.timestamp();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| record.timestamp >= cutoff_ts);
        Ok((before - records.len()) as u64)
    }
}

pub struct InMemoryMismatchStore {
    records: RwLock<Vec<MismatchRecord>>,
}

impl InMemoryMismatchStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryMismatchStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MismatchRepository for InMemoryMismatchStore {
    async fn insert(&self, record: MismatchRecord) -> DomainResult<()> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let cutoff_ts = cutoff.timestamp();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| record.timestamp >= cutoff_ts);
        Ok((before - records.len()) as u64)
    }
}

pub struct InMemoryCloseCalendar {
    days: RwLock<HashSet<NaiveDate>>,
}

impl InMemoryCloseCalendar {
    pub fn new() -> Self {
        Self {
            days: RwLock::new(HashSet::new()),
        }
    }

    pub async fn add_closed_date(&self, day: NaiveDate) {
        self.days.write().await.insert(day);
    }

    pub async fn remove_closed_date(&self, day: NaiveDate) {
        self.days.write().await.remove(&day);
    }
}

impl Default for InMemoryCloseCalendar {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloseCalendarRepository for InMemoryCloseCalendar {
    async fn closed_dates_in_range(
        &self,
        from: NaiveDate,
        days: i64,
    ) -> DomainResult<HashSet<NaiveDate>> {
        let until = from + chrono::Duration::days(days);
        Ok(self
            .days
            .read()
            .await
            .iter()
            .filter(|day| **day >= from && **day <= until)
            .copied()
            .collect())
    }
}
