use crate::counts::{CountRecord, DeviceSelector, DeviceTotals, OccupancyUpdate};
use crate::error::DomainResult;
use crate::notice::{Notice, Role};
use crate::status::{MismatchRecord, StatusLogRecord};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;

/// Store for persisted counting buckets.
/// Infrastructure implements this trait; the in-memory implementation in
/// this crate is the default backing and the test substrate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CountRecordRepository: Send + Sync {
    /// Persist a batch of records in a single call; either the whole batch
    /// is committed or none of it.
    async fn insert_records(&self, records: Vec<CountRecord>) -> DomainResult<()>;

    /// Sum entered/exited counts for records with `from <= timestamp <= to`.
    /// With `per_device` the result carries one row per device; otherwise a
    /// single aggregate row.
    async fn sum_in_range(
        &self,
        selector: DeviceSelector,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        per_device: bool,
    ) -> DomainResult<Vec<DeviceTotals>>;

    /// Counting events inside the inclusive range, one row per
    /// `(timestamp, device)` bucket, ordered by timestamp.
    async fn events_in_range(
        &self,
        selector: DeviceSelector,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DomainResult<Vec<CountRecord>>;

    /// Delete records strictly older than `cutoff`; returns how many.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64>;
}

/// Append-only log of device lifecycle transitions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusLogRepository: Send + Sync {
    async fn append(&self, record: StatusLogRecord) -> DomainResult<()>;

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64>;
}

/// Store for daily mismatch residues.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MismatchRepository: Send + Sync {
    async fn insert(&self, record: MismatchRecord) -> DomainResult<()>;

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64>;
}

/// Externally managed closing-day calendar.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloseCalendarRepository: Send + Sync {
    /// All calendar closed dates in `[from, from + days]`.
    async fn closed_dates_in_range(
        &self,
        from: NaiveDate,
        days: i64,
    ) -> DomainResult<HashSet<NaiveDate>>;
}

/// Fan-out seam for role-tagged operator notices; implemented by the
/// notice hub in the network crate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NoticePublisher: Send + Sync {
    async fn publish(&self, role: Role, notice: &Notice) -> DomainResult<()>;
}

/// Fan-out seam for occupancy broadcasts; implemented by the update hub.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OccupancyPublisher: Send + Sync {
    async fn publish(&self, update: &OccupancyUpdate) -> DomainResult<()>;
}
