use crate::clock::Clock;
use crate::counts::{CountRecord, CountUpdate, DeviceSelector, Occupancy, OccupancyUpdate};
use crate::day_window::day_window;
use crate::error::{DomainError, DomainResult};
use crate::liveness::LivenessTracker;
use crate::repository::{CountRecordRepository, OccupancyPublisher};
use crate::validate;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct OccupancyConfig {
    /// Daily reset hour pair delimiting the "today" accounting window.
    pub daily_reset_hours: (u32, u32),
    /// Device id stamped on corrective records.
    pub reset_record_name: String,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            daily_reset_hours: (0, 0),
            reset_record_name: "reset".to_string(),
        }
    }
}

/// Manual occupancy correction.
#[derive(Debug, Clone)]
pub struct ResetRequest {
    /// Zero out the current estimate instead of applying explicit values.
    pub full: bool,
    pub time: DateTime<Utc>,
    pub entered: i64,
    pub exited: i64,
}

/// Aggregates raw device batches into persisted counting buckets and keeps
/// the occupancy subscribers current.
pub struct OccupancyService {
    counts: Arc<dyn CountRecordRepository>,
    liveness: Arc<LivenessTracker>,
    updates: Arc<dyn OccupancyPublisher>,
    clock: Arc<dyn Clock>,
    config: OccupancyConfig,
}

impl OccupancyService {
    pub fn new(
        counts: Arc<dyn CountRecordRepository>,
        liveness: Arc<LivenessTracker>,
        updates: Arc<dyn OccupancyPublisher>,
        clock: Arc<dyn Clock>,
        config: OccupancyConfig,
    ) -> Self {
        Self {
            counts,
            liveness,
            updates,
            clock,
            config,
        }
    }

    /// Ingests one device batch: bucket, persist in a single call, mark the
    /// device seen, broadcast the new estimate. A persistence failure
    /// surfaces to the caller before liveness is touched.
    #[instrument(skip(self, update), fields(device_id = %update.device_id))]
    pub async fn record_update(&self, update: CountUpdate) -> DomainResult<()> {
        validate::validate_struct(&update)?;

        let records = update.bucket_records();
        debug!(
            entrances = update.entrances.len(),
            exits = update.exits.len(),
            buckets = records.len(),
            "recording count update"
        );
        if !records.is_empty() {
            self.counts.insert_records(records).await?;
        }

        self.liveness.seen(&update.device_id).await;
        self.broadcast_now().await
    }

    /// Occupancy accumulated inside the current "today" window.
    pub async fn occupancy_now(&self, selector: DeviceSelector) -> DomainResult<Occupancy> {
        self.occupancy_at(selector, self.clock.now()).await
    }

    /// Same as [`OccupancyService::occupancy_now`] with an explicit "now",
    /// used by the reports to look back at past reset boundaries.
    pub async fn occupancy_at(
        &self,
        selector: DeviceSelector,
        now: DateTime<Utc>,
    ) -> DomainResult<Occupancy> {
        let (from, to) = day_window(self.config.daily_reset_hours, now);
        let totals = self.counts.sum_in_range(selector, from, to, false).await?;
        let (entered, exited) = totals
            .first()
            .map(|row| (row.entered, row.exited))
            .unwrap_or((0, 0));
        Ok(Occupancy { entered, exited })
    }

    /// Inserts a corrective record and re-broadcasts. A full reset negates
    /// the current fleet estimate; otherwise the caller supplies the
    /// correction. A correction of zero in both directions is rejected.
    #[instrument(skip(self, request), fields(full = request.full))]
    pub async fn reset(&self, request: ResetRequest) -> DomainResult<()> {
        let now = self.clock.now();
        let (time, entered, exited) = if request.full {
            let current = self.occupancy_at(DeviceSelector::All, now).await?;
            (now, -current.entered, -current.exited)
        } else {
            (request.time, request.entered, request.exited)
        };

        if entered == 0 && exited == 0 {
            return Err(DomainError::NothingToReset { entered, exited });
        }

        let record = CountRecord {
            timestamp: time.timestamp(),
            device_id: self.config.reset_record_name.clone(),
            entered,
            exited,
        };
        self.counts.insert_records(vec![record]).await?;
        self.broadcast_now().await
    }

    /// Publishes the current fleet estimate with the degraded flag.
    pub async fn broadcast_now(&self) -> DomainResult<()> {
        let occupancy = self.occupancy_now(DeviceSelector::All).await?;
        let degraded = self.liveness.any_expected_missing().await;
        let update = OccupancyUpdate {
            tot: occupancy.total(),
            entered: occupancy.entered,
            exited: occupancy.exited,
            error: degraded,
        };
        self.updates.publish(&update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::frame_store::FrameStore;
    use crate::in_memory_stores::InMemoryCountStore;
    use crate::liveness::LivenessConfig;
    use crate::mail::{AlertMailer, MockMailDispatcher};
    use crate::repository::{
        MockCountRecordRepository, MockNoticePublisher, MockOccupancyPublisher,
        MockStatusLogRepository,
    };
    use chrono::TimeZone;

    fn clock_at_noon() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap(),
        ))
    }

    fn quiet_tracker(clock: Arc<ManualClock>, expected: &[&str]) -> Arc<LivenessTracker> {
        let mut notices = MockNoticePublisher::new();
        notices.expect_publish().returning(|_, _| Ok(()));
        let mut status_log = MockStatusLogRepository::new();
        status_log.expect_append().returning(|_| Ok(()));
        let mut dispatcher = MockMailDispatcher::new();
        dispatcher.expect_send().returning(|_, _, _, _| Ok(()));
        Arc::new(LivenessTracker::new(
            LivenessConfig {
                alive_timeout_secs: 10,
                expected_devices: expected.iter().map(|s| s.to_string()).collect(),
            },
            Arc::new(FrameStore::new(clock.clone())),
            Arc::new(status_log),
            Arc::new(notices),
            Arc::new(AlertMailer::new(Arc::new(dispatcher), vec![], vec![])),
            clock,
        ))
    }

    fn service(
        counts: Arc<dyn CountRecordRepository>,
        updates: MockOccupancyPublisher,
        clock: Arc<ManualClock>,
        expected: &[&str],
    ) -> OccupancyService {
        OccupancyService::new(
            counts,
            quiet_tracker(clock.clone(), expected),
            Arc::new(updates),
            clock,
            OccupancyConfig::default(),
        )
    }

    fn epoch(clock: &ManualClock) -> i64 {
        clock.now().timestamp()
    }

    #[tokio::test]
    async fn record_update_buckets_persists_and_broadcasts() {
        let clock = clock_at_noon();
        let store = Arc::new(InMemoryCountStore::new());
        let mut updates = MockOccupancyPublisher::new();
        updates
            .expect_publish()
            .withf(|update| update.tot == 5 && update.entered == 5 && !update.error)
            .times(1)
            .returning(|_| Ok(()));

        let service = service(store.clone(), updates, clock.clone(), &[]);
        let ts = epoch(&clock);
        service
            .record_update(CountUpdate {
                device_id: "gate-a".to_string(),
                entrances: vec![(2, ts), (3, ts)],
                exits: vec![],
            })
            .await
            .expect("recorded");

        let events = store
            .events_in_range(
                DeviceSelector::All,
                clock.now() - chrono::Duration::hours(1),
                clock.now(),
            )
            .await
            .expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entered, 5);
    }

    #[tokio::test]
    async fn occupancy_now_aggregates_todays_records() {
        let clock = clock_at_noon();
        let store = Arc::new(InMemoryCountStore::new());
        let ts = epoch(&clock);
        store
            .insert_records(vec![
                CountRecord {
                    timestamp: ts,
                    device_id: "gate-a".to_string(),
                    entered: 3,
                    exited: 1,
                },
                CountRecord {
                    timestamp: ts,
                    device_id: "gate-b".to_string(),
                    entered: 2,
                    exited: 0,
                },
            ])
            .await
            .expect("seeded");

        let mut updates = MockOccupancyPublisher::new();
        updates.expect_publish().returning(|_| Ok(()));
        let service = service(store, updates, clock, &[]);

        let occupancy = service
            .occupancy_now(DeviceSelector::All)
            .await
            .expect("computed");
        assert_eq!(occupancy.entered, 5);
        assert_eq!(occupancy.exited, 1);
        assert_eq!(occupancy.total(), 4);
    }

    #[tokio::test]
    async fn occupancy_now_can_scope_to_one_device() {
        let clock = clock_at_noon();
        let store = Arc::new(InMemoryCountStore::new());
        let ts = epoch(&clock);
        store
            .insert_records(vec![
                CountRecord {
                    timestamp: ts,
                    device_id: "gate-a".to_string(),
                    entered: 3,
                    exited: 1,
                },
                CountRecord {
                    timestamp: ts,
                    device_id: "gate-b".to_string(),
                    entered: 2,
                    exited: 0,
                },
            ])
            .await
            .expect("seeded");

        let mut updates = MockOccupancyPublisher::new();
        updates.expect_publish().returning(|_| Ok(()));
        let service = service(store, updates, clock, &[]);

        let occupancy = service
            .occupancy_now(DeviceSelector::Device("gate-b".to_string()))
            .await
            .expect("computed");
        assert_eq!(occupancy.entered, 2);
        assert_eq!(occupancy.total(), 2);
    }

    #[tokio::test]
    async fn full_reset_zeroes_the_estimate() {
        let clock = clock_at_noon();
        let store = Arc::new(InMemoryCountStore::new());
        let ts = epoch(&clock);
        store
            .insert_records(vec![CountRecord {
                timestamp: ts,
                device_id: "gate-a".to_string(),
                entered: 5,
                exited: 1,
            }])
            .await
            .expect("seeded");

        let mut updates = MockOccupancyPublisher::new();
        updates
            .expect_publish()
            .withf(|update| update.tot == 0 && update.entered == 0 && update.exited == 0)
            .times(1)
            .returning(|_| Ok(()));
        let service = service(store.clone(), updates, clock.clone(), &[]);

        service
            .reset(ResetRequest {
                full: true,
                time: clock.now(),
                entered: 0,
                exited: 0,
            })
            .await
            .expect("reset");

        let occupancy = service
            .occupancy_now(DeviceSelector::All)
            .await
            .expect("computed");
        assert_eq!(occupancy, Occupancy::default());
    }

    #[tokio::test]
    async fn zero_reset_is_rejected() {
        let clock = clock_at_noon();
        let mut updates = MockOccupancyPublisher::new();
        updates.expect_publish().times(0);
        let service = service(
            Arc::new(InMemoryCountStore::new()),
            updates,
            clock.clone(),
            &[],
        );

        let result = service
            .reset(ResetRequest {
                full: false,
                time: clock.now(),
                entered: 0,
                exited: 0,
            })
            .await;
        assert!(matches!(result, Err(DomainError::NothingToReset { .. })));
    }

    #[tokio::test]
    async fn degraded_flag_is_carried_on_broadcasts() {
        let clock = clock_at_noon();
        let mut updates = MockOccupancyPublisher::new();
        updates
            .expect_publish()
            .withf(|update| update.error)
            .times(1)
            .returning(|_| Ok(()));
        let service = service(
            Arc::new(InMemoryCountStore::new()),
            updates,
            clock.clone(),
            &["gate-a", "gate-b"],
        );

        let ts = epoch(&clock);
        service
            .record_update(CountUpdate {
                device_id: "gate-a".to_string(),
                entrances: vec![(1, ts)],
                exits: vec![],
            })
            .await
            .expect("recorded");
    }

    #[tokio::test]
    async fn persistence_failure_leaves_liveness_untouched() {
        let clock = clock_at_noon();
        let mut counts = MockCountRecordRepository::new();
        counts
            .expect_insert_records()
            .times(1)
            .returning(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("store down"))));
        let mut updates = MockOccupancyPublisher::new();
        updates.expect_publish().times(0);

        let tracker = quiet_tracker(clock.clone(), &[]);
        let service = OccupancyService::new(
            Arc::new(counts),
            tracker.clone(),
            Arc::new(updates),
            clock.clone(),
            OccupancyConfig::default(),
        );

        let result = service
            .record_update(CountUpdate {
                device_id: "gate-a".to_string(),
                entrances: vec![(1, epoch(&clock))],
                exits: vec![],
            })
            .await;

        assert!(result.is_err());
        assert!(tracker.online_devices().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_update_is_rejected_before_any_side_effect() {
        let clock = clock_at_noon();
        let mut counts = MockCountRecordRepository::new();
        counts.expect_insert_records().times(0);
        let mut updates = MockOccupancyPublisher::new();
        updates.expect_publish().times(0);

        let tracker = quiet_tracker(clock.clone(), &[]);
        let service = OccupancyService::new(
            Arc::new(counts),
            tracker.clone(),
            Arc::new(updates),
            clock,
            OccupancyConfig::default(),
        );

        let result = service
            .record_update(CountUpdate {
                device_id: String::new(),
                entrances: vec![],
                exits: vec![],
            })
            .await;

        assert!(matches!(result, Err(DomainError::ValidationError(_))));
        assert!(tracker.online_devices().await.is_empty());
    }
}
