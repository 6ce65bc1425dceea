use crate::clock::Clock;
use crate::frame_store::FrameStore;
use crate::mail::AlertMailer;
use crate::notice::{Notice, NoticeKind, Role};
use crate::repository::{NoticePublisher, StatusLogRepository};
use crate::scheduler::{Recurrence, Scheduler};
use crate::status::{
    StatusLogRecord, STATUS_CONNECTED, STATUS_CONNECTION_LOST, STATUS_VIDEO_LOST,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// A unit with no heartbeat for longer than this is offline; also the
    /// sweep period and the stale-video threshold.
    pub alive_timeout_secs: u64,
    /// Units that are supposed to be reporting; any absentee flags the
    /// fleet as degraded.
    pub expected_devices: HashSet<String>,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            alive_timeout_secs: 10,
            expected_devices: HashSet::new(),
        }
    }
}

impl LivenessConfig {
    pub fn alive_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.alive_timeout_secs)
    }

    fn alive_timeout_chrono(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.alive_timeout_secs as i64)
    }
}

/// Tracks which monitor units are online. The map behind the lock is the
/// sole source of truth for online status; join/leave/rejoin notifications
/// for one device are ordered because every transition goes through it.
pub struct LivenessTracker {
    units: RwLock<HashMap<String, DateTime<Utc>>>,
    config: LivenessConfig,
    frames: Arc<FrameStore>,
    status_log: Arc<dyn StatusLogRepository>,
    notices: Arc<dyn NoticePublisher>,
    mailer: Arc<AlertMailer>,
    clock: Arc<dyn Clock>,
}

impl LivenessTracker {
    pub fn new(
        config: LivenessConfig,
        frames: Arc<FrameStore>,
        status_log: Arc<dyn StatusLogRepository>,
        notices: Arc<dyn NoticePublisher>,
        mailer: Arc<AlertMailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            units: RwLock::new(HashMap::new()),
            config,
            frames,
            status_log,
            notices,
            mailer,
            clock,
        }
    }

    /// Marks a heartbeat from `device_id`: first contact creates the unit
    /// and emits the join event, later contacts refresh the timestamp.
    /// Notification failures never roll back the transition.
    #[instrument(skip(self))]
    pub async fn seen(&self, device_id: &str) {
        let now = self.clock.now();
        let is_new = {
            let mut units = self.units.write().await;
            units.insert(device_id.to_string(), now).is_none()
        };
        if is_new {
            self.notify_join(device_id).await;
        }
    }

    /// Removes every unit whose heartbeat expired, then demotes stale
    /// video streamers.
    pub async fn sweep(&self) {
        let now = self.clock.now();
        let timeout = self.config.alive_timeout_chrono();

        let expired: Vec<String> = {
            let mut units = self.units.write().await;
            let expired: Vec<String> = units
                .iter()
                .filter(|(_, last_seen)| now - **last_seen > timeout)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &expired {
                units.remove(id);
            }
            expired
        };
        for device_id in &expired {
            self.notify_leave(device_id).await;
        }

        self.sweep_streamers(now, timeout).await;
    }

    /// Snapshot of currently online device ids.
    pub async fn online_devices(&self) -> HashSet<String> {
        self.units.read().await.keys().cloned().collect()
    }

    /// True when any expected device is absent from the online set.
    pub async fn any_expected_missing(&self) -> bool {
        let units = self.units.read().await;
        self.config
            .expected_devices
            .iter()
            .any(|expected| !units.contains_key(expected))
    }

    /// Sweep loop; runs until cancelled.
    pub async fn run(self: Arc<Self>, token: CancellationToken) -> Result<(), anyhow::Error> {
        let scheduler = Scheduler::new(self.clock.clone(), token);
        let tracker = self.clone();
        scheduler
            .schedule_recurring(Recurrence::Every(self.config.alive_timeout()), move || {
                let tracker = tracker.clone();
                async move {
                    tracker.sweep().await;
                    Ok(())
                }
            })
            .await
    }

    async fn sweep_streamers(&self, now: DateTime<Utc>, timeout: chrono::Duration) {
        for device_id in self.frames.devices().await {
            let Some(updated) = self.frames.last_update(&device_id).await else {
                continue;
            };
            if now - updated <= timeout {
                continue;
            }
            let silent_secs = (now - updated).num_seconds();
            self.frames.remove(&device_id).await;
            error!(device = %device_id, silent_secs, "video stream lost");
            self.log_status(&device_id, STATUS_VIDEO_LOST, "Video-Stream Lost")
                .await;
            self.push_notice(
                Notice::new(
                    "Video LOST",
                    format!("[{device_id}] Video LOST since {silent_secs}s"),
                    NoticeKind::Danger,
                    30,
                ),
            )
            .await;
        }
    }

    async fn notify_join(&self, device_id: &str) {
        let msg = format!("Monitoring Unit {device_id} JOIN");
        info!(device = %device_id, "monitor unit joined");
        self.log_status(device_id, STATUS_CONNECTED, "Connected").await;
        self.push_notice(Notice::new("MU JOIN", msg.clone(), NoticeKind::Info, 15))
            .await;
        self.send_alert("Monitor Unit: CONNECT", &msg).await;
    }

    async fn notify_leave(&self, device_id: &str) {
        let msg = format!("Monitoring Unit {device_id} LOST");
        error!(device = %device_id, "monitor unit lost");
        self.log_status(device_id, STATUS_CONNECTION_LOST, "Device Connection Lost")
            .await;
        self.push_notice(Notice::new(
            "MU DISCONNECT",
            msg.clone(),
            NoticeKind::Danger,
            20,
        ))
        .await;
        self.send_alert("Monitor Unit: LOST", &msg).await;
    }

    async fn log_status(&self, device_id: &str, code: i32, msg: &str) {
        let record = StatusLogRecord {
            timestamp: self.clock.now().timestamp(),
            device_id: device_id.to_string(),
            code,
            msg: msg.to_string(),
        };
        if let Err(err) = self.status_log.append(record).await {
            error!(device = %device_id, error = %err, "failed to log status record");
        }
    }

    async fn push_notice(&self, notice: Notice) {
        if let Err(err) = self.notices.publish(Role::SysAdmin, &notice).await {
            error!(error = %err, "failed to publish status notice");
        }
    }

    async fn send_alert(&self, subject: &str, body: &str) {
        if let Err(err) = self.mailer.broadcast_alert(subject, body).await {
            error!(error = %err, "failed to send alert email");
        }
    }
}
