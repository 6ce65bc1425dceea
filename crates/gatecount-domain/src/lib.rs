//! Core domain of the gatecount collector: counting buckets and occupancy
//! aggregation, device liveness, debug-frame storage, closed-period
//! scheduling and the recurring reports. Network edges and persistence
//! engines stay behind the traits in [`repository`] and [`mail`].

pub mod clock;
pub mod close_schedule;
pub mod close_watch;
pub mod counts;
pub mod day_window;
pub mod error;
pub mod frame_store;
pub mod in_memory_stores;
pub mod liveness;
pub mod mail;
pub mod notice;
pub mod occupancy;
pub mod reports;
pub mod repository;
pub mod scheduler;
pub mod status;
pub mod validate;

pub use clock::{Clock, ManualClock, SystemClock};
pub use close_schedule::{
    close_range, is_close_date, is_night_or_weekend, was_night_range, CloseConfig, ClosePeriod,
};
pub use close_watch::{CloseWatch, SuspicionEvent, SuspicionWindow};
pub use counts::{
    CountRecord, CountUpdate, DeviceSelector, DeviceTotals, Occupancy, OccupancyUpdate,
};
pub use day_window::day_window;
pub use error::{DomainError, DomainResult};
pub use frame_store::{Frame, FrameStore};
pub use in_memory_stores::{
    InMemoryCloseCalendar, InMemoryCountStore, InMemoryMismatchStore, InMemoryStatusLog,
};
pub use liveness::{LivenessConfig, LivenessTracker};
pub use mail::{AlertMailer, MailDispatcher};
pub use notice::{Notice, NoticeKind, Role};
pub use occupancy::{OccupancyConfig, OccupancyService, ResetRequest};
pub use reports::{event_lines, ReportConfig, ReportTasks};
pub use repository::{
    CloseCalendarRepository, CountRecordRepository, MismatchRepository, NoticePublisher,
    OccupancyPublisher, StatusLogRepository,
};
pub use scheduler::{Recurrence, Scheduler};
pub use status::{
    MismatchRecord, StatusLogRecord, STATUS_CONNECTED, STATUS_CONNECTION_LOST, STATUS_VIDEO_LOST,
};
