/// Status code logged when a monitor unit connects.
pub const STATUS_CONNECTED: i32 = 9;
/// Status code logged when a monitor unit's heartbeat expires.
pub const STATUS_CONNECTION_LOST: i32 = -9;
/// Status code logged when a device's video stream goes stale.
pub const STATUS_VIDEO_LOST: i32 = -4;

/// Lifecycle transition appended to the status log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLogRecord {
    pub timestamp: i64,
    pub device_id: String,
    pub code: i32,
    pub msg: String,
}

/// Daily residue left over after the reset boundary; a nonzero estimate
/// means the entered/exited streams drifted apart during the day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MismatchRecord {
    pub timestamp: i64,
    pub entered: i64,
    pub exited: i64,
    pub estimated: i64,
}
