use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Listener addresses: one per channel instance plus the device API
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    #[serde(default = "default_notice_ws_addr")]
    pub notice_ws_addr: String,

    #[serde(default = "default_update_ws_addr")]
    pub update_ws_addr: String,

    #[serde(default = "default_frame_ws_addr")]
    pub frame_ws_addr: String,

    /// Bearer token devices present on the count-update endpoint
    #[serde(default)]
    pub update_token: String,

    /// Shared token video streamers present on the frame channel
    #[serde(default)]
    pub frame_token: String,

    /// A textual ack goes back to a streamer every this many frames
    #[serde(default = "default_frame_ack_every")]
    pub frame_ack_every: u32,

    /// Devices that are supposed to be reporting; absentees flag the
    /// fleet as degraded on every broadcast
    #[serde(default)]
    pub expected_devices: Vec<String>,

    /// Heartbeat timeout and sweep period, in seconds
    #[serde(default = "default_alive_timeout_secs")]
    pub alive_timeout_secs: u64,

    /// Device id stamped on corrective records
    #[serde(default = "default_reset_record_name")]
    pub reset_record_name: String,

    /// Daily reset hour pair delimiting the "today" window
    #[serde(default)]
    pub daily_reset_start_hour: u32,

    #[serde(default)]
    pub daily_reset_end_hour: u32,

    /// Nightly closing range; the end hour is on the following day
    #[serde(default = "default_night_start_hour")]
    pub night_start_hour: u32,

    #[serde(default = "default_night_end_hour")]
    pub night_end_hour: u32,

    /// Weekly closure days, 0 = Monday .. 6 = Sunday
    #[serde(default = "default_week_close_days")]
    pub week_close_days: Vec<u8>,

    /// Closed-calendar lookahead, in days
    #[serde(default = "default_close_horizon_days")]
    pub close_horizon_days: i64,

    /// Watch poll interval inside a closed window, in seconds
    #[serde(default = "default_alert_refresh_secs")]
    pub alert_refresh_secs: u64,

    /// Net headcount that raises an anomaly alert
    #[serde(default = "default_alert_trigger_headcount")]
    pub alert_trigger_headcount: i64,

    /// Upper bound on the suspicion window, in hours
    #[serde(default = "default_alert_renew_ceiling_hours")]
    pub alert_renew_ceiling_hours: i64,

    /// Hour of the daily night-activity report (and recap mails)
    #[serde(default = "default_night_report_hour")]
    pub night_report_hour: u32,

    /// Hour of the daily mismatch report
    #[serde(default = "default_mismatch_report_hour")]
    pub mismatch_report_hour: u32,

    /// Records older than this many days are purged
    #[serde(default = "default_cleanup_retention_days")]
    pub cleanup_retention_days: i64,

    /// Cleanup period, in days
    #[serde(default = "default_cleanup_every_days")]
    pub cleanup_every_days: u64,

    /// Recipients of operational alert mails
    #[serde(default)]
    pub alert_recipients: Vec<String>,

    /// Recipients of anomalous-activity mails
    #[serde(default)]
    pub anomaly_recipients: Vec<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_notice_ws_addr() -> String {
    "0.0.0.0:9030".to_string()
}

fn default_update_ws_addr() -> String {
    "0.0.0.0:9031".to_string()
}

fn default_frame_ws_addr() -> String {
    "0.0.0.0:9032".to_string()
}

fn default_frame_ack_every() -> u32 {
    100
}

fn default_alive_timeout_secs() -> u64 {
    10
}

fn default_reset_record_name() -> String {
    "reset".to_string()
}

fn default_night_start_hour() -> u32 {
    20
}

fn default_night_end_hour() -> u32 {
    7
}

fn default_week_close_days() -> Vec<u8> {
    vec![5, 6]
}

fn default_close_horizon_days() -> i64 {
    60
}

fn default_alert_refresh_secs() -> u64 {
    30
}

fn default_alert_trigger_headcount() -> i64 {
    1
}

fn default_alert_renew_ceiling_hours() -> i64 {
    1
}

fn default_night_report_hour() -> u32 {
    8
}

fn default_mismatch_report_hour() -> u32 {
    9
}

fn default_cleanup_retention_days() -> i64 {
    365
}

fn default_cleanup_every_days() -> u64 {
    1
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("GATECOUNT")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("expected_devices")
                    .with_list_parse_key("week_close_days")
                    .with_list_parse_key("alert_recipients")
                    .with_list_parse_key("anomaly_recipients"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        for (name, hour) in [
            ("daily_reset_start_hour", self.daily_reset_start_hour),
            ("daily_reset_end_hour", self.daily_reset_end_hour),
            ("night_start_hour", self.night_start_hour),
            ("night_end_hour", self.night_end_hour),
            ("night_report_hour", self.night_report_hour),
            ("mismatch_report_hour", self.mismatch_report_hour),
        ] {
            if hour >= 24 {
                anyhow::bail!("{name} must be an hour in 0..24, got {hour}");
            }
        }
        if self.night_end_hour >= self.night_start_hour {
            anyhow::bail!(
                "night_end_hour ({}) must be smaller than night_start_hour ({}): the nightly range spans midnight",
                self.night_end_hour,
                self.night_start_hour
            );
        }
        if let Some(day) = self.week_close_days.iter().find(|day| **day > 6) {
            anyhow::bail!("week_close_days entries must be 0..=6 (0 = Monday), got {day}");
        }
        if self.alert_refresh_secs == 0 {
            anyhow::bail!("alert_refresh_secs must be positive");
        }
        if self.cleanup_every_days == 0 {
            anyhow::bail!("cleanup_every_days must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // env vars are process-global; serialize the tests touching them
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for (key, _) in std::env::vars() {
            if key.starts_with("GATECOUNT_") {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn defaults_cover_every_field() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.alive_timeout_secs, 10);
        assert_eq!(config.frame_ack_every, 100);
        assert_eq!(config.week_close_days, vec![5, 6]);
        assert_eq!(config.close_horizon_days, 60);
        assert!(config.expected_devices.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_are_applied() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        std::env::set_var("GATECOUNT_LOG_LEVEL", "debug");
        std::env::set_var("GATECOUNT_ALIVE_TIMEOUT_SECS", "20");
        std::env::set_var("GATECOUNT_EXPECTED_DEVICES", "gate-a,gate-b");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.alive_timeout_secs, 20);
        assert_eq!(
            config.expected_devices,
            vec!["gate-a".to_string(), "gate-b".to_string()]
        );

        clear_env();
    }

    #[test]
    fn validate_rejects_inverted_night_hours() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let mut config = ServiceConfig::from_env().unwrap();
        config.night_start_hour = 7;
        config.night_end_hour = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_hours_and_days() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let mut config = ServiceConfig::from_env().unwrap();
        config.night_report_hour = 24;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::from_env().unwrap();
        config.week_close_days = vec![7];
        assert!(config.validate().is_err());
    }
}
