mod config;
mod mail;
mod telemetry;

use chrono::Weekday;
use config::ServiceConfig;
use gatecount_domain::{
    AlertMailer, CloseCalendarRepository, CloseConfig, CloseWatch, CountRecordRepository,
    FrameStore, InMemoryCloseCalendar, InMemoryCountStore, InMemoryMismatchStore,
    InMemoryStatusLog, LivenessConfig, LivenessTracker, MailDispatcher, MismatchRepository,
    OccupancyConfig, OccupancyService, ReportConfig, ReportTasks, StatusLogRepository,
    SystemClock,
};
use gatecount_runner::Runner;
use gatecount_ws::{ApiState, FrameHub, FrameIngestConfig, NoticeHub, UpdateHub};
use mail::LogMailDispatcher;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = telemetry::init_telemetry(&config.log_level) {
        eprintln!("Failed to initialize telemetry: {err}");
        std::process::exit(1);
    }

    if let Err(err) = config.validate() {
        error!(error = %err, "invalid configuration");
        std::process::exit(1);
    }

    info!("starting gatecount collector");
    debug!("configuration: {:?}", config);
    if config.update_token.is_empty() || config.frame_token.is_empty() {
        warn!("update/frame tokens are empty, device channels accept the empty token");
    }

    let http_addr = parse_addr("http_addr", &config.http_addr);
    let notice_addr = parse_addr("notice_ws_addr", &config.notice_ws_addr);
    let update_addr = parse_addr("update_ws_addr", &config.update_ws_addr);
    let frame_addr = parse_addr("frame_ws_addr", &config.frame_ws_addr);

    // Shared registries and collaborators. The persistent engine is an
    // external concern; the in-memory stores are the default backing.
    let clock = Arc::new(SystemClock);
    let counts: Arc<dyn CountRecordRepository> = Arc::new(InMemoryCountStore::new());
    let status_log: Arc<dyn StatusLogRepository> = Arc::new(InMemoryStatusLog::new());
    let mismatches: Arc<dyn MismatchRepository> = Arc::new(InMemoryMismatchStore::new());
    let calendar: Arc<dyn CloseCalendarRepository> = Arc::new(InMemoryCloseCalendar::new());
    let dispatcher: Arc<dyn MailDispatcher> = Arc::new(LogMailDispatcher);
    let mailer = Arc::new(AlertMailer::new(
        dispatcher,
        config.alert_recipients.clone(),
        config.anomaly_recipients.clone(),
    ));

    let frames = Arc::new(FrameStore::new(clock.clone()));
    let notice_hub = Arc::new(NoticeHub::new());
    let update_hub = Arc::new(UpdateHub::new());

    let liveness = Arc::new(LivenessTracker::new(
        LivenessConfig {
            alive_timeout_secs: config.alive_timeout_secs,
            expected_devices: config.expected_devices.iter().cloned().collect(),
        },
        frames.clone(),
        status_log.clone(),
        notice_hub.clone(),
        mailer.clone(),
        clock.clone(),
    ));

    let occupancy = Arc::new(OccupancyService::new(
        counts.clone(),
        liveness.clone(),
        update_hub.clone(),
        clock.clone(),
        OccupancyConfig {
            daily_reset_hours: (config.daily_reset_start_hour, config.daily_reset_end_hour),
            reset_record_name: config.reset_record_name.clone(),
        },
    ));

    let close_config = CloseConfig {
        night_hours: (config.night_start_hour, config.night_end_hour),
        week_close_days: config
            .week_close_days
            .iter()
            .filter_map(|day| Weekday::try_from(*day).ok())
            .collect(),
        horizon_days: config.close_horizon_days,
        refresh_secs: config.alert_refresh_secs,
        trigger_headcount: config.alert_trigger_headcount,
        renew_ceiling_hours: config.alert_renew_ceiling_hours,
        night_report_hour: config.night_report_hour,
    };

    let watch = Arc::new(CloseWatch::new(
        counts.clone(),
        calendar.clone(),
        occupancy.clone(),
        mailer.clone(),
        clock.clone(),
        close_config.clone(),
    ));

    let reports = Arc::new(ReportTasks::new(
        counts.clone(),
        status_log.clone(),
        mismatches.clone(),
        calendar.clone(),
        occupancy.clone(),
        mailer.clone(),
        clock.clone(),
        close_config,
        ReportConfig {
            mismatch_report_hour: config.mismatch_report_hour,
            night_report_hour: config.night_report_hour,
            cleanup_retention_days: config.cleanup_retention_days,
            cleanup_every_days: config.cleanup_every_days,
            daily_reset_hours: (config.daily_reset_start_hour, config.daily_reset_end_hour),
        },
    ));

    // seed the update channel so the first subscriber gets a payload
    if let Err(err) = occupancy.broadcast_now().await {
        warn!(error = %err, "initial occupancy broadcast failed");
    }

    let api_state = Arc::new(ApiState::new(occupancy.clone(), config.update_token.clone()));
    let frame_hub = Arc::new(FrameHub::new(
        frames.clone(),
        FrameIngestConfig {
            token: config.frame_token.clone(),
            ack_every: config.frame_ack_every,
        },
    ));

    let result = Runner::new()
        .with_process({
            let api_state = api_state.clone();
            move |token| {
                gatecount_ws::serve(
                    "count-api",
                    http_addr,
                    gatecount_ws::http::router(api_state),
                    token,
                )
            }
        })
        .with_process({
            let hub = notice_hub.clone();
            move |token| {
                gatecount_ws::serve(
                    "notice-channel",
                    notice_addr,
                    gatecount_ws::notice_hub::router(hub),
                    token,
                )
            }
        })
        .with_process({
            let hub = update_hub.clone();
            move |token| {
                gatecount_ws::serve(
                    "update-channel",
                    update_addr,
                    gatecount_ws::update_hub::router(hub),
                    token,
                )
            }
        })
        .with_process({
            let hub = frame_hub.clone();
            move |token| {
                gatecount_ws::serve(
                    "frame-channel",
                    frame_addr,
                    gatecount_ws::frame_hub::router(hub),
                    token,
                )
            }
        })
        .with_process({
            let liveness = liveness.clone();
            move |token| liveness.run(token)
        })
        .with_process({
            let watch = watch.clone();
            move |token| async move { watch.run(token).await }
        })
        .with_process({
            let reports = reports.clone();
            move |token| reports.mismatch_report_loop(token)
        })
        .with_process({
            let reports = reports.clone();
            move |token| reports.night_report_loop(token)
        })
        .with_process({
            let reports = reports.clone();
            move |token| reports.cleanup_loop(token)
        })
        .run()
        .await;

    match result {
        Ok(()) => info!("gatecount collector stopped"),
        Err(err) => {
            error!(error = %err, "gatecount collector stopped with error");
            std::process::exit(1);
        }
    }
}

fn parse_addr(name: &str, value: &str) -> SocketAddr {
    match value.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, "invalid {name}: {value}");
            std::process::exit(1);
        }
    }
}
