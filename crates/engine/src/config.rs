use std::time::Duration as StdDuration;

use chrono::Duration;
use vorder_core::allocation::{PriorityPolicy, NEW_SERVICE_PRIORITY_BOOST, NEW_SERVICE_WINDOW_HOURS};
use vorder_core::rebate::{default_rebate_rate, parse_rebate_rate};
use vorder_core::schedule::{BusinessCalendar, DailyWindow};
use vorder_core::types::Money;

/// Task-generation and settlement parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a generated task stays acceptable.
    pub accept_window: Duration,
    /// Delivery deadline stamped on generated tasks.
    pub delivery_window: Duration,
    pub priority: PriorityPolicy,
    /// Used when a student's agent has no usable rebate setting.
    pub default_rebate_rate: Money,
    pub calendar: BusinessCalendar,
    /// When false, tasks are created without reserving an image.
    pub require_images: bool,
    /// Submitted tasks older than this are confirmed automatically.
    pub auto_confirm_after: Duration,
    pub auto_confirm_batch: i64,
    /// Bonus tasks generated right after the daily pool update.
    pub bonus_initial_tasks: usize,
    /// Fixed seed for reproducible splits; entropy-seeded when `None`.
    pub splitter_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            accept_window: Duration::hours(3),
            delivery_window: Duration::days(3),
            priority: PriorityPolicy::default(),
            default_rebate_rate: default_rebate_rate(),
            calendar: BusinessCalendar::default(),
            require_images: true,
            auto_confirm_after: Duration::hours(1),
            auto_confirm_batch: 50,
            bonus_initial_tasks: 20,
            splitter_seed: None,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: &str) -> T {
    std::env::var(key)
        .unwrap_or_else(|_| default.into())
        .trim()
        .parse()
        .unwrap_or_else(|_| panic!("{key} has an invalid value"))
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default |
    /// |------------------------------|---------|
    /// | `TASK_ACCEPT_WINDOW_HOURS`   | `3`     |
    /// | `TASK_DELIVERY_DAYS`         | `3`     |
    /// | `NEW_SERVICE_WINDOW_HOURS`   | `24`    |
    /// | `NEW_SERVICE_PRIORITY_BOOST` | `100`   |
    /// | `DEFAULT_REBATE_RATE`        | `0.6`   |
    /// | `BUSINESS_UTC_OFFSET_HOURS`  | `8`     |
    /// | `REQUIRE_TASK_IMAGES`        | `true`  |
    /// | `AUTO_CONFIRM_AFTER_HOURS`   | `1`     |
    /// | `AUTO_CONFIRM_BATCH_SIZE`    | `50`    |
    /// | `BONUS_INITIAL_TASKS`        | `20`    |
    /// | `SPLITTER_SEED`              | unset   |
    pub fn from_env() -> Self {
        let accept_hours: i64 = env_or("TASK_ACCEPT_WINDOW_HOURS", "3");
        let delivery_days: i64 = env_or("TASK_DELIVERY_DAYS", "3");
        let window_hours: i64 =
            env_or("NEW_SERVICE_WINDOW_HOURS", &NEW_SERVICE_WINDOW_HOURS.to_string());
        let boost: i64 =
            env_or("NEW_SERVICE_PRIORITY_BOOST", &NEW_SERVICE_PRIORITY_BOOST.to_string());

        let default_rebate_rate = match std::env::var("DEFAULT_REBATE_RATE") {
            Ok(raw) => parse_rebate_rate(&raw)
                .expect("DEFAULT_REBATE_RATE must be a rate between 0 and 1 (or a percentage)"),
            Err(_) => default_rebate_rate(),
        };

        let offset_hours: i32 = env_or("BUSINESS_UTC_OFFSET_HOURS", "8");
        let calendar = BusinessCalendar::with_offset_hours(offset_hours)
            .expect("BUSINESS_UTC_OFFSET_HOURS must be within -23..=23");

        let splitter_seed = std::env::var("SPLITTER_SEED").ok().map(|raw| {
            raw.trim()
                .parse()
                .expect("SPLITTER_SEED must be a valid u64")
        });

        Self {
            accept_window: Duration::hours(accept_hours),
            delivery_window: Duration::days(delivery_days),
            priority: PriorityPolicy {
                new_service_boost: boost,
                new_service_window: Duration::hours(window_hours),
            },
            default_rebate_rate,
            calendar,
            require_images: env_or("REQUIRE_TASK_IMAGES", "true"),
            auto_confirm_after: Duration::hours(env_or("AUTO_CONFIRM_AFTER_HOURS", "1")),
            auto_confirm_batch: env_or("AUTO_CONFIRM_BATCH_SIZE", "50"),
            bonus_initial_tasks: env_or("BONUS_INITIAL_TASKS", "20"),
            splitter_seed,
        }
    }
}

/// Timer periods for the background scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Expiry sweep plus auto-confirmation.
    pub expiry_interval: StdDuration,
    /// How often to check whether the daily job is due.
    pub daily_check_interval: StdDuration,
    pub bonus_expiry_interval: StdDuration,
    pub daily_window: DailyWindow,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            expiry_interval: StdDuration::from_secs(600),
            daily_check_interval: StdDuration::from_secs(300),
            bonus_expiry_interval: StdDuration::from_secs(3 * 3600),
            daily_window: DailyWindow::default(),
        }
    }
}

impl SchedulerConfig {
    /// | Env Var                      | Default |
    /// |------------------------------|---------|
    /// | `EXPIRY_CHECK_INTERVAL_SECS` | `600`   |
    /// | `DAILY_CHECK_INTERVAL_SECS`  | `300`   |
    /// | `BONUS_EXPIRY_INTERVAL_SECS` | `10800` |
    /// | `DAILY_WINDOW_START_HOUR`    | `0`     |
    /// | `DAILY_WINDOW_END_HOUR`      | `2`     |
    pub fn from_env() -> Self {
        let start_hour: u32 = env_or("DAILY_WINDOW_START_HOUR", "0");
        let end_hour: u32 = env_or("DAILY_WINDOW_END_HOUR", "2");
        assert!(
            start_hour < 24 && end_hour <= 24,
            "DAILY_WINDOW_*_HOUR must be within 0..24"
        );

        Self {
            expiry_interval: StdDuration::from_secs(env_or("EXPIRY_CHECK_INTERVAL_SECS", "600")),
            daily_check_interval: StdDuration::from_secs(env_or(
                "DAILY_CHECK_INTERVAL_SECS",
                "300",
            )),
            bonus_expiry_interval: StdDuration::from_secs(env_or(
                "BONUS_EXPIRY_INTERVAL_SECS",
                "10800",
            )),
            daily_window: DailyWindow {
                start_hour,
                end_hour,
            },
        }
    }
}
