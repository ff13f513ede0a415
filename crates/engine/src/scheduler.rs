//! Background scheduler driving the periodic sweeps.
//!
//! Three timers share one loop: expiry plus auto-confirmation, the daily
//! window check, and bonus-task expiry. Ticks never overlap; cancellation
//! is only observed between ticks, so an in-flight sweep always finishes.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use vorder_core::schedule::should_run_daily_task;

use crate::bonus::{BonusExpiryReport, DailyRunReport};
use crate::config::SchedulerConfig;
use crate::lifecycle::{AutoConfirmReport, ExpirySweepReport};
use crate::VirtualOrderEngine;

pub struct Scheduler {
    engine: Arc<VirtualOrderEngine>,
    config: SchedulerConfig,
    /// Business date on which the daily job last completed.
    last_daily_run: Mutex<Option<NaiveDate>>,
}

impl Scheduler {
    pub fn new(engine: Arc<VirtualOrderEngine>, config: SchedulerConfig) -> Self {
        Self {
            engine,
            config,
            last_daily_run: Mutex::new(None),
        }
    }

    pub fn last_daily_run(&self) -> Option<NaiveDate> {
        *self.last_daily_run.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_last_daily_run(&self, date: NaiveDate) {
        *self.last_daily_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(date);
    }

    /// Treat the daily job as done when today's bonus pool already exists,
    /// so a restart inside the window does not run it twice.
    pub async fn restore_last_run(&self) {
        let today = self.engine.today();
        match self.engine.bonus_status(today).await {
            Ok(status) if status.pool.is_some() => {
                tracing::info!(%today, "Daily job already ran today");
                self.set_last_daily_run(today);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Could not check today's bonus pool"),
        }
    }

    /// Run until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        self.restore_last_run().await;

        let mut expiry = tokio::time::interval(self.config.expiry_interval);
        let mut daily = tokio::time::interval(self.config.daily_check_interval);
        let mut bonus_expiry = tokio::time::interval(self.config.bonus_expiry_interval);
        for interval in [&mut expiry, &mut daily, &mut bonus_expiry] {
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        tracing::info!(
            expiry_secs = self.config.expiry_interval.as_secs(),
            daily_check_secs = self.config.daily_check_interval.as_secs(),
            bonus_expiry_secs = self.config.bonus_expiry_interval.as_secs(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scheduler stopping");
                    break;
                }
                _ = expiry.tick() => {
                    self.run_expiry_tick().await;
                }
                _ = daily.tick() => {
                    self.run_daily_tick().await;
                }
                _ = bonus_expiry.tick() => {
                    self.run_bonus_expiry_tick().await;
                }
            }
        }
    }

    /// Expiry sweep followed by auto-confirmation of stale submissions.
    pub async fn run_expiry_tick(&self) -> (Option<ExpirySweepReport>, Option<AutoConfirmReport>) {
        let expiry = match self.engine.expire_sweep().await {
            Ok(report) => {
                if report.students == 0 {
                    tracing::debug!("Expiry sweep: nothing expired");
                }
                Some(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Expiry sweep failed");
                None
            }
        };
        let confirm = match self.engine.auto_confirm_sweep().await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "Auto-confirmation failed");
                None
            }
        };
        (expiry, confirm)
    }

    /// Run the daily job once per business date inside the window. The job
    /// processes yesterday; a failed run is retried on the next tick.
    pub async fn run_daily_tick(&self) -> Option<DailyRunReport> {
        let local = self.engine.config().calendar.local(self.engine.now());
        if !should_run_daily_task(local, self.last_daily_run(), &self.config.daily_window) {
            return None;
        }
        let today = local.date();
        let Some(process_date) = today.pred_opt() else {
            return None;
        };

        match self.engine.run_daily(process_date).await {
            Ok(report) => {
                self.set_last_daily_run(today);
                tracing::info!(
                    %process_date,
                    warnings = report.warnings.len(),
                    "Daily job finished"
                );
                Some(report)
            }
            Err(e) => {
                tracing::error!(%process_date, error = %e, "Daily job failed");
                None
            }
        }
    }

    pub async fn run_bonus_expiry_tick(&self) -> Option<BonusExpiryReport> {
        match self.engine.expire_bonus_sweep().await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "Bonus expiry sweep failed");
                None
            }
        }
    }
}
