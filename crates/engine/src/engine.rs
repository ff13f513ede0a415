use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use vorder_core::clock::Clock;
use vorder_core::error::CoreError;
use vorder_core::settings::{RuntimeSettings, SettingsPatch};
use vorder_core::store::{RebateSource, Store};
use vorder_core::types::{DbId, Money, Timestamp};

use crate::config::EngineConfig;
use crate::EngineResult;

/// Entry point for every engine operation.
///
/// Cheap to share behind an `Arc`; all state lives in the store.
pub struct VirtualOrderEngine {
    pub(crate) store: Arc<dyn Store>,
    rebates: Arc<dyn RebateSource>,
    clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
    rng: Mutex<StdRng>,
}

impl VirtualOrderEngine {
    pub fn new(
        store: Arc<dyn Store>,
        rebates: Arc<dyn RebateSource>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let rng = match config.splitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            store,
            rebates,
            clock,
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Current business date.
    pub fn today(&self) -> NaiveDate {
        self.config.calendar.date_of(self.now())
    }

    /// Run `f` with exclusive access to the random source. Never call across
    /// an `.await`.
    pub(crate) fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }

    /// Rebate rate for the student's agent, falling back to the default when
    /// the agent is missing, misconfigured, or the lookup fails.
    pub async fn rebate_rate(&self, student_id: DbId) -> Money {
        match self.rebates.rebate_rate(student_id).await {
            Ok(Some(rate)) => rate,
            Ok(None) => self.config.default_rebate_rate,
            Err(e) => {
                tracing::warn!(student_id, error = %e, "Rebate lookup failed, using default rate");
                self.config.default_rebate_rate
            }
        }
    }

    // -- Runtime settings --

    pub async fn settings(&self) -> EngineResult<RuntimeSettings> {
        let mut tx = self.store.begin().await?;
        Ok(tx.load_settings().await?)
    }

    pub async fn update_settings(&self, patch: &SettingsPatch) -> EngineResult<RuntimeSettings> {
        if patch.daily_target.is_some_and(|t| t < Money::ZERO) {
            return Err(CoreError::Validation("daily_target must not be negative".into()).into());
        }
        let mut tx = self.store.begin().await?;
        let mut settings = tx.load_settings().await?;
        patch.apply(&mut settings);
        tx.save_settings(&settings).await?;
        tx.commit().await?;
        tracing::info!(?settings, "Runtime settings updated");
        Ok(settings)
    }
}
