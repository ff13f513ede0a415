//! Runtime switches persisted in the `system_config` table.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Money;

pub const KEY_GENERATION_ENABLED: &str = "virtual_task_generation_enabled";
pub const KEY_EXPIRED_REGENERATION_ENABLED: &str = "virtual_task_expired_regeneration_enabled";
pub const KEY_VALUE_RECYCLING_ENABLED: &str = "virtual_task_value_recycling_enabled";
pub const KEY_BONUS_POOL_ENABLED: &str = "virtual_task_bonus_pool_enabled";
pub const KEY_DAILY_TARGET: &str = "daily_achievement_target";

/// Default daily target a student must earn to unlock the next day's bonus tasks.
pub fn default_daily_target() -> Money {
    Decimal::from(50)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Master switch for creating virtual tasks.
    pub generation_enabled: bool,
    /// Regenerate replacement tasks after expiry.
    pub expired_regeneration_enabled: bool,
    /// Regenerate from the unpaid remainder after completion.
    pub value_recycling_enabled: bool,
    pub bonus_pool_enabled: bool,
    pub daily_target: Money,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            generation_enabled: true,
            expired_regeneration_enabled: true,
            value_recycling_enabled: true,
            bonus_pool_enabled: true,
            daily_target: default_daily_target(),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl RuntimeSettings {
    /// Build from stored key/value rows. Unknown keys and unparseable values
    /// keep their defaults.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut settings = Self::default();
        for (key, value) in pairs {
            match key {
                KEY_GENERATION_ENABLED => {
                    if let Some(flag) = parse_flag(value) {
                        settings.generation_enabled = flag;
                    }
                }
                KEY_EXPIRED_REGENERATION_ENABLED => {
                    if let Some(flag) = parse_flag(value) {
                        settings.expired_regeneration_enabled = flag;
                    }
                }
                KEY_VALUE_RECYCLING_ENABLED => {
                    if let Some(flag) = parse_flag(value) {
                        settings.value_recycling_enabled = flag;
                    }
                }
                KEY_BONUS_POOL_ENABLED => {
                    if let Some(flag) = parse_flag(value) {
                        settings.bonus_pool_enabled = flag;
                    }
                }
                KEY_DAILY_TARGET => {
                    if let Ok(target) = Decimal::from_str(value.trim()) {
                        if target >= Decimal::ZERO {
                            settings.daily_target = target;
                        }
                    }
                }
                _ => {}
            }
        }
        settings
    }

    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (KEY_GENERATION_ENABLED, self.generation_enabled.to_string()),
            (
                KEY_EXPIRED_REGENERATION_ENABLED,
                self.expired_regeneration_enabled.to_string(),
            ),
            (
                KEY_VALUE_RECYCLING_ENABLED,
                self.value_recycling_enabled.to_string(),
            ),
            (KEY_BONUS_POOL_ENABLED, self.bonus_pool_enabled.to_string()),
            (KEY_DAILY_TARGET, self.daily_target.to_string()),
        ]
    }
}

/// Partial update of [`RuntimeSettings`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SettingsPatch {
    pub generation_enabled: Option<bool>,
    pub expired_regeneration_enabled: Option<bool>,
    pub value_recycling_enabled: Option<bool>,
    pub bonus_pool_enabled: Option<bool>,
    pub daily_target: Option<Money>,
}

impl SettingsPatch {
    pub fn apply(&self, settings: &mut RuntimeSettings) {
        if let Some(v) = self.generation_enabled {
            settings.generation_enabled = v;
        }
        if let Some(v) = self.expired_regeneration_enabled {
            settings.expired_regeneration_enabled = v;
        }
        if let Some(v) = self.value_recycling_enabled {
            settings.value_recycling_enabled = v;
        }
        if let Some(v) = self.bonus_pool_enabled {
            settings.bonus_pool_enabled = v;
        }
        if let Some(v) = self.daily_target {
            settings.daily_target = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_everything() {
        let s = RuntimeSettings::default();
        assert!(s.generation_enabled && s.bonus_pool_enabled);
        assert_eq!(s.daily_target, Decimal::from(50));
    }

    #[test]
    fn pairs_round_trip() {
        let mut s = RuntimeSettings::default();
        s.value_recycling_enabled = false;
        s.daily_target = Decimal::new(7550, 2);
        let pairs = s.to_pairs();
        let parsed =
            RuntimeSettings::from_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())));
        assert_eq!(parsed, s);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let s = RuntimeSettings::from_pairs([
            (KEY_GENERATION_ENABLED, "maybe"),
            (KEY_DAILY_TARGET, "-3"),
            ("unrelated", "x"),
        ]);
        assert_eq!(s, RuntimeSettings::default());
    }

    #[test]
    fn patch_touches_only_given_fields() {
        let mut s = RuntimeSettings::default();
        SettingsPatch {
            bonus_pool_enabled: Some(false),
            ..Default::default()
        }
        .apply(&mut s);
        assert!(!s.bonus_pool_enabled);
        assert!(s.generation_enabled);
    }
}
