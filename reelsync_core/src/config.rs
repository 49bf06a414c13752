use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::paytable::{BonusTable, Paytable};
use crate::symbols::SymbolSet;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Reel animation timings. The store settles a spin once the slowest reel
/// has stopped plus a buffer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingConfig {
    pub spin_duration_ms: u64,
    pub spin_stagger_ms: u64,
    pub settle_buffer_ms: u64,
    /// Extra wait before a peer's unfinished spin is written off.
    pub remote_settle_grace_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            spin_duration_ms: 1200,
            spin_stagger_ms: 180,
            settle_buffer_ms: 400,
            remote_settle_grace_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoSpinConfig {
    pub default_interval_ms: u64,
    pub min_interval_ms: u64,
}

impl Default for AutoSpinConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: 1500,
            min_interval_ms: 600,
        }
    }
}

/// Names shared by every context of one origin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub channel_name: String,
    pub state_key: String,
    pub signal_key: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_name: "reelsync-shared-state".into(),
            state_key: "reelsync-state".into(),
            signal_key: "reelsync-signal".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    pub reels: usize,
    pub symbols: SymbolSet,
    pub bonus_multipliers: BonusTable,
    /// Chance of forcing a full line. `None` draws every reel independently.
    pub win_bias: Option<f64>,
    pub starting_balance: f64,
    pub default_bet: f64,
    pub min_bet: f64,
    pub default_multiplier: u32,
    pub timing: TimingConfig,
    pub auto_spin: AutoSpinConfig,
    pub sync: SyncConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            reels: 3,
            symbols: SymbolSet::default_set(),
            bonus_multipliers: BonusTable::default_bands(),
            win_bias: None,
            starting_balance: 20.0,
            default_bet: 1.0,
            min_bet: 0.5,
            default_multiplier: 1,
            timing: TimingConfig::default(),
            auto_spin: AutoSpinConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl GameConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.reels == 0 {
            return invalid("reels must be at least 1".into());
        }
        if self.symbols.is_empty() {
            return invalid("symbol table is empty".into());
        }
        if let Some(s) = self
            .symbols
            .iter()
            .find(|s| !s.payout.is_finite() || s.payout <= 0.0)
        {
            return invalid(format!("symbol {} has a non-positive payout", s.name));
        }
        if let Some(b) = self
            .bonus_multipliers
            .0
            .iter()
            .find(|b| b.value == 0 || !(0.0..=1.0).contains(&b.chance))
        {
            return invalid(format!(
                "bonus band x{} with chance {} is out of range",
                b.value, b.chance
            ));
        }
        if self.bonus_multipliers.total_chance() > 1.0 + f64::EPSILON {
            return invalid("bonus chances sum above 1".into());
        }
        if let Some(bias) = self.win_bias {
            if !(0.0..=1.0).contains(&bias) {
                return invalid(format!("win bias {bias} is outside [0, 1]"));
            }
        }
        if !self.min_bet.is_finite() || self.min_bet <= 0.0 {
            return invalid("minBet must be positive".into());
        }
        if !self.default_bet.is_finite() || self.default_bet < self.min_bet {
            return invalid("defaultBet must be at least minBet".into());
        }
        if self.default_multiplier == 0 {
            return invalid("defaultMultiplier must be at least 1".into());
        }
        if !self.starting_balance.is_finite() || self.starting_balance < 0.0 {
            return invalid("startingBalance must be non-negative".into());
        }
        if self.auto_spin.min_interval_ms == 0
            || self.auto_spin.default_interval_ms < self.auto_spin.min_interval_ms
        {
            return invalid("autoSpin interval must be positive and at least the minimum".into());
        }
        Ok(())
    }

    pub fn paytable(&self) -> Paytable {
        Paytable::from_symbols(&self.symbols, self.reels)
    }

    /// Time from stake debit to settlement: the last reel stops after
    /// `stagger * (reels - 1)` on top of the base spin.
    pub fn settle_delay(&self) -> Duration {
        let t = &self.timing;
        Duration::from_millis(
            t.spin_duration_ms
                + t.spin_stagger_ms * (self.reels.saturating_sub(1) as u64)
                + t.settle_buffer_ms,
        )
    }

    pub fn remote_settle_deadline(&self) -> Duration {
        self.settle_delay() + Duration::from_millis(self.timing.remote_settle_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paytable::BonusBand;

    #[test]
    fn defaults_are_valid() {
        let config = GameConfig::default();
        config.validate().unwrap();
        assert_eq!(config.settle_delay(), Duration::from_millis(1200 + 360 + 400));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            GameConfig::from_json_str(r#"{"startingBalance": 50, "timing": {"spinDurationMs": 10}}"#)
                .unwrap();
        assert_eq!(config.starting_balance, 50.0);
        assert_eq!(config.timing.spin_duration_ms, 10);
        assert_eq!(config.timing.spin_stagger_ms, 180);
        assert_eq!(config.reels, 3);
    }

    #[test]
    fn rejects_overfull_bonus_table() {
        let mut config = GameConfig::default();
        config.bonus_multipliers = BonusTable(vec![
            BonusBand {
                value: 2,
                chance: 0.7,
            },
            BonusBand {
                value: 3,
                chance: 0.7,
            },
        ]);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_bad_bets_and_bias() {
        let mut config = GameConfig::default();
        config.default_bet = 0.1;
        assert!(config.validate().is_err());

        let mut config = GameConfig::default();
        config.win_bias = Some(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = GameConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
