use reelsync_core::{resting_window, round_cents, GameConfig, RandomSource};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const WELCOME_MESSAGE: &str = "Insert credits to play.";

/// The canonical record every context replicates and persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub balance: f64,
    pub current_bet: f64,
    pub bet_multiplier: u32,
    pub spinning: bool,
    pub auto_spin: bool,
    pub auto_spin_interval: u64,
    pub last_symbols: Vec<String>,
    pub last_win: f64,
    pub last_multiplier: u32,
    pub last_message: String,
    pub total_winnings: f64,
    pub last_spin_id: Option<String>,
}

/// How untrusted state is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeMode {
    /// Startup load: no spin timer survives a reload.
    Rehydrate,
    /// Live write from another context; flags are kept as sent.
    Peer,
}

impl GameState {
    pub fn initial(config: &GameConfig, rng: &mut dyn RandomSource) -> Self {
        Self {
            balance: round_cents(config.starting_balance),
            current_bet: round_cents(config.default_bet),
            bet_multiplier: config.default_multiplier,
            spinning: false,
            auto_spin: false,
            auto_spin_interval: config.auto_spin.default_interval_ms,
            last_symbols: resting_window(rng, &config.symbols, config.reels),
            last_win: 0.0,
            last_multiplier: 1,
            last_message: WELCOME_MESSAGE.to_string(),
            total_winnings: 0.0,
            last_spin_id: None,
        }
    }

    pub fn wager(&self) -> f64 {
        round_cents(self.current_bet * self.bet_multiplier as f64)
    }

    /// Field-by-field recovery of a state document. Anything missing, of the
    /// wrong type or out of range falls back to its default; a document that
    /// is not an object yields `None`.
    pub fn sanitize(
        raw: &Value,
        config: &GameConfig,
        mode: SanitizeMode,
        rng: &mut dyn RandomSource,
    ) -> Option<Self> {
        let raw = raw.as_object()?;
        let last_symbols = match symbols(raw, config) {
            Some(window) => window,
            None => resting_window(rng, &config.symbols, config.reels),
        };
        let (spinning, auto_spin) = match mode {
            SanitizeMode::Rehydrate => (false, false),
            SanitizeMode::Peer => (flag(raw, "spinning"), flag(raw, "autoSpin")),
        };
        Some(Self {
            balance: number(raw, "balance", 0.0).unwrap_or(round_cents(config.starting_balance)),
            current_bet: number(raw, "currentBet", config.min_bet)
                .unwrap_or(round_cents(config.default_bet)),
            bet_multiplier: whole(raw, "betMultiplier", 1)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(config.default_multiplier),
            spinning,
            auto_spin,
            auto_spin_interval: whole(raw, "autoSpinInterval", config.auto_spin.min_interval_ms)
                .unwrap_or(config.auto_spin.default_interval_ms),
            last_symbols,
            last_win: number(raw, "lastWin", 0.0).unwrap_or(0.0),
            last_multiplier: whole(raw, "lastMultiplier", 1)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(1),
            last_message: raw
                .get("lastMessage")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| WELCOME_MESSAGE.to_string()),
            total_winnings: number(raw, "totalWinnings", 0.0).unwrap_or(0.0),
            last_spin_id: raw
                .get("lastSpinId")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    /// Parses and sanitizes a stored document; unparseable text yields `None`.
    pub fn from_json(
        raw: &str,
        config: &GameConfig,
        mode: SanitizeMode,
        rng: &mut dyn RandomSource,
    ) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        Self::sanitize(&value, config, mode, rng)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// Numbers may arrive as JSON numbers or numeric strings.
fn raw_number(raw: &Map<String, Value>, key: &str) -> Option<f64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn number(raw: &Map<String, Value>, key: &str, min: f64) -> Option<f64> {
    raw_number(raw, key)
        .filter(|v| v.is_finite() && *v >= min)
        .map(round_cents)
}

fn whole(raw: &Map<String, Value>, key: &str, min: u64) -> Option<u64> {
    raw_number(raw, key)
        .filter(|v| v.is_finite() && v.fract() == 0.0 && *v >= min as f64 && *v <= u64::MAX as f64)
        .map(|v| v as u64)
}

fn flag(raw: &Map<String, Value>, key: &str) -> bool {
    raw.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn symbols(raw: &Map<String, Value>, config: &GameConfig) -> Option<Vec<String>> {
    let items = raw.get("lastSymbols")?.as_array()?;
    if items.len() != config.reels {
        return None;
    }
    items
        .iter()
        .map(|v| {
            v.as_str()
                .filter(|name| config.symbols.contains(name))
                .map(str::to_string)
        })
        .collect()
}
