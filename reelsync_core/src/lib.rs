pub mod config;
pub mod engine;
pub mod paytable;
pub mod rng;
pub mod symbols;

pub use crate::config::{AutoSpinConfig, ConfigError, GameConfig, SyncConfig, TimingConfig};
pub use crate::engine::{
    pick_targets, resting_window, roll_bonus_multiplier, settle, spin_once, EngineParams,
    SpinOutcome,
};
pub use crate::paytable::{round_cents, BonusBand, BonusTable, Paytable, PaytableEntry};
pub use crate::rng::{derive_floats, derive_hash_hex, random_id, EntropyRng, RandomSource, SeededRng};
pub use crate::symbols::{Symbol, SymbolSet};
