use crate::symbols::SymbolSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaytableEntry {
    pub symbol: String,
    pub payout_multiplier: f64,
}

/// Full-line payouts: every reel must show the same symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paytable {
    pub reels: usize,
    pub entries: Vec<PaytableEntry>,
}

impl Paytable {
    pub fn from_symbols(symbols: &SymbolSet, reels: usize) -> Self {
        Self {
            reels,
            entries: symbols
                .iter()
                .map(|s| PaytableEntry {
                    symbol: s.name.clone(),
                    payout_multiplier: s.payout,
                })
                .collect(),
        }
    }

    pub fn multiplier_for(&self, symbol: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.symbol == symbol)
            .map(|e| e.payout_multiplier)
    }

    /// Base payout before any bonus multiplier.
    pub fn payout(&self, window: &[String], wager: f64) -> f64 {
        if window.len() != self.reels || self.reels == 0 {
            return 0.0;
        }
        let first = &window[0];
        if window.iter().any(|s| s != first) {
            return 0.0;
        }
        self.multiplier_for(first)
            .map(|m| m * wager)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BonusBand {
    pub value: u32,
    pub chance: f64,
}

/// Bonus multipliers evaluated as cumulative probability bands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct BonusTable(pub Vec<BonusBand>);

impl BonusTable {
    pub fn default_bands() -> Self {
        Self(vec![
            BonusBand {
                value: 2,
                chance: 0.10,
            },
            BonusBand {
                value: 3,
                chance: 0.05,
            },
            BonusBand {
                value: 5,
                chance: 0.02,
            },
        ])
    }

    pub fn total_chance(&self) -> f64 {
        self.0.iter().map(|b| b.chance).sum()
    }

    /// First band whose cumulative chance exceeds `roll` wins, otherwise 1.
    pub fn resolve(&self, roll: f64) -> u32 {
        let mut cumulative = 0.0;
        for band in &self.0 {
            cumulative += band.chance;
            if roll < cumulative {
                return band.value;
            }
        }
        1
    }
}

impl Default for BonusTable {
    fn default() -> Self {
        Self::default_bands()
    }
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
