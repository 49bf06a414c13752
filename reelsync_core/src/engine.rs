use crate::{
    config::GameConfig,
    paytable::{round_cents, BonusTable, Paytable},
    rng::RandomSource,
    symbols::SymbolSet,
};

#[derive(Debug, Clone)]
pub struct EngineParams {
    pub reels: usize,
    pub symbols: SymbolSet,
    pub paytable: Paytable,
    pub bonus: BonusTable,
    pub win_bias: Option<f64>,
}

impl EngineParams {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            reels: config.reels,
            symbols: config.symbols.clone(),
            paytable: config.paytable(),
            bonus: config.bonus_multipliers.clone(),
            win_bias: config.win_bias,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpinOutcome {
    pub targets: Vec<String>,
    pub base_payout: f64,
    pub multiplier: u32,
    pub payout: f64,
}

fn draw_symbol(rng: &mut dyn RandomSource, symbols: &SymbolSet) -> String {
    symbols
        .pick(rng.next_unit())
        .map(|s| s.name.clone())
        .unwrap_or_default()
}

/// A random resting window, one symbol per reel.
pub fn resting_window(rng: &mut dyn RandomSource, symbols: &SymbolSet, reels: usize) -> Vec<String> {
    (0..reels).map(|_| draw_symbol(rng, symbols)).collect()
}

/// Chooses where each reel stops. With a win bias the full line is either
/// forced or suppressed, so wins land at exactly the configured rate.
pub fn pick_targets(rng: &mut dyn RandomSource, params: &EngineParams) -> Vec<String> {
    let Some(bias) = params.win_bias else {
        return resting_window(rng, &params.symbols, params.reels);
    };
    if rng.next_unit() < bias {
        let winner = draw_symbol(rng, &params.symbols);
        return vec![winner; params.reels];
    }
    let mut targets = resting_window(rng, &params.symbols, params.reels);
    if params.reels > 1 && params.symbols.len() > 1 {
        while targets.iter().all(|s| *s == targets[0]) {
            let last = params.reels - 1;
            targets[last] = draw_symbol(rng, &params.symbols);
        }
    }
    targets
}

/// Only rolled when a base payout exists.
pub fn roll_bonus_multiplier(rng: &mut dyn RandomSource, bonus: &BonusTable) -> u32 {
    bonus.resolve(rng.next_unit())
}

pub fn settle(
    rng: &mut dyn RandomSource,
    params: &EngineParams,
    targets: Vec<String>,
    wager: f64,
) -> SpinOutcome {
    let base_payout = params.paytable.payout(&targets, wager);
    let multiplier = if base_payout > 0.0 {
        roll_bonus_multiplier(rng, &params.bonus)
    } else {
        1
    };
    SpinOutcome {
        targets,
        base_payout,
        multiplier,
        payout: round_cents(base_payout * multiplier as f64),
    }
}

/// Convenience: pick targets and settle them in one step.
pub fn spin_once(rng: &mut dyn RandomSource, params: &EngineParams, wager: f64) -> SpinOutcome {
    let targets = pick_targets(rng, params);
    settle(rng, params, targets, wager)
}
