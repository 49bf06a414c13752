#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reelsync_core::{GameConfig, RandomSource};

/// Random source the test feeds by hand; 0.5 once the script runs dry.
#[derive(Clone, Default)]
pub struct Script(Arc<Mutex<VecDeque<f64>>>);

impl Script {
    pub fn push(&self, values: &[f64]) {
        self.0.lock().extend(values.iter().copied());
    }
}

impl RandomSource for Script {
    fn next_unit(&mut self) -> f64 {
        self.0.lock().pop_front().unwrap_or(0.5)
    }
}

// Draws mapping onto the default symbol table
pub const TRAIN: f64 = 0.0;
pub const HAT: f64 = 0.7;
pub const TICKET: f64 = 0.9;

pub fn config() -> GameConfig {
    GameConfig::default()
}

/// Lets spawned listener tasks catch up without moving past any timer.
pub async fn drain() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub async fn past_settlement(config: &GameConfig) {
    tokio::time::sleep(config.settle_delay() + Duration::from_millis(10)).await;
    drain().await;
}
