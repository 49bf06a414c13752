//! Spin lifecycle: `Idle -> Committed -> Spinning -> Settled -> Idle`.
//!
//! `spin()` debits and announces under the state lock, then a settlement task
//! keyed by spin id credits the payout once the reels have stopped. Remote
//! spins are tracked here too so a peer that vanishes mid-spin does not leave
//! the machine stuck.

use std::sync::{Arc, Weak};
use std::time::Duration;

use reelsync_core::{pick_targets, random_id, round_cents};
use reelsync_shared::{GameState, SpinEvent, SpinSettle, SpinStart, SyncMessage};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SpinRejection;
use crate::store::StoreInner;

pub const SPINNING_MESSAGE: &str = "Spinning...";
pub const NO_WIN_MESSAGE: &str = "No win. Try again!";
pub const INTERRUPTED_MESSAGE: &str = "Spin interrupted. Ready to spin.";

/// What the caller of `spin()` gets back: the reels to animate towards.
#[derive(Debug, Clone, PartialEq)]
pub struct SpinHandle {
    pub targets: Vec<String>,
    pub spin_id: String,
    pub wager: f64,
}

struct PendingSettlement {
    spin_id: String,
    targets: Vec<String>,
    wager: f64,
    task: JoinHandle<()>,
}

struct RemoteWatch {
    spin_id: String,
    task: JoinHandle<()>,
}

#[derive(Default)]
pub(crate) struct Lifecycle {
    pending: Option<PendingSettlement>,
    remote_watch: Option<RemoteWatch>,
    // spin ids already announced to local listeners
    last_started: Option<String>,
    last_settled: Option<String>,
}

impl Lifecycle {
    /// Aborts the local settlement and the remote watchdog.
    pub(crate) fn cancel_all(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(spin_id = %pending.spin_id, "cancelling pending settlement");
            pending.task.abort();
        }
        if let Some(watch) = self.remote_watch.take() {
            watch.task.abort();
        }
    }
}

impl Lifecycle {
    /// A snapshot still spinning on a spin this context already saw settle
    /// arrived out of order.
    pub(crate) fn is_stale(&self, state: &GameState) -> bool {
        state.spinning
            && state.last_spin_id.is_some()
            && state.last_spin_id == self.last_settled
    }
}

pub(crate) fn settle_message(targets: &[String], base_payout: f64, multiplier: u32) -> String {
    match targets.first() {
        Some(symbol) if base_payout > 0.0 => {
            let bonus = if multiplier > 1 {
                format!(" x{multiplier}")
            } else {
                String::new()
            };
            format!("{symbol} pays ${base_payout:.2}{bonus}!")
        }
        _ => NO_WIN_MESSAGE.to_string(),
    }
}

fn apply_settlement(state: &mut GameState, settle: &SpinSettle) {
    let base = round_cents(settle.payout / settle.multiplier.max(1) as f64);
    state.balance = round_cents(state.balance + settle.payout);
    state.last_win = settle.payout;
    state.last_multiplier = settle.multiplier;
    state.total_winnings = round_cents(state.total_winnings + settle.payout);
    state.last_symbols = settle.targets.clone();
    state.spinning = false;
    state.last_message = settle_message(&settle.targets, base, settle.multiplier);
}

impl StoreInner {
    pub(crate) fn begin_spin(self: &Arc<Self>) -> Result<SpinHandle, SpinRejection> {
        let mut lifecycle = self.lifecycle.lock();
        let mut state = self.state.lock();

        let wager = state.wager();
        let rejection = if state.spinning {
            Some(SpinRejection::AlreadySpinning)
        } else if !wager.is_finite() || wager <= 0.0 {
            Some(SpinRejection::InvalidWager)
        } else if state.balance < wager {
            Some(SpinRejection::InsufficientCredits {
                balance: state.balance,
                wager,
            })
        } else {
            None
        };
        if let Some(rejection) = rejection {
            state.last_message = rejection.to_string();
            self.commit(&state, true);
            let snapshot = state.clone();
            drop(state);
            drop(lifecycle);
            debug!(?rejection, "spin rejected");
            self.subscribers.emit(&snapshot);
            return Err(rejection);
        }

        let targets = pick_targets(&mut **self.rng.lock(), &self.params);
        let spin_id = random_id();
        state.balance = round_cents(state.balance - wager);
        state.spinning = true;
        state.last_win = 0.0;
        state.last_multiplier = 1;
        state.last_message = SPINNING_MESSAGE.to_string();
        state.last_spin_id = Some(spin_id.clone());
        self.commit(&state, true);
        let snapshot = state.clone();
        drop(state);

        let start = SpinStart {
            targets: targets.clone(),
            wager,
            spin_id: spin_id.clone(),
        };
        self.sync.publish(SyncMessage::SpinStart(start.clone()));

        lifecycle.cancel_all();
        lifecycle.last_started = Some(spin_id.clone());
        lifecycle.pending = Some(PendingSettlement {
            spin_id: spin_id.clone(),
            targets: targets.clone(),
            wager,
            task: self.schedule(self.config.settle_delay(), spin_id.clone(), |inner, id| {
                inner.finish_spin(id)
            }),
        });
        drop(lifecycle);

        debug!(%spin_id, wager, "spin committed");
        self.subscribers.emit(&snapshot);
        self.spin_listeners.emit(&SpinEvent::from(&start));
        Ok(SpinHandle {
            targets,
            spin_id,
            wager,
        })
    }

    /// Runs `f` after `delay` unless the store is gone by then.
    fn schedule(
        self: &Arc<Self>,
        delay: Duration,
        spin_id: String,
        f: fn(&StoreInner, &str),
    ) -> JoinHandle<()> {
        let store: Weak<StoreInner> = Arc::downgrade(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = store.upgrade() {
                f(&inner, &spin_id);
            }
        })
    }

    /// Settlement for a spin this context started.
    pub(crate) fn finish_spin(&self, spin_id: &str) {
        let mut lifecycle = self.lifecycle.lock();
        let pending = match lifecycle.pending.take() {
            Some(pending) if pending.spin_id == spin_id => pending,
            other => {
                lifecycle.pending = other;
                debug!(spin_id, "ignoring superseded settlement");
                return;
            }
        };

        let mut state = self.state.lock();
        if !state.spinning || state.last_spin_id.as_deref() != Some(spin_id) {
            debug!(spin_id, "spin was voided before it settled");
            return;
        }
        let outcome = reelsync_core::settle(
            &mut **self.rng.lock(),
            &self.params,
            pending.targets,
            pending.wager,
        );
        let settle = SpinSettle {
            targets: outcome.targets.clone(),
            spin_id: spin_id.to_string(),
            payout: outcome.payout,
            multiplier: outcome.multiplier,
        };
        apply_settlement(&mut state, &settle);
        state.last_message =
            settle_message(&outcome.targets, outcome.base_payout, outcome.multiplier);
        self.commit(&state, true);
        let snapshot = state.clone();
        drop(state);

        self.sync.publish(SyncMessage::SpinSettle(settle.clone()));
        lifecycle.last_settled = Some(spin_id.to_string());
        drop(lifecycle);

        info!(spin_id, payout = outcome.payout, multiplier = outcome.multiplier, "spin settled");
        self.subscribers.emit(&snapshot);
        self.spin_listeners.emit(&SpinEvent::from(&settle));
    }

    fn arm_watchdog(self: &Arc<Self>, lifecycle: &mut Lifecycle, spin_id: &str) {
        if let Some(previous) = lifecycle.remote_watch.take() {
            previous.task.abort();
        }
        lifecycle.remote_watch = Some(RemoteWatch {
            spin_id: spin_id.to_string(),
            task: self.schedule(
                self.config.remote_settle_deadline(),
                spin_id.to_string(),
                |inner, id| inner.expire_remote_spin(id),
            ),
        });
    }

    /// A merged snapshot may show a spin this context never saw start, e.g.
    /// one caught through the handshake. Watch it like an announced one.
    pub(crate) fn watch_merged_spin(self: &Arc<Self>, lifecycle: &mut Lifecycle, state: &GameState) {
        let Some(spin_id) = state.last_spin_id.as_deref().filter(|_| state.spinning) else {
            return;
        };
        let known = lifecycle
            .pending
            .as_ref()
            .is_some_and(|pending| pending.spin_id == spin_id)
            || lifecycle
                .remote_watch
                .as_ref()
                .is_some_and(|watch| watch.spin_id == spin_id)
            || lifecycle.last_settled.as_deref() == Some(spin_id);
        if !known {
            debug!(spin_id, "watching spin seen in a peer snapshot");
            self.arm_watchdog(lifecycle, spin_id);
        }
    }

    pub(crate) fn observe_remote_start(self: &Arc<Self>, start: SpinStart) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.last_started.as_deref() == Some(start.spin_id.as_str()) {
                return;
            }
            lifecycle.last_started = Some(start.spin_id.clone());
            self.arm_watchdog(&mut lifecycle, &start.spin_id);
        }
        debug!(spin_id = %start.spin_id, "remote spin started");
        self.spin_listeners.emit(&SpinEvent::from(&start));
    }

    pub(crate) fn observe_remote_settle(&self, settle: SpinSettle) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.last_settled.as_deref() == Some(settle.spin_id.as_str()) {
            return;
        }
        lifecycle.last_settled = Some(settle.spin_id.clone());
        if lifecycle
            .remote_watch
            .as_ref()
            .is_some_and(|watch| watch.spin_id == settle.spin_id)
        {
            if let Some(watch) = lifecycle.remote_watch.take() {
                watch.task.abort();
            }
        }

        // normally the settled state arrived first; this covers a lost one
        let snapshot = {
            let mut state = self.state.lock();
            if state.spinning && state.last_spin_id.as_deref() == Some(settle.spin_id.as_str()) {
                apply_settlement(&mut state, &settle);
                self.commit(&state, false);
                Some(state.clone())
            } else {
                None
            }
        };
        drop(lifecycle);

        if let Some(snapshot) = snapshot {
            self.subscribers.emit(&snapshot);
        }
        self.spin_listeners.emit(&SpinEvent::from(&settle));
    }

    /// Watchdog expiry: the context that started `spin_id` never settled it.
    pub(crate) fn expire_remote_spin(&self, spin_id: &str) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle
            .remote_watch
            .as_ref()
            .is_some_and(|watch| watch.spin_id == spin_id)
        {
            lifecycle.remote_watch = None;
        }
        if lifecycle.pending.is_some() || lifecycle.last_settled.as_deref() == Some(spin_id) {
            return;
        }
        let snapshot = {
            let mut state = self.state.lock();
            if !state.spinning || state.last_spin_id.as_deref() != Some(spin_id) {
                return;
            }
            state.spinning = false;
            state.last_message = INTERRUPTED_MESSAGE.to_string();
            self.commit(&state, false);
            state.clone()
        };
        drop(lifecycle);

        warn!(spin_id, "spin origin went away before settling");
        self.subscribers.emit(&snapshot);
    }
}
