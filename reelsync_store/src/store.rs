use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use reelsync_core::{round_cents, EngineParams, EntropyRng, GameConfig, RandomSource};
use reelsync_shared::{Envelope, GameState, SanitizeMode, SpinEvent, SyncMessage};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{SpinRejection, StoreError};
use crate::input::IntoAmount;
use crate::lifecycle::{Lifecycle, SpinHandle};
use crate::listeners::{Listeners, Subscription};
use crate::storage::{FileStorage, MemoryOrigin, Storage};
use crate::sync::{run_inbound, Synchronizer};
use crate::transport::{select_transport, ChannelHub, TransportKind};

pub const RESET_MESSAGE: &str = "Machine reset. Insert credits to play.";
pub const INVALID_AMOUNT_MESSAGE: &str = "Enter a valid amount to add.";

// Lock order: lifecycle, then state, then rng.
pub(crate) struct StoreInner {
    pub(crate) config: GameConfig,
    pub(crate) params: EngineParams,
    pub(crate) rng: Mutex<Box<dyn RandomSource>>,
    pub(crate) state: Mutex<GameState>,
    pub(crate) lifecycle: Mutex<Lifecycle>,
    pub(crate) subscribers: Listeners<GameState>,
    pub(crate) spin_listeners: Listeners<SpinEvent>,
    pub(crate) sync: Synchronizer,
    pub(crate) runtime: Handle,
    storage: Arc<dyn Storage>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl StoreInner {
    fn persist(&self, state: &GameState) {
        let raw = match state.to_json() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to serialize game state");
                return;
            }
        };
        if let Err(e) = self.storage.set(&self.config.sync.state_key, &raw) {
            warn!(error = %e, "failed to persist game state");
        }
    }

    /// Persists the snapshot and optionally fans it out. Called with the
    /// state lock held so peers see mutations in commit order.
    pub(crate) fn commit(&self, state: &GameState, broadcast: bool) {
        self.persist(state);
        if broadcast {
            self.sync.publish(SyncMessage::State(state.clone()));
        }
    }

    /// Applies a local mutation, then notifies subscribers outside the lock.
    fn mutate<R>(&self, f: impl FnOnce(&mut GameState) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self.state.lock();
            let result = f(&mut state);
            self.commit(&state, true);
            (result, state.clone())
        };
        self.subscribers.emit(&snapshot);
        result
    }

    fn reset(&self) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.cancel_all();
        let snapshot = {
            let mut state = self.state.lock();
            let fresh = GameState::initial(&self.config, &mut **self.rng.lock());
            *state = GameState {
                last_message: RESET_MESSAGE.to_string(),
                ..fresh
            };
            self.commit(&state, true);
            state.clone()
        };
        drop(lifecycle);
        info!("machine reset");
        self.subscribers.emit(&snapshot);
    }

    /// Last-write-wins merge of a peer snapshot. Never re-broadcast.
    fn merge_remote(self: &Arc<Self>, remote: GameState) {
        let mut lifecycle = self.lifecycle.lock();
        let snapshot = {
            let mut state = self.state.lock();
            if *state == remote {
                return;
            }
            if lifecycle.is_stale(&remote) {
                debug!("ignoring snapshot of a spin that already settled");
                return;
            }
            *state = remote;
            self.persist(&state);
            state.clone()
        };
        self.watch_merged_spin(&mut lifecycle, &snapshot);
        drop(lifecycle);
        self.subscribers.emit(&snapshot);
    }

    pub(crate) fn receive_envelope(self: &Arc<Self>, raw: &str) {
        let decoded = Envelope::decode(raw, &self.config, &mut **self.rng.lock());
        let envelope = match decoded {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, "dropping sync message");
                return;
            }
        };
        if !envelope.is_for(self.sync.instance_id()) {
            return;
        }
        match envelope.message {
            SyncMessage::Hello => {
                let snapshot = self.state.lock().clone();
                debug!(peer = %envelope.sender_id, "answering hello");
                self.sync
                    .publish_reply(SyncMessage::State(snapshot), &envelope.sender_id);
            }
            SyncMessage::State(state) => self.merge_remote(state),
            SyncMessage::SpinStart(start) => self.observe_remote_start(start),
            SyncMessage::SpinSettle(settle) => self.observe_remote_settle(settle),
        }
    }

    /// A peer rewrote the stored record (storage-signal transport).
    pub(crate) fn receive_state_record(self: &Arc<Self>, raw: &str) {
        let remote =
            GameState::from_json(raw, &self.config, SanitizeMode::Peer, &mut **self.rng.lock());
        match remote {
            Some(remote) => self.merge_remote(remote),
            None => debug!("ignoring unreadable state record"),
        }
    }

    fn stop_tasks(&self) {
        self.lifecycle.lock().cancel_all();
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.lifecycle.get_mut().cancel_all();
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

fn rehydrate(storage: &dyn Storage, config: &GameConfig, rng: &mut dyn RandomSource) -> GameState {
    match storage.get(&config.sync.state_key) {
        Ok(Some(raw)) => GameState::from_json(&raw, config, SanitizeMode::Rehydrate, rng)
            .unwrap_or_else(|| {
                warn!("stored game state is unreadable, starting fresh");
                GameState::initial(config, rng)
            }),
        Ok(None) => GameState::initial(config, rng),
        Err(e) => {
            warn!(error = %e, "failed to read stored game state");
            GameState::initial(config, rng)
        }
    }
}

enum StorageChoice {
    Memory,
    Shared(Arc<dyn Storage>),
    Directory(PathBuf),
}

pub struct StoreBuilder {
    config: GameConfig,
    storage: StorageChoice,
    hub: Option<ChannelHub>,
    rng: Option<Box<dyn RandomSource>>,
}

impl StoreBuilder {
    pub fn storage(self, storage: impl Storage + 'static) -> Self {
        self.shared_storage(Arc::new(storage))
    }

    pub fn shared_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = StorageChoice::Shared(storage);
        self
    }

    /// Directory-backed records, opened by [`StoreBuilder::open`].
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage = StorageChoice::Directory(dir.into());
        self
    }

    pub fn channel_hub(mut self, hub: &ChannelHub) -> Self {
        self.hub = Some(hub.clone());
        self
    }

    pub fn random_source(mut self, rng: impl RandomSource + 'static) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    /// Rehydrates, picks a transport, starts listening and greets peers.
    /// Must be called from within a tokio runtime.
    pub fn open(self) -> Result<Store, StoreError> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        let storage: Arc<dyn Storage> = match self.storage {
            StorageChoice::Memory => Arc::new(MemoryOrigin::new().open()),
            StorageChoice::Shared(storage) => storage,
            StorageChoice::Directory(dir) => Arc::new(FileStorage::open(dir)?),
        };
        let mut rng = self
            .rng
            .unwrap_or_else(|| Box::new(EntropyRng::new()) as Box<dyn RandomSource>);
        let state = rehydrate(storage.as_ref(), &self.config, rng.as_mut());

        let transport = select_transport(self.hub.as_ref(), &storage, &self.config.sync);
        let sync = Synchronizer::new(transport);
        let inbox = sync.listen();

        let inner = Arc::new(StoreInner {
            params: EngineParams::from_config(&self.config),
            config: self.config,
            rng: Mutex::new(rng),
            state: Mutex::new(state),
            lifecycle: Mutex::new(Lifecycle::default()),
            subscribers: Listeners::new(),
            spin_listeners: Listeners::new(),
            sync,
            runtime: runtime.clone(),
            storage,
            listener: Mutex::new(None),
        });
        let listener = runtime.spawn(run_inbound(inbox, Arc::downgrade(&inner)));
        *inner.listener.lock() = Some(listener);
        inner.sync.publish(SyncMessage::Hello);

        info!(
            instance = %inner.sync.instance_id(),
            transport = ?inner.sync.transport_kind(),
            "context opened"
        );
        Ok(Store { inner })
    }
}

/// One context's handle on the shared game. Clones share the same context.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Defaults to a private in-memory origin and OS entropy.
    pub fn builder(config: GameConfig) -> StoreBuilder {
        StoreBuilder {
            config,
            storage: StorageChoice::Memory,
            hub: None,
            rng: None,
        }
    }

    pub fn get_state(&self) -> GameState {
        self.inner.state.lock().clone()
    }

    pub fn config(&self) -> &GameConfig {
        &self.inner.config
    }

    pub fn instance_id(&self) -> &str {
        self.inner.sync.instance_id()
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.inner.sync.transport_kind()
    }

    pub fn set_bet(&self, amount: impl IntoAmount) -> bool {
        let min_bet = self.inner.config.min_bet;
        let bet = amount
            .into_amount()
            .filter(|v| *v >= min_bet)
            .map(round_cents)
            .filter(|v| v.is_finite());
        self.inner.mutate(|state| match bet {
            Some(bet) => {
                state.current_bet = bet;
                state.last_message = format!("Bet set to ${bet:.2}");
                true
            }
            None => {
                state.last_message = format!("Choose a bet of at least ${min_bet:.2}.");
                false
            }
        })
    }

    pub fn set_bet_multiplier(&self, value: impl IntoAmount) -> bool {
        let multiplier = value
            .into_amount()
            .filter(|v| v.is_finite() && v.fract() == 0.0 && *v >= 1.0 && *v <= u32::MAX as f64)
            .map(|v| v as u32);
        self.inner.mutate(|state| match multiplier {
            Some(multiplier) => {
                state.bet_multiplier = multiplier;
                state.last_message = format!("Multiplier set to x{multiplier}");
                true
            }
            None => {
                state.last_message = "Choose a whole multiplier of at least x1.".to_string();
                false
            }
        })
    }

    /// Accepts numbers or text like `"$5"`.
    pub fn add_balance(&self, amount: impl IntoAmount) -> bool {
        let amount = amount
            .into_amount()
            .map(round_cents)
            .filter(|v| v.is_finite() && *v > 0.0);
        self.inner.mutate(|state| {
            let next = amount
                .map(|amount| (amount, round_cents(state.balance + amount)))
                .filter(|(_, next)| next.is_finite());
            match next {
                Some((amount, next)) => {
                    state.balance = next;
                    state.last_message = format!("Added ${amount:.2}. Ready to spin!");
                    true
                }
                None => {
                    state.last_message = INVALID_AMOUNT_MESSAGE.to_string();
                    false
                }
            }
        })
    }

    /// Back to configured defaults; a spin in flight is voided, not refunded.
    pub fn reset(&self) {
        self.inner.reset();
    }

    pub fn spin(&self) -> Result<SpinHandle, SpinRejection> {
        self.inner.begin_spin()
    }

    pub fn set_auto_spin(&self, active: bool) {
        self.inner.mutate(|state| state.auto_spin = active);
    }

    pub fn set_auto_spin_interval(&self, interval_ms: u64) -> bool {
        let min = self.inner.config.auto_spin.min_interval_ms;
        self.inner.mutate(|state| {
            if interval_ms < min {
                state.last_message = format!("Auto-spin interval must be at least {min} ms.");
                return false;
            }
            state.auto_spin_interval = interval_ms;
            true
        })
    }

    /// `callback` sees the current state right away and every change after.
    pub fn subscribe(&self, callback: impl Fn(&GameState) + Send + Sync + 'static) -> Subscription {
        let callback = Arc::new(callback);
        let registered = callback.clone();
        let subscription = self.inner.subscribers.add(move |state| (*registered)(state));
        let snapshot = self.get_state();
        (*callback)(&snapshot);
        subscription
    }

    pub fn on_spin(&self, callback: impl Fn(&SpinEvent) + Send + Sync + 'static) -> Subscription {
        self.inner.spin_listeners.add(callback)
    }

    /// Stops listening to peers and cancels scheduled work. A spin in flight
    /// is left for peers' watchdogs or the next rehydrate to clear.
    pub fn shutdown(&self) {
        self.inner.stop_tasks();
        debug!(instance = %self.instance_id(), "context shut down");
    }
}
