mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use reelsync_shared::{GameState, SpinEvent};
use reelsync_store::{
    MemoryOrigin, SpinRejection, Storage, StorageError, StorageWatch, Store, StoreError,
    INVALID_AMOUNT_MESSAGE, NO_WIN_MESSAGE, RESET_MESSAGE, SPINNING_MESSAGE,
};

use common::{config, past_settlement, Script, HAT, TICKET, TRAIN};

fn open(script: &Script) -> Store {
    Store::builder(config())
        .random_source(script.clone())
        .open()
        .unwrap()
}

fn record_spins(store: &Store) -> Arc<Mutex<Vec<SpinEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    // handle dropped on purpose: the callback stays registered
    let _ = store.on_spin(move |event| sink.lock().push(event.clone()));
    events
}

#[tokio::test(start_paused = true)]
async fn winning_spin_debits_then_credits() {
    let script = Script::default();
    let store = open(&script);
    let events = record_spins(&store);
    assert_eq!(store.get_state().balance, 20.0);

    script.push(&[TRAIN, TRAIN, TRAIN, 0.5]);
    let handle = store.spin().unwrap();
    assert_eq!(handle.targets, vec!["Train"; 3]);
    assert_eq!(handle.wager, 1.0);

    let state = store.get_state();
    assert_eq!(state.balance, 19.0);
    assert!(state.spinning);
    assert_eq!(state.last_message, SPINNING_MESSAGE);
    assert_eq!(state.last_spin_id.as_deref(), Some(handle.spin_id.as_str()));

    past_settlement(store.config()).await;
    let state = store.get_state();
    assert_eq!(state.balance, 44.0);
    assert!(!state.spinning);
    assert_eq!(state.last_win, 25.0);
    assert_eq!(state.last_multiplier, 1);
    assert_eq!(state.total_winnings, 25.0);
    assert_eq!(state.last_symbols, vec!["Train"; 3]);
    assert_eq!(state.last_message, "Train pays $25.00!");

    let events = events.lock();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], SpinEvent::Start { spin_id, .. } if *spin_id == handle.spin_id));
    assert_eq!(
        events[1],
        SpinEvent::Settle {
            targets: vec!["Train".into(); 3],
            spin_id: handle.spin_id.clone(),
            payout: 25.0,
            multiplier: 1,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn bonus_multiplier_scales_the_payout() {
    let script = Script::default();
    let store = open(&script);
    script.push(&[TRAIN, TRAIN, TRAIN, 0.12]);
    store.spin().unwrap();
    past_settlement(store.config()).await;

    let state = store.get_state();
    assert_eq!(state.balance, 94.0);
    assert_eq!(state.last_multiplier, 3);
    assert_eq!(state.last_win, 75.0);
    assert_eq!(state.last_message, "Train pays $25.00 x3!");
}

#[tokio::test(start_paused = true)]
async fn losing_spin_keeps_the_debit() {
    let script = Script::default();
    let store = open(&script);
    assert!(store.set_bet(2.5));
    assert!(store.set_bet_multiplier(2));
    script.push(&[TRAIN, HAT, TICKET]);
    let handle = store.spin().unwrap();
    assert_eq!(handle.wager, 5.0);
    past_settlement(store.config()).await;

    let state = store.get_state();
    assert_eq!(state.balance, 15.0);
    assert_eq!(state.last_win, 0.0);
    assert_eq!(state.last_message, NO_WIN_MESSAGE);
    assert_eq!(state.last_symbols, vec!["Train", "Hat", "Ticket"]);
}

#[tokio::test(start_paused = true)]
async fn spin_rejections_only_touch_the_message() {
    let script = Script::default();
    let store = open(&script);
    assert!(store.set_bet(21));
    let before = store.get_state();
    let rejection = store.spin().unwrap_err();
    assert_eq!(
        rejection,
        SpinRejection::InsufficientCredits {
            balance: 20.0,
            wager: 21.0
        }
    );
    let after = store.get_state();
    assert!(after.last_message.contains("Insufficient credits"));
    assert_eq!(
        after,
        GameState {
            last_message: after.last_message.clone(),
            ..before
        }
    );

    assert!(store.set_bet(1));
    store.spin().unwrap();
    assert_eq!(store.spin().unwrap_err(), SpinRejection::AlreadySpinning);
    assert_eq!(store.get_state().balance, 19.0);
    assert_eq!(store.get_state().last_message, "Spin already in progress.");
}

#[tokio::test(start_paused = true)]
async fn empty_balance_cannot_spin() {
    let script = Script::default();
    let store = open(&script);
    assert!(store.set_bet(20));
    script.push(&[TRAIN, HAT, TICKET]);
    store.spin().unwrap();
    past_settlement(store.config()).await;
    assert_eq!(store.get_state().balance, 0.0);

    assert!(store.set_bet(1));
    assert!(matches!(
        store.spin(),
        Err(SpinRejection::InsufficientCredits { .. })
    ));
    let state = store.get_state();
    assert_eq!(state.balance, 0.0);
    assert!(!state.spinning);
    assert_eq!(state.last_message, "Insufficient credits to spin.");
}

#[tokio::test(start_paused = true)]
async fn add_balance_sanitizes_input() {
    let store = open(&Script::default());
    assert!(!store.add_balance("abc"));
    assert_eq!(store.get_state().balance, 20.0);
    assert_eq!(store.get_state().last_message, INVALID_AMOUNT_MESSAGE);

    assert!(!store.add_balance(-5));
    assert!(!store.add_balance(0.0));
    assert_eq!(store.get_state().balance, 20.0);

    assert!(store.add_balance("5"));
    assert_eq!(store.get_state().balance, 25.0);
    assert_eq!(store.get_state().last_message, "Added $5.00. Ready to spin!");

    assert!(store.add_balance("$5"));
    assert!(store.add_balance(0.114));
    assert_eq!(store.get_state().balance, 30.11);
}

#[tokio::test(start_paused = true)]
async fn amounts_that_overflow_are_refused() {
    let store = open(&Script::default());
    assert!(!store.add_balance(1e307));
    assert!(!store.add_balance(f64::INFINITY));
    assert!(!store.set_bet(1e307));
    let state = store.get_state();
    assert_eq!(state.balance, 20.0);
    assert_eq!(state.current_bet, 1.0);
    let json = state.to_json().unwrap();
    assert!(!json.contains("\"balance\":null"));
    assert!(!json.contains("\"currentBet\":null"));

    // each step alone is finite, the sum is not
    assert!(store.add_balance(1.7e306));
    assert!(!store.add_balance(1.7e306));
    assert_eq!(store.get_state().last_message, INVALID_AMOUNT_MESSAGE);
    assert!(store.get_state().balance.is_finite());
}

#[tokio::test(start_paused = true)]
async fn wager_that_is_not_positive_is_refused() {
    let store = open(&Script::default());
    assert!(store.set_bet(1e306));
    assert!(store.set_bet_multiplier(1000));
    assert_eq!(store.spin().unwrap_err(), SpinRejection::InvalidWager);
    let state = store.get_state();
    assert_eq!(state.balance, 20.0);
    assert!(!state.spinning);
    assert_eq!(state.last_message, "Choose a bet greater than $0 to play.");

    let mut tiny = config();
    tiny.min_bet = 0.004;
    let store = Store::builder(tiny).open().unwrap();
    assert!(store.set_bet(0.004));
    assert_eq!(store.get_state().wager(), 0.0);
    assert_eq!(store.spin().unwrap_err(), SpinRejection::InvalidWager);
    assert_eq!(store.get_state().balance, 20.0);
    assert_eq!(store.get_state().last_message, "Choose a bet greater than $0 to play.");
}

#[tokio::test(start_paused = true)]
async fn invalid_bets_and_multipliers_are_refused() {
    let store = open(&Script::default());
    assert!(!store.set_bet(0.25));
    assert!(!store.set_bet("free"));
    assert!(!store.set_bet(f64::NAN));
    let state = store.get_state();
    assert_eq!(state.current_bet, 1.0);
    assert_eq!(state.last_message, "Choose a bet of at least $0.50.");

    assert!(store.set_bet("$2.50"));
    assert_eq!(store.get_state().last_message, "Bet set to $2.50");

    assert!(!store.set_bet_multiplier(0));
    assert!(!store.set_bet_multiplier(1.5));
    assert_eq!(store.get_state().bet_multiplier, 1);
    assert!(store.set_bet_multiplier("4"));
    assert_eq!(store.get_state().bet_multiplier, 4);
    assert_eq!(store.get_state().last_message, "Multiplier set to x4");
    assert_eq!(store.get_state().wager(), 10.0);
}

#[tokio::test(start_paused = true)]
async fn auto_spin_settings_are_advisory() {
    let store = open(&Script::default());
    store.set_auto_spin(true);
    assert!(store.get_state().auto_spin);
    assert!(!store.set_auto_spin_interval(100));
    assert_eq!(store.get_state().auto_spin_interval, 1500);
    assert!(store.set_auto_spin_interval(900));
    assert_eq!(store.get_state().auto_spin_interval, 900);
    // flags alone never start a spin
    tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    assert_eq!(store.get_state().balance, 20.0);
}

#[tokio::test(start_paused = true)]
async fn reset_voids_the_spin_in_flight() {
    let script = Script::default();
    let store = open(&script);
    let events = record_spins(&store);
    assert!(store.add_balance(30));
    assert!(store.set_bet_multiplier(3));
    store.set_auto_spin(true);
    assert!(store.set_auto_spin_interval(2000));

    script.push(&[TRAIN, TRAIN, TRAIN]);
    store.spin().unwrap();
    store.reset();

    past_settlement(store.config()).await;
    let state = store.get_state();
    assert_eq!(state.balance, 20.0);
    assert_eq!(state.current_bet, 1.0);
    assert_eq!(state.bet_multiplier, 1);
    assert_eq!(state.total_winnings, 0.0);
    assert!(!state.spinning);
    assert!(!state.auto_spin);
    assert_eq!(state.auto_spin_interval, 1500);
    assert_eq!(state.last_spin_id, None);
    assert_eq!(state.last_message, RESET_MESSAGE);
    assert_eq!(state.last_symbols.len(), 3);
    // only the start was ever announced
    assert_eq!(events.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn state_survives_a_reload_without_flags() {
    let origin = MemoryOrigin::new();
    let script = Script::default();
    let first = Store::builder(config())
        .storage(origin.open())
        .random_source(script.clone())
        .open()
        .unwrap();
    assert!(first.add_balance(10));
    first.set_auto_spin(true);
    script.push(&[TRAIN, HAT, TICKET]);
    first.spin().unwrap();
    let persisted = first.get_state();
    first.shutdown();
    drop(first);

    let second = Store::builder(config())
        .storage(origin.open())
        .open()
        .unwrap();
    let reloaded = second.get_state();
    assert!(!reloaded.spinning);
    assert!(!reloaded.auto_spin);
    assert_eq!(
        reloaded,
        GameState {
            spinning: false,
            auto_spin: false,
            ..persisted
        }
    );
}

#[tokio::test(start_paused = true)]
async fn corrupt_storage_starts_fresh() {
    let origin = MemoryOrigin::new();
    origin.put("reelsync-state", "{\"balance\": \"lots\", \"currentBet\": 3");
    let store = Store::builder(config())
        .storage(origin.open())
        .open()
        .unwrap();
    assert_eq!(store.get_state().balance, 20.0);

    origin.put("reelsync-state", r#"{"balance": 42.5, "betMultiplier": -1}"#);
    let store = Store::builder(config())
        .storage(origin.open())
        .open()
        .unwrap();
    let state = store.get_state();
    assert_eq!(state.balance, 42.5);
    assert_eq!(state.bet_multiplier, 1);
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_current_state_then_changes() {
    let store = open(&Script::default());
    let seen = Arc::new(Mutex::new(Vec::<f64>::new()));
    let sink = seen.clone();
    let subscription = store.subscribe(move |state| sink.lock().push(state.balance));
    assert_eq!(*seen.lock(), vec![20.0]);

    assert!(store.add_balance(1));
    assert!(store.add_balance(2));
    assert_eq!(*seen.lock(), vec![20.0, 21.0, 23.0]);

    subscription.unsubscribe();
    assert!(store.add_balance(3));
    assert_eq!(seen.lock().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn subscribers_may_call_back_into_the_store() {
    let store = open(&Script::default());
    let handle = store.clone();
    let _subscription = store.subscribe(move |state| {
        if state.auto_spin && !state.spinning && state.balance >= 20.0 {
            let _ = handle.spin();
        }
    });
    store.set_auto_spin(true);
    let state = store.get_state();
    assert!(state.spinning);
    assert_eq!(state.balance, 19.0);
}

struct BrokenStorage;

impl Storage for BrokenStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Io {
            path: "/nowhere".into(),
            source: std::io::Error::other("disk on fire"),
        })
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        self.get("").map(|_| ())
    }

    fn watch(&self) -> Option<StorageWatch> {
        None
    }
}

#[tokio::test(start_paused = true)]
async fn storage_failures_are_not_fatal() {
    let script = Script::default();
    let store = Store::builder(config())
        .storage(BrokenStorage)
        .random_source(script.clone())
        .open()
        .unwrap();
    assert_eq!(store.transport_kind(), reelsync_store::TransportKind::Detached);
    assert!(store.add_balance(5));
    script.push(&[TRAIN, TRAIN, TRAIN, 0.5]);
    store.spin().unwrap();
    past_settlement(store.config()).await;
    assert_eq!(store.get_state().balance, 49.0);
}

#[test]
fn opening_needs_a_runtime() {
    let result = Store::builder(config()).open();
    assert!(matches!(result, Err(StoreError::NoRuntime)));
}

#[tokio::test]
async fn invalid_config_is_refused() {
    let mut config = config();
    config.reels = 0;
    assert!(matches!(
        Store::builder(config).open(),
        Err(StoreError::Config(_))
    ));
}
