use std::time::Duration;

use reelsync_store::{SpinRejection, Store};
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug)]
pub enum StopReason {
    Completed(u32),
    SwitchedOff,
    Rejected(SpinRejection),
}

/// Reactive auto-spin: whenever the machine is idle with auto-spin on, wait
/// the configured interval and spin again. Auto-spin is switched off on the
/// way out unless someone else already did.
pub async fn run(store: &Store, limit: Option<u32>) -> anyhow::Result<StopReason> {
    let (tx, mut rx) = watch::channel(store.get_state());
    let subscription = store.subscribe(move |state| {
        let _ = tx.send(state.clone());
    });

    let mut done = 0;
    let reason = loop {
        let state = rx.borrow_and_update().clone();
        if !state.auto_spin {
            break StopReason::SwitchedOff;
        }
        if state.spinning {
            rx.changed().await?;
            continue;
        }
        if limit.is_some_and(|limit| done >= limit) {
            break StopReason::Completed(done);
        }

        tokio::time::sleep(Duration::from_millis(state.auto_spin_interval)).await;
        // something may have changed during the pause
        let state = store.get_state();
        if !state.auto_spin || state.spinning {
            continue;
        }
        match store.spin() {
            Ok(handle) => {
                done += 1;
                debug!(spin_id = %handle.spin_id, done, "auto spin");
            }
            Err(rejection) => break StopReason::Rejected(rejection),
        }
    };
    subscription.unsubscribe();

    if !matches!(reason, StopReason::SwitchedOff) {
        store.set_auto_spin(false);
    }
    info!(?reason, "auto-spin stopped");
    Ok(reason)
}
