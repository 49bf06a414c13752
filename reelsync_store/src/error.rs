use reelsync_core::ConfigError;

use crate::storage::StorageError;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("a store must be opened inside a tokio runtime")]
    NoRuntime,
}

/// Why `spin()` refused to start. The display text doubles as the
/// user-facing message.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SpinRejection {
    #[error("Spin already in progress.")]
    AlreadySpinning,
    #[error("Choose a bet greater than $0 to play.")]
    InvalidWager,
    #[error("Insufficient credits to spin.")]
    InsufficientCredits { balance: f64, wager: f64 },
}
