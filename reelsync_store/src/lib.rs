//! Persisted, cross-context synchronized state for the reelsync machine.
//!
//! Each [`Store`] is one context (a control panel, a display, a CLI run).
//! Contexts sharing a [`ChannelHub`] or a storage origin converge on the same
//! [`GameState`](reelsync_shared::GameState).

pub mod error;
pub mod input;
pub mod lifecycle;
mod listeners;
pub mod storage;
pub mod store;
mod sync;
pub mod transport;

pub use crate::error::{SpinRejection, StoreError};
pub use crate::input::{parse_amount, IntoAmount};
pub use crate::lifecycle::{SpinHandle, INTERRUPTED_MESSAGE, NO_WIN_MESSAGE, SPINNING_MESSAGE};
pub use crate::listeners::Subscription;
pub use crate::storage::{
    FileStorage, MemoryOrigin, MemoryStorage, Storage, StorageError, StorageEvent, StorageWatch,
};
pub use crate::store::{Store, StoreBuilder, INVALID_AMOUNT_MESSAGE, RESET_MESSAGE};
pub use crate::transport::{
    select_transport, ChannelHub, ChannelTransport, DetachedTransport, Inbound, Inbox,
    StorageSignalTransport, Transport, TransportKind,
};
