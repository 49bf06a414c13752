pub mod message;
pub mod state;

pub use crate::message::{
    Envelope, MessageKind, SpinEvent, SpinSettle, SpinStart, SyncMessage,
};
pub use crate::state::{GameState, SanitizeMode, WELCOME_MESSAGE};

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed envelope: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("malformed {kind:?} payload")]
    Payload { kind: MessageKind },
    #[error("transport unavailable: {0}")]
    Transport(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
