use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use reelsync_core::SyncConfig;
use reelsync_shared::SyncError;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::storage::{Storage, StorageWatch};

const TOPIC_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Channel,
    StorageSignal,
    Detached,
}

/// Raw inbound traffic, not yet validated.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(String),
    /// The main state record changed under us (storage transport only).
    StateRecord(String),
}

pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;
    fn publish(&self, raw: &str) -> Result<(), SyncError>;
    fn listen(&self) -> Inbox;
}

pub enum Inbox {
    Channel(broadcast::Receiver<String>),
    Storage {
        watch: StorageWatch,
        signal_key: String,
        state_key: String,
    },
    Closed,
}

impl Inbox {
    pub async fn recv(&mut self) -> Option<Inbound> {
        match self {
            Inbox::Channel(rx) => loop {
                match rx.recv().await {
                    Ok(raw) => return Some(Inbound::Message(raw)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "sync channel lagged, messages lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            Inbox::Storage {
                watch,
                signal_key,
                state_key,
            } => loop {
                let event = watch.recv().await?;
                if event.key == *signal_key {
                    return Some(Inbound::Message(event.new_value));
                }
                if event.key == *state_key {
                    return Some(Inbound::StateRecord(event.new_value));
                }
            },
            Inbox::Closed => None,
        }
    }
}

/// Named in-process pub/sub topics shared by every context in the process.
#[derive(Clone, Default)]
pub struct ChannelHub {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topic(&self, name: &str) -> broadcast::Sender<String> {
        self.topics
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

pub struct ChannelTransport {
    sender: broadcast::Sender<String>,
}

impl ChannelTransport {
    pub fn join(hub: &ChannelHub, topic: &str) -> Self {
        Self {
            sender: hub.topic(topic),
        }
    }
}

impl Transport for ChannelTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Channel
    }

    fn publish(&self, raw: &str) -> Result<(), SyncError> {
        // Err only means nobody is listening
        let _ = self.sender.send(raw.to_string());
        Ok(())
    }

    fn listen(&self) -> Inbox {
        Inbox::Channel(self.sender.subscribe())
    }
}

/// Fallback: envelopes are written to a signal record that peers watch.
pub struct StorageSignalTransport {
    storage: Arc<dyn Storage>,
    signal_key: String,
    state_key: String,
}

impl StorageSignalTransport {
    pub fn new(storage: Arc<dyn Storage>, sync: &SyncConfig) -> Self {
        Self {
            storage,
            signal_key: sync.signal_key.clone(),
            state_key: sync.state_key.clone(),
        }
    }
}

impl Transport for StorageSignalTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::StorageSignal
    }

    fn publish(&self, raw: &str) -> Result<(), SyncError> {
        self.storage
            .set(&self.signal_key, raw)
            .map_err(|e| SyncError::Transport(e.to_string()))
    }

    fn listen(&self) -> Inbox {
        match self.storage.watch() {
            Some(watch) => Inbox::Storage {
                watch,
                signal_key: self.signal_key.clone(),
                state_key: self.state_key.clone(),
            },
            None => Inbox::Closed,
        }
    }
}

/// No peers can be reached; the context runs on its own.
pub struct DetachedTransport;

impl Transport for DetachedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Detached
    }

    fn publish(&self, _raw: &str) -> Result<(), SyncError> {
        Ok(())
    }

    fn listen(&self) -> Inbox {
        Inbox::Closed
    }
}

/// Picks the transport once, at context startup: direct pub/sub when a hub
/// is available, otherwise storage signals when the storage can be watched.
pub fn select_transport(
    hub: Option<&ChannelHub>,
    storage: &Arc<dyn Storage>,
    sync: &SyncConfig,
) -> Arc<dyn Transport> {
    if let Some(hub) = hub {
        return Arc::new(ChannelTransport::join(hub, &sync.channel_name));
    }
    if storage.watch().is_some() {
        return Arc::new(StorageSignalTransport::new(storage.clone(), sync));
    }
    info!("no sync channel available, running detached");
    Arc::new(DetachedTransport)
}
