use std::sync::{Arc, Weak};

use reelsync_core::random_id;
use reelsync_shared::{Envelope, SyncMessage};
use tracing::{debug, warn};

use crate::store::StoreInner;
use crate::transport::{Inbound, Inbox, Transport, TransportKind};

/// Outbound half of cross-context sync: stamps envelopes with this context's
/// instance id and hands them to the transport picked at startup.
pub(crate) struct Synchronizer {
    instance_id: String,
    transport: Arc<dyn Transport>,
}

impl Synchronizer {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            instance_id: random_id(),
            transport,
        }
    }

    pub(crate) fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub(crate) fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub(crate) fn listen(&self) -> Inbox {
        self.transport.listen()
    }

    pub(crate) fn publish(&self, message: SyncMessage) {
        self.send(Envelope::new(message, self.instance_id.as_str()));
    }

    pub(crate) fn publish_reply(&self, message: SyncMessage, to: &str) {
        self.send(Envelope::reply(message, self.instance_id.as_str(), to));
    }

    fn send(&self, envelope: Envelope) {
        let kind = envelope.kind();
        let result = envelope
            .encode()
            .and_then(|raw| self.transport.publish(&raw));
        if let Err(e) = result {
            warn!(?kind, error = %e, "failed to publish sync message");
        }
    }
}

/// Drains the inbox into the store until the transport closes or the store
/// is gone.
pub(crate) async fn run_inbound(mut inbox: Inbox, store: Weak<StoreInner>) {
    while let Some(inbound) = inbox.recv().await {
        let Some(inner) = store.upgrade() else {
            break;
        };
        match inbound {
            Inbound::Message(raw) => inner.receive_envelope(&raw),
            Inbound::StateRecord(raw) => inner.receive_state_record(&raw),
        }
    }
    debug!("sync listener stopped");
}
