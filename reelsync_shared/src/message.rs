use chrono::Utc;
use reelsync_core::{GameConfig, RandomSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::{GameState, SanitizeMode};
use crate::{SyncError, SyncResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Hello,
    State,
    SpinStart,
    SpinSettle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinStart {
    pub targets: Vec<String>,
    pub wager: f64,
    pub spin_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinSettle {
    pub targets: Vec<String>,
    pub spin_id: String,
    pub payout: f64,
    pub multiplier: u32,
}

/// Everything that travels between contexts.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    /// A freshly opened context asking peers for their snapshot.
    Hello,
    State(GameState),
    SpinStart(SpinStart),
    SpinSettle(SpinSettle),
}

impl SyncMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            SyncMessage::Hello => MessageKind::Hello,
            SyncMessage::State(_) => MessageKind::State,
            SyncMessage::SpinStart(_) => MessageKind::SpinStart,
            SyncMessage::SpinSettle(_) => MessageKind::SpinSettle,
        }
    }
}

/// What local listeners see of a spin, whichever context ran it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SpinEvent {
    #[serde(rename_all = "camelCase")]
    Start { targets: Vec<String>, spin_id: String },
    #[serde(rename_all = "camelCase")]
    Settle {
        targets: Vec<String>,
        spin_id: String,
        payout: f64,
        multiplier: u32,
    },
}

impl SpinEvent {
    pub fn spin_id(&self) -> &str {
        match self {
            SpinEvent::Start { spin_id, .. } | SpinEvent::Settle { spin_id, .. } => spin_id,
        }
    }
}

impl From<&SpinStart> for SpinEvent {
    fn from(start: &SpinStart) -> Self {
        SpinEvent::Start {
            targets: start.targets.clone(),
            spin_id: start.spin_id.clone(),
        }
    }
}

impl From<&SpinSettle> for SpinEvent {
    fn from(settle: &SpinSettle) -> Self {
        SpinEvent::Settle {
            targets: settle.targets.clone(),
            spin_id: settle.spin_id.clone(),
            payout: settle.payout,
            multiplier: settle.multiplier,
        }
    }
}

// On the wire: {type, payload, senderId, timestamp}
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(default)]
    payload: Value,
    sender_id: String,
    timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub message: SyncMessage,
    pub sender_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Set on handshake answers; only the addressed context applies them.
    pub reply_to: Option<String>,
}

impl Envelope {
    pub fn new(message: SyncMessage, sender_id: impl Into<String>) -> Self {
        Self {
            message,
            sender_id: sender_id.into(),
            timestamp: Utc::now().timestamp_millis(),
            reply_to: None,
        }
    }

    pub fn reply(message: SyncMessage, sender_id: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            reply_to: Some(to.into()),
            ..Self::new(message, sender_id)
        }
    }

    /// Whether a context with `instance_id` should act on this envelope.
    pub fn is_for(&self, instance_id: &str) -> bool {
        self.sender_id != instance_id
            && self.reply_to.as_deref().map_or(true, |to| to == instance_id)
    }

    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    pub fn encode(&self) -> SyncResult<String> {
        let payload = match &self.message {
            SyncMessage::Hello => Ok(Value::Null),
            SyncMessage::State(state) => serde_json::to_value(state),
            SyncMessage::SpinStart(start) => serde_json::to_value(start),
            SyncMessage::SpinSettle(settle) => serde_json::to_value(settle),
        }
        .map_err(SyncError::Encode)?;
        let wire = WireEnvelope {
            kind: self.kind(),
            payload,
            sender_id: self.sender_id.clone(),
            timestamp: self.timestamp,
            reply_to: self.reply_to.clone(),
        };
        serde_json::to_string(&wire).map_err(SyncError::Encode)
    }

    /// Validates an inbound envelope. Unknown kinds and payloads that do not
    /// match their kind are errors; peer state is sanitized field by field.
    pub fn decode(
        raw: &str,
        config: &GameConfig,
        rng: &mut dyn RandomSource,
    ) -> SyncResult<Self> {
        let wire: WireEnvelope = serde_json::from_str(raw).map_err(SyncError::Decode)?;
        let kind = wire.kind;
        let message = match kind {
            MessageKind::Hello => SyncMessage::Hello,
            MessageKind::State => SyncMessage::State(
                GameState::sanitize(&wire.payload, config, SanitizeMode::Peer, rng)
                    .ok_or(SyncError::Payload { kind })?,
            ),
            MessageKind::SpinStart => {
                let start: SpinStart = serde_json::from_value(wire.payload)
                    .map_err(|_| SyncError::Payload { kind })?;
                if start.targets.len() != config.reels || !start.wager.is_finite() {
                    return Err(SyncError::Payload { kind });
                }
                SyncMessage::SpinStart(start)
            }
            MessageKind::SpinSettle => {
                let settle: SpinSettle = serde_json::from_value(wire.payload)
                    .map_err(|_| SyncError::Payload { kind })?;
                if settle.targets.len() != config.reels
                    || !settle.payout.is_finite()
                    || settle.payout < 0.0
                    || settle.multiplier == 0
                {
                    return Err(SyncError::Payload { kind });
                }
                SyncMessage::SpinSettle(settle)
            }
        };
        Ok(Self {
            message,
            sender_id: wire.sender_id,
            timestamp: wire.timestamp,
            reply_to: wire.reply_to,
        })
    }
}
