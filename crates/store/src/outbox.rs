use chrono::{DateTime, Utc};
use common::{EventId, EventKind, MessageEnvelope};

/// Publication status of an outbox row.
///
/// Rows transition `Pending` to `Sent` exactly once, by the relay, and are
/// never deleted, so the table doubles as an audit/replay log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Sent,
}

impl OutboxStatus {
    /// The stored column value, e.g. `"PENDING"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Sent => "SENT",
        }
    }

    /// Parses a stored column value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(OutboxStatus::Pending),
            "SENT" => Some(OutboxStatus::Sent),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A domain event awaiting publication, written in the same transaction as
/// the ledger mutation it describes.
///
/// `payload` and `metadata` are already JSON-encoded; the store treats
/// them as opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEvent {
    pub event_id: EventId,
    /// Destination topic.
    pub aggregate_type: String,
    /// Partition/routing key; the order id for saga events.
    pub aggregate_id: String,
    pub event_type: EventKind,
    pub payload: String,
    pub metadata: String,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutboxEvent {
    /// Creates a pending row with a fresh event id and timestamps.
    pub fn new(
        event_type: EventKind,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        payload: impl Into<String>,
        metadata: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            event_id: EventId::new(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            event_type,
            payload: payload.into(),
            metadata: metadata.into(),
            status: OutboxStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// The wire envelope the relay publishes for this row.
    pub fn to_envelope(&self) -> MessageEnvelope {
        MessageEnvelope {
            event_id: self.event_id,
            aggregate_type: self.aggregate_type.clone(),
            aggregate_id: self.aggregate_id.clone(),
            event_type: self.event_type.as_str().to_string(),
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
        }
    }
}
