use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    UserMessage,
    SystemConfirmation,
    FieldChanged,
    ProposalCreated,
    ProposalApplied,
    ProposalCanceled,
    ConstraintAdded,
    ConstraintRemoved,
    SuggestionCreated,
    SuggestionApplied,
    SuggestionDismissed,
    NotificationSent,
    ReminderScheduled,
    ReminderCanceled,
    ReminderSent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Person,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub kind: ActorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Actor {
    pub fn person(id: impl Into<String>) -> Self {
        Self {
            kind: ActorKind::Person,
            id: Some(id.into()),
        }
    }

    pub fn assistant() -> Self {
        Self {
            kind: ActorKind::Assistant,
            id: None,
        }
    }

    pub fn system() -> Self {
        Self {
            kind: ActorKind::System,
            id: None,
        }
    }
}

/// One immutable entry in an appointment's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentEvent {
    pub id: String,
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub actor: Actor,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
}

impl AppointmentEvent {
    pub fn new(event_type: EventType, actor: Actor, payload: Value) -> Self {
        Self {
            id: Ulid::new().to_string(),
            ts: Utc::now(),
            event_type,
            actor,
            payload,
            idempotency_key: None,
            proposal_id: None,
        }
    }

    pub fn message(actor: Actor, text: &str) -> Self {
        Self::new(EventType::UserMessage, actor, serde_json::json!({ "text": text }))
    }

    pub fn with_proposal(mut self, proposal_id: impl Into<String>) -> Self {
        self.proposal_id = Some(proposal_id.into());
        self
    }

    pub fn with_ts(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = ts;
        self
    }
}
