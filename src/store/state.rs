use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::engine::normalize::{canonicalize, normalize_at};
use crate::model::ScheduleState;
use crate::observability::{STATE_LOADS_TOTAL, STATE_SAVES_TOTAL};

use super::{BlobStore, ETag, StoreError, WriteCondition};

pub fn state_key(group: &str) -> String {
    format!("groups/{group}/state.json")
}

/// A canonical document together with the token it was read or written at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub state: ScheduleState,
    pub token: ETag,
}

/// One JSON document per group, guarded by its version token.
pub struct VersionedStateStore {
    blobs: Arc<dyn BlobStore>,
    default_timezone: String,
}

impl VersionedStateStore {
    pub fn new(blobs: Arc<dyn BlobStore>, default_timezone: impl Into<String>) -> Self {
        Self {
            blobs,
            default_timezone: default_timezone.into(),
        }
    }

    /// Read and normalize the group's document, creating an empty one if
    /// none exists. Racing first loads all observe the winner's document.
    pub async fn load(&self, group: &str) -> Result<Versioned, StoreError> {
        let key = state_key(group);
        metrics::counter!(STATE_LOADS_TOTAL).increment(1);

        if let Some(found) = self.read(group, &key).await? {
            return Ok(found);
        }

        let empty = canonicalize(ScheduleState::empty(group, &self.default_timezone, Utc::now()));
        let body = encode(&key, &empty)?;
        match self.blobs.put(&key, body, WriteCondition::IfAbsent).await {
            Ok(token) => {
                info!("initialized state for group {group}");
                Ok(Versioned { state: empty, token })
            }
            Err(StoreError::Conflict(_)) => {
                debug!("lost initialization race for group {group}, reading winner");
                self.read(group, &key)
                    .await?
                    .ok_or_else(|| StoreError::Io(format!("{key} vanished after initialization")))
            }
            Err(e) => Err(e),
        }
    }

    /// Write `state` if the stored token is still `expected`.
    ///
    /// Returns the document as written (with `updatedAt` stamped) and its new
    /// token. A stale token yields `StoreError::Conflict`.
    pub async fn save(&self, group: &str, state: &ScheduleState, expected: &str) -> Result<Versioned, StoreError> {
        let key = state_key(group);
        let mut state = state.clone();
        state.group.updated_at = Utc::now().max(state.group.created_at);
        let body = encode(&key, &state)?;

        match self.blobs.put(&key, body, WriteCondition::IfMatch(expected.to_string())).await {
            Ok(token) => {
                metrics::counter!(STATE_SAVES_TOTAL, "outcome" => "ok").increment(1);
                debug!("saved state for group {group}");
                Ok(Versioned { state, token })
            }
            Err(e) => {
                let outcome = if matches!(e, StoreError::Conflict(_)) { "conflict" } else { "error" };
                metrics::counter!(STATE_SAVES_TOTAL, "outcome" => outcome).increment(1);
                warn!("save of {key} failed: {e}");
                Err(e)
            }
        }
    }

    async fn read(&self, group: &str, key: &str) -> Result<Option<Versioned>, StoreError> {
        let Some(blob) = self.blobs.get(key).await? else {
            return Ok(None);
        };
        let raw: serde_json::Value = serde_json::from_slice(&blob.body).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let mut state = normalize_at(&raw, Utc::now());
        if state.group.group_id.is_empty() {
            state.group.group_id = group.to_string();
        }
        Ok(Some(Versioned { state, token: blob.etag }))
    }
}

fn encode(key: &str, state: &ScheduleState) -> Result<Bytes, StoreError> {
    serde_json::to_vec_pretty(state)
        .map(Bytes::from)
        .map_err(|e| StoreError::Io(format!("encode {key}: {e}")))
}
