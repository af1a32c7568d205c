mod actions;
pub mod availability;
mod error;
mod executor;
pub mod interval;
mod mutations;
pub mod normalize;
mod queries;
mod text;
#[cfg(test)]
mod tests;

pub use actions::{Action, ActionContext, ExecutionResult, ListTarget};
pub use availability::{classify_appointment, status_for_person, Availability, AvailabilityStatus, RuleHit};
pub use error::EngineError;
pub use executor::execute;
pub use normalize::normalize;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::limits::*;
use crate::log::{AppendOutcome, AppointmentEvent, Cursor, EventLog, Page};
use crate::notify::NotifyHub;
use crate::store::{BlobStore, ETag, MemoryBlobStore, VersionedStateStore};

/// Outcome of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub result: ExecutionResult,
    /// Token of the document now stored.
    pub token: ETag,
    /// `false` when the batch changed nothing and no write was issued.
    pub saved: bool,
}

/// Load → execute → save over one blob store, plus the per-appointment logs.
pub struct Engine {
    pub states: VersionedStateStore,
    pub log: EventLog,
    pub notify: Arc<NotifyHub>,
}

fn check_batch(group: &str, actions: &[Action]) -> Result<(), EngineError> {
    if group.trim().is_empty() || group.len() > MAX_GROUP_ID_LEN {
        return Err(EngineError::LimitExceeded("group id must be 1-128 bytes"));
    }
    if actions.len() > MAX_BATCH_SIZE {
        return Err(EngineError::LimitExceeded("too many actions in one batch"));
    }
    Ok(())
}

impl Engine {
    pub fn new(blobs: Arc<dyn BlobStore>, config: &Config) -> Self {
        let notify = Arc::new(NotifyHub::new());
        Self {
            states: VersionedStateStore::new(blobs.clone(), config.default_timezone.clone()),
            log: EventLog::new(blobs, config.chunk_capacity, config.retry).with_notify(notify.clone()),
            notify,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBlobStore::new()), &Config::default())
    }

    /// Execute `actions` against the stored document and write the result
    /// back conditioned on the token read. A concurrent save in between
    /// surfaces as `EngineError::Conflict`; nothing is retried here.
    pub async fn apply_actions(
        &self,
        group: &str,
        actions: &[Action],
        ctx: &ActionContext,
    ) -> Result<Applied, EngineError> {
        check_batch(group, actions)?;
        let loaded = self.states.load(group).await?;
        let result = execute(&loaded.state, actions, ctx);

        if result.next_state == loaded.state {
            debug!("batch for {group} changed nothing, skipping save");
            return Ok(Applied {
                result,
                token: loaded.token,
                saved: false,
            });
        }

        match self.states.save(group, &result.next_state, &loaded.token).await {
            Ok(saved) => {
                let mut result = result;
                result.next_state = saved.state;
                Ok(Applied {
                    result,
                    token: saved.token,
                    saved: true,
                })
            }
            Err(e) => {
                warn!("batch for {group} not saved: {e}");
                Err(e.into())
            }
        }
    }

    /// What `apply_actions` would produce, without writing.
    pub async fn preview_actions(
        &self,
        group: &str,
        actions: &[Action],
        ctx: &ActionContext,
    ) -> Result<ExecutionResult, EngineError> {
        check_batch(group, actions)?;
        let loaded = self.states.load(group).await?;
        Ok(execute(&loaded.state, actions, ctx))
    }

    pub async fn append_event(
        &self,
        group: &str,
        appointment: &str,
        event: AppointmentEvent,
        idempotency_key: Option<&str>,
    ) -> Result<AppendOutcome, EngineError> {
        self.log.append(group, appointment, event, idempotency_key).await
    }

    pub async fn recent_events(
        &self,
        group: &str,
        appointment: &str,
        limit: usize,
        cursor: Option<Cursor>,
    ) -> Result<Page, EngineError> {
        self.log.get_recent(group, appointment, limit, cursor).await
    }
}
