//! Per-appointment append-only event log, stored as fixed-capacity chunks.
//!
//! Every write is a single conditional put: appends into the latest chunk
//! are guarded by its version token, rollovers by create-if-absent. A lost
//! race restarts from the chunk listing, up to `RetryPolicy::max_attempts`.

mod cursor;
mod event;

pub use cursor::{Cursor, CursorParseError};
pub use event::{Actor, ActorKind, AppointmentEvent, EventType};

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::engine::EngineError;
use crate::limits::*;
use crate::notify::NotifyHub;
use crate::observability::{EVENT_APPENDS_TOTAL, EVENT_APPEND_RETRIES_TOTAL, EVENT_CHUNK_ROLLOVERS_TOTAL};
use crate::store::{BlobStore, ETag, StoreError, WriteCondition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Sleep before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_APPEND_MAX_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_APPEND_BACKOFF_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// `false` when the idempotency key was already present in the latest chunk.
    pub appended: bool,
    pub chunk_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Newest first.
    pub events: Vec<AppointmentEvent>,
    /// `None` once the oldest event has been returned.
    pub next_cursor: Option<Cursor>,
}

pub fn chunk_prefix(group: &str, appointment: &str) -> String {
    format!("groups/{group}/appointments/{appointment}/events/")
}

pub fn chunk_key(group: &str, appointment: &str, chunk: u32) -> String {
    format!("{}chunk-{chunk:06}.json", chunk_prefix(group, appointment))
}

fn parse_chunk_id(key: &str) -> Option<u32> {
    let name = key.rsplit('/').next()?;
    name.strip_prefix("chunk-")?.strip_suffix(".json")?.parse().ok().filter(|n| *n > 0)
}

enum Attempt {
    Done(AppendOutcome),
    Lost,
}

pub struct EventLog {
    blobs: Arc<dyn BlobStore>,
    capacity: usize,
    retry: RetryPolicy,
    notify: Option<Arc<NotifyHub>>,
}

impl EventLog {
    pub fn new(blobs: Arc<dyn BlobStore>, capacity: usize, retry: RetryPolicy) -> Self {
        Self {
            blobs,
            capacity: capacity.max(1),
            retry,
            notify: None,
        }
    }

    /// Publish every appended event to `hub`.
    pub fn with_notify(mut self, hub: Arc<NotifyHub>) -> Self {
        self.notify = Some(hub);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Every `(group, appointment)` that has at least one chunk, sorted.
    pub async fn appointments(&self) -> Result<Vec<(String, String)>, EngineError> {
        let mut found: Vec<(String, String)> = self
            .blobs
            .list("groups/")
            .await?
            .iter()
            .filter(|k| parse_chunk_id(k).is_some())
            .filter_map(|k| {
                let rest = k.strip_prefix("groups/")?;
                let (path, _) = rest.rsplit_once("/events/")?;
                let (group, appointment) = path.rsplit_once("/appointments/")?;
                Some((group.to_string(), appointment.to_string()))
            })
            .collect();
        found.sort();
        found.dedup();
        Ok(found)
    }

    /// Existing chunk ids, ascending.
    pub async fn chunk_ids(&self, group: &str, appointment: &str) -> Result<Vec<u32>, EngineError> {
        let keys = self.blobs.list(&chunk_prefix(group, appointment)).await?;
        let mut ids: Vec<u32> = keys.iter().filter_map(|k| parse_chunk_id(k)).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Contents and version token of one chunk; an absent chunk is empty with no token.
    pub async fn read_chunk(
        &self,
        group: &str,
        appointment: &str,
        chunk: u32,
    ) -> Result<(Vec<AppointmentEvent>, Option<ETag>), EngineError> {
        let key = chunk_key(group, appointment, chunk);
        let Some(blob) = self.blobs.get(&key).await? else {
            return Ok((Vec::new(), None));
        };
        let events = serde_json::from_slice(&blob.body).map_err(|e| {
            EngineError::Storage(StoreError::Corrupt {
                key: key.clone(),
                reason: e.to_string(),
            })
        })?;
        Ok((events, Some(blob.etag)))
    }

    /// Append `event`, suppressing it if `idempotency_key` already appears in
    /// the latest chunk. Keys are not checked across chunk rollovers.
    pub async fn append(
        &self,
        group: &str,
        appointment: &str,
        mut event: AppointmentEvent,
        idempotency_key: Option<&str>,
    ) -> Result<AppendOutcome, EngineError> {
        if let Some(k) = idempotency_key {
            event.idempotency_key = Some(k.to_string());
        }

        for attempt in 1..=self.retry.max_attempts {
            match self.try_append(group, appointment, &event).await {
                Ok(Attempt::Done(outcome)) => {
                    let label = if outcome.appended { "appended" } else { "duplicate" };
                    metrics::counter!(EVENT_APPENDS_TOTAL, "outcome" => label).increment(1);
                    if outcome.appended
                        && let Some(hub) = &self.notify
                    {
                        hub.send(group, appointment, &event);
                    }
                    return Ok(outcome);
                }
                Ok(Attempt::Lost) => {
                    metrics::counter!(EVENT_APPEND_RETRIES_TOTAL).increment(1);
                    debug!("append to {group}/{appointment} lost a race (attempt {attempt})");
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.backoff * attempt).await;
                    }
                }
                Err(e) => {
                    metrics::counter!(EVENT_APPENDS_TOTAL, "outcome" => "error").increment(1);
                    return Err(e);
                }
            }
        }

        metrics::counter!(EVENT_APPENDS_TOTAL, "outcome" => "exhausted").increment(1);
        warn!(
            "append to {group}/{appointment} gave up after {} attempts",
            self.retry.max_attempts
        );
        Err(EngineError::RetriesExhausted {
            key: chunk_prefix(group, appointment),
            attempts: self.retry.max_attempts,
        })
    }

    async fn try_append(
        &self,
        group: &str,
        appointment: &str,
        event: &AppointmentEvent,
    ) -> Result<Attempt, EngineError> {
        let latest = self.chunk_ids(group, appointment).await?.last().copied().unwrap_or(1);
        let (mut events, token) = self.read_chunk(group, appointment, latest).await?;

        if let Some(k) = &event.idempotency_key
            && events.iter().any(|e| e.idempotency_key.as_ref() == Some(k))
        {
            return Ok(Attempt::Done(AppendOutcome {
                appended: false,
                chunk_id: latest,
            }));
        }

        let (chunk_id, body, condition) = if events.len() < self.capacity {
            events.push(event.clone());
            let condition = match token {
                Some(etag) => WriteCondition::IfMatch(etag),
                None => WriteCondition::IfAbsent,
            };
            (latest, encode(&events)?, condition)
        } else {
            let next = latest + 1;
            (next, encode(std::slice::from_ref(event))?, WriteCondition::IfAbsent)
        };

        match self.blobs.put(&chunk_key(group, appointment, chunk_id), body, condition).await {
            Ok(_) => {
                if chunk_id != latest {
                    metrics::counter!(EVENT_CHUNK_ROLLOVERS_TOTAL).increment(1);
                    info!("{group}/{appointment}: rolled over to chunk {chunk_id}");
                }
                Ok(Attempt::Done(AppendOutcome {
                    appended: true,
                    chunk_id,
                }))
            }
            Err(StoreError::Conflict(_)) => Ok(Attempt::Lost),
            Err(e) => Err(e.into()),
        }
    }

    /// Up to `limit` events, newest first, strictly older than `cursor` if given.
    ///
    /// Pages are anchored to chunk positions, so events appended between
    /// calls never shift a later page. A `limit` of 0 returns no events and a
    /// cursor that resumes from where the caller stands.
    pub async fn get_recent(
        &self,
        group: &str,
        appointment: &str,
        limit: usize,
        cursor: Option<Cursor>,
    ) -> Result<Page, EngineError> {
        let limit = limit.min(MAX_PAGE_SIZE);
        let mut ids = self.chunk_ids(group, appointment).await?;
        if let Some(c) = cursor {
            ids.retain(|id| *id <= c.chunk);
        }

        if limit == 0 {
            let next_cursor = match (cursor, ids.last()) {
                (Some(c), _) => Some(c),
                (None, Some(&id)) => {
                    let (chunk, _) = self.read_chunk(group, appointment, id).await?;
                    (!chunk.is_empty()).then(|| Cursor::new(id, chunk.len()))
                }
                (None, None) => None,
            };
            return Ok(Page {
                events: Vec::new(),
                next_cursor,
            });
        }

        let mut events = Vec::with_capacity(limit);
        let mut last: Option<Cursor> = None;
        'chunks: for &id in ids.iter().rev() {
            if events.len() >= limit {
                break;
            }
            let (chunk, _) = self.read_chunk(group, appointment, id).await?;
            let end = match cursor {
                Some(c) if c.chunk == id => c.index.min(chunk.len()),
                _ => chunk.len(),
            };
            for index in (0..end).rev() {
                if events.len() >= limit {
                    break 'chunks;
                }
                events.push(chunk[index].clone());
                last = Some(Cursor::new(id, index));
            }
        }

        // Nothing older than the first event of the first chunk.
        let next_cursor = last.filter(|c| !(c.index == 0 && ids.first() == Some(&c.chunk)));
        Ok(Page { events, next_cursor })
    }
}

fn encode(events: &[AppointmentEvent]) -> Result<Bytes, EngineError> {
    Ok(Bytes::from(serde_json::to_vec(events)?))
}
