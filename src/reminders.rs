use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::engine::{Engine, EngineError};
use crate::limits::MAX_PAGE_SIZE;
use crate::log::{Actor, AppointmentEvent, EventLog, EventType};
use crate::observability::REMINDERS_SENT_TOTAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderStatus {
    Scheduled,
    Canceled,
    Sent,
}

fn reminder_id(event: &AppointmentEvent) -> Option<&str> {
    event.payload.get("reminderId").and_then(|v| v.as_str())
}

/// Fold reminder events, given in append order, into the current status of
/// each reminder. Later events win, except that a sent reminder stays sent.
///
/// Timestamps are not consulted: the log order is the order.
pub fn reminder_states<'a>(events: impl IntoIterator<Item = &'a AppointmentEvent>) -> HashMap<String, ReminderStatus> {
    let mut states = HashMap::new();
    for e in events {
        let status = match e.event_type {
            EventType::ReminderScheduled => ReminderStatus::Scheduled,
            EventType::ReminderCanceled => ReminderStatus::Canceled,
            EventType::ReminderSent => ReminderStatus::Sent,
            _ => continue,
        };
        let Some(id) = reminder_id(e) else {
            continue;
        };
        let slot = states.entry(id.to_string()).or_insert(status);
        if *slot != ReminderStatus::Sent {
            *slot = status;
        }
    }
    states
}

pub fn sent_key(reminder_id: &str) -> String {
    format!("reminder-sent:{reminder_id}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReminder {
    pub group: String,
    pub appointment: String,
    pub reminder_id: String,
    pub due_at: DateTime<Utc>,
}

/// Source of reminders whose time has come.
#[async_trait]
pub trait ReminderIndex: Send + Sync {
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<DueReminder>, EngineError>;
}

/// Delivery channel (SMS, push, ...).
#[async_trait]
pub trait ReminderSender: Send + Sync {
    async fn send(&self, reminder: &DueReminder) -> Result<(), String>;
}

/// Finds due reminders by scanning every appointment log for
/// `REMINDER_SCHEDULED` events whose `dueAt` has passed.
pub struct LogIndex {
    engine: Arc<Engine>,
}

impl LogIndex {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ReminderIndex for LogIndex {
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<DueReminder>, EngineError> {
        let mut due = Vec::new();
        for (group, appointment) in self.engine.log.appointments().await? {
            let page = self.engine.log.get_recent(&group, &appointment, MAX_PAGE_SIZE, None).await?;
            let oldest_first: Vec<&AppointmentEvent> = page.events.iter().rev().collect();

            let mut due_at: HashMap<&str, DateTime<Utc>> = HashMap::new();
            for e in &oldest_first {
                if e.event_type == EventType::ReminderScheduled
                    && let Some(id) = reminder_id(e)
                    && let Some(at) = e.payload.get("dueAt").and_then(|v| serde_json::from_value(v.clone()).ok())
                {
                    due_at.insert(id, at);
                }
            }

            for (id, status) in reminder_states(oldest_first.iter().copied()) {
                if status != ReminderStatus::Scheduled {
                    continue;
                }
                if let Some(&at) = due_at.get(id.as_str())
                    && at <= now
                {
                    due.push(DueReminder {
                        group: group.clone(),
                        appointment: appointment.clone(),
                        reminder_id: id,
                        due_at: at,
                    });
                }
            }
        }
        due.sort_by(|a, b| a.due_at.cmp(&b.due_at).then_with(|| a.reminder_id.cmp(&b.reminder_id)));
        Ok(due)
    }
}

/// Delivers by writing each reminder to the process log.
pub struct LogSender;

#[async_trait]
impl ReminderSender for LogSender {
    async fn send(&self, reminder: &DueReminder) -> Result<(), String> {
        info!(
            group = %reminder.group,
            appointment = %reminder.appointment,
            "reminder {} due at {}",
            reminder.reminder_id,
            reminder.due_at
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Deliver every due reminder that the log still shows as scheduled.
///
/// Delivery is recorded as `REMINDER_SENT` under `reminder-sent:{id}`, so a
/// poller that crashes after sending but before recording sends again at
/// most once per chunk. A failure on one reminder is counted and the pass
/// moves on to the next.
pub async fn poll_once(
    log: &EventLog,
    index: &dyn ReminderIndex,
    sender: &dyn ReminderSender,
    now: DateTime<Utc>,
) -> Result<PollReport, EngineError> {
    let mut report = PollReport::default();
    for due in index.due(now).await? {
        let page = match log.get_recent(&due.group, &due.appointment, MAX_PAGE_SIZE, None).await {
            Ok(page) => page,
            Err(e) => {
                warn!("reminder {} not checked: {e}", due.reminder_id);
                report.failed += 1;
                continue;
            }
        };
        let status = reminder_states(page.events.iter().rev()).get(&due.reminder_id).copied();
        if status != Some(ReminderStatus::Scheduled) {
            debug!("reminder {} skipped: {status:?}", due.reminder_id);
            report.skipped += 1;
            continue;
        }

        if let Err(e) = sender.send(&due).await {
            warn!("reminder {} delivery failed: {e}", due.reminder_id);
            report.failed += 1;
            continue;
        }

        let event = AppointmentEvent::new(
            EventType::ReminderSent,
            Actor::system(),
            json!({ "reminderId": due.reminder_id, "sentAt": now }),
        )
        .with_ts(now);
        if let Err(e) = log
            .append(&due.group, &due.appointment, event, Some(&sent_key(&due.reminder_id)))
            .await
        {
            warn!("reminder {} sent but not recorded: {e}", due.reminder_id);
            report.failed += 1;
            continue;
        }
        metrics::counter!(REMINDERS_SENT_TOTAL).increment(1);
        report.sent += 1;
    }
    Ok(report)
}

/// One poller pass: deliver due reminders, then drop idle live-feed channels.
pub async fn poll_tick(
    engine: &Engine,
    index: &dyn ReminderIndex,
    sender: &dyn ReminderSender,
    now: DateTime<Utc>,
) -> Result<PollReport, EngineError> {
    let report = poll_once(&engine.log, index, sender, now).await;
    engine.notify.prune();
    report
}

/// Background task that periodically delivers due reminders.
pub async fn run_reminder_poller(
    engine: Arc<Engine>,
    index: Arc<dyn ReminderIndex>,
    sender: Arc<dyn ReminderSender>,
    every: Duration,
) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match poll_tick(&engine, index.as_ref(), sender.as_ref(), Utc::now()).await {
            Ok(report) if report.sent > 0 || report.failed > 0 => {
                info!("sent {} reminders, {} failed", report.sent, report.failed)
            }
            Ok(_) => {}
            Err(e) => warn!("reminder poll failed: {e}"),
        }
    }
}
