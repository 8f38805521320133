//! Debounced, mutually exclusive full reschedule
//!
//! Requests only move a debounce deadline. When the deadline passes the owner
//! calls [`RescheduleExecutor::on_debounce_elapsed`], which spawns at most one
//! run at a time. A request whose deadline passes while a run is in flight is
//! dropped: the running task reads the schedule snapshot itself, so it already
//! reflects anything the dropped request would have picked up.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use uuid::Uuid;

use crate::traits::{Clock, NotificationError, NotificationSink, ScheduleProvider};

/// Attempts per run: the first try plus one retry
const MAX_ATTEMPTS: u32 = 2;

/// What caused a reschedule check. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Startup,
    Resume,
    Midnight,
    Retry,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::Startup => "startup",
            TriggerReason::Resume => "resume",
            TriggerReason::Midnight => "midnight",
            TriggerReason::Retry => "retry",
        }
    }
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescheduleRequest {
    pub id: Uuid,
    pub reason: TriggerReason,
}

impl RescheduleRequest {
    pub fn new(reason: TriggerReason) -> Self {
        Self {
            id: Uuid::new_v4(),
            reason,
        }
    }
}

#[derive(Debug)]
pub enum RescheduleOutcome {
    Completed {
        /// Wall-clock time the successful attempt returned
        at: DateTime<FixedOffset>,
        reminder_count: usize,
        attempts: u32,
    },
    /// The schedule snapshot disappeared before the run could use it
    ScheduleMissing,
    Failed {
        error: NotificationError,
        attempts: u32,
    },
}

/// A finished run, handed back to the owner
#[derive(Debug)]
pub struct Completion {
    pub request: RescheduleRequest,
    pub result: Result<RescheduleOutcome, JoinError>,
}

/// Collaborators a run needs
#[derive(Clone)]
pub struct RescheduleDeps {
    pub schedule: Arc<dyn ScheduleProvider>,
    pub sink: Arc<dyn NotificationSink>,
    pub clock: Arc<dyn Clock>,
}

/// One full reschedule: read the snapshot, hand it to the sink, retry once.
pub async fn run_full_reschedule(
    deps: RescheduleDeps,
    request: RescheduleRequest,
    retry_backoff: Duration,
) -> RescheduleOutcome {
    let mut attempts = 0;
    loop {
        let Some(snapshot) = deps.schedule.current_schedule() else {
            tracing::warn!(
                request_id = %request.id,
                reason = %request.reason,
                "Schedule snapshot unavailable, skipping reschedule"
            );
            return RescheduleOutcome::ScheduleMissing;
        };

        attempts += 1;
        match deps.sink.schedule_all(&snapshot).await {
            Ok(()) => {
                return RescheduleOutcome::Completed {
                    at: deps.clock.now(),
                    reminder_count: snapshot.len(),
                    attempts,
                };
            }
            Err(e) if attempts < MAX_ATTEMPTS => {
                tracing::warn!(
                    request_id = %request.id,
                    reason = %request.reason,
                    error = %e,
                    backoff_ms = retry_backoff.as_millis() as u64,
                    "Reschedule failed, retrying once"
                );
                tokio::time::sleep(retry_backoff).await;
            }
            Err(e) => {
                return RescheduleOutcome::Failed { error: e, attempts };
            }
        }
    }
}

struct InFlight {
    request: RescheduleRequest,
    handle: JoinHandle<RescheduleOutcome>,
}

pub struct RescheduleExecutor {
    debounce: Duration,
    retry_backoff: Duration,
    deps: RescheduleDeps,
    pending: Option<(Instant, RescheduleRequest)>,
    in_flight: Option<InFlight>,
}

impl RescheduleExecutor {
    pub fn new(deps: RescheduleDeps, debounce: Duration, retry_backoff: Duration) -> Self {
        Self {
            debounce,
            retry_backoff,
            deps,
            pending: None,
            in_flight: None,
        }
    }

    /// Push the debounce deadline out and remember the latest request
    pub fn request(&mut self, reason: TriggerReason) {
        let request = RescheduleRequest::new(reason);
        let deadline = Instant::now() + self.debounce;
        if let Some((_, previous)) = self.pending.replace((deadline, request)) {
            tracing::debug!(
                coalesced = %previous.reason,
                reason = %reason,
                "Reschedule request coalesced"
            );
        } else {
            tracing::debug!(request_id = %request.id, reason = %reason, "Reschedule requested");
        }
    }

    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.pending.map(|(deadline, _)| deadline)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start the pending request unless a run is already in flight.
    /// Returns whether a run was started.
    pub fn on_debounce_elapsed(&mut self) -> bool {
        let Some((_, request)) = self.pending.take() else {
            return false;
        };

        if let Some(running) = &self.in_flight {
            tracing::debug!(
                dropped = %request.reason,
                running = %running.request.reason,
                "Reschedule already in progress, dropping request"
            );
            return false;
        }

        tracing::info!(request_id = %request.id, reason = %request.reason, "Starting full reschedule");
        let handle = tokio::spawn(run_full_reschedule(
            self.deps.clone(),
            request,
            self.retry_backoff,
        ));
        self.in_flight = Some(InFlight { request, handle });
        true
    }

    /// Wait for the in-flight run to finish and release the guard.
    ///
    /// Cancel safe: dropping the future leaves the run in flight. Resolves to
    /// `None` immediately when nothing is running.
    pub async fn completion(&mut self) -> Option<Completion> {
        let running = self.in_flight.as_mut()?;
        let result = (&mut running.handle).await;
        let finished = self.in_flight.take()?;
        Some(Completion {
            request: finished.request,
            result,
        })
    }

    /// Forget any pending request. An in-flight run is left to finish on its own.
    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }
}
