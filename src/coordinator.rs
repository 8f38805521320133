//! Lifecycle coordinator
//!
//! One actor task owns all coordinator state. App-start and app-resume arrive
//! as commands over a channel; the debounce deadline, the precondition retry
//! deadline, the midnight timer and the in-flight reschedule are branches of
//! the same `select!` loop. Everything is therefore handled one event at a
//! time and no field needs a lock.
//!
//! ```text
//!  Idle ──trigger──► Detecting ──no change──► Idle
//!                        │
//!                        ├─changed, ready─────► Debouncing ──► Rescheduling ──► Idle
//!                        │
//!                        └─changed, not ready─► RetryArmed ──delay──► Detecting
//! ```

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::checkpoint::{CheckpointStore, SchedulerCheckpoint};
use crate::detector::{detect, offset_minutes};
use crate::error::CoordinatorError;
use crate::executor::{
    Completion, RescheduleDeps, RescheduleExecutor, RescheduleOutcome, TriggerReason,
};
use crate::midnight::MidnightTimer;
use crate::permission_monitor::PermissionMonitor;
use crate::settings::ReminderSettings;
use crate::traits::{
    Clock, CoordinatorEvent, DayIndexStore, EventSink, KeyValueStore, NotificationSink,
    PermissionQuery, ScheduleProvider, SessionSnapshot, SessionState, UserNotice,
};

/// Everything the coordinator talks to
#[derive(Clone)]
pub struct CoordinatorDeps {
    pub schedule: Arc<dyn ScheduleProvider>,
    pub sink: Arc<dyn NotificationSink>,
    pub day_index: Arc<dyn DayIndexStore>,
    pub store: Arc<dyn KeyValueStore>,
    pub permission: Arc<dyn PermissionQuery>,
    pub events: Arc<dyn EventSink>,
    pub session: Arc<dyn SessionState>,
    pub clock: Arc<dyn Clock>,
}

/// Facts that must all hold before a reschedule may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReschedulePreconditions {
    pub identity_present: bool,
    pub setup_complete: bool,
    pub primary_entity_present: bool,
    pub schedule_available: bool,
}

impl ReschedulePreconditions {
    pub fn evaluate(session: &SessionSnapshot, schedule_available: bool) -> Self {
        Self {
            identity_present: session.identity.is_some(),
            setup_complete: session.setup_complete,
            primary_entity_present: session.primary_entity_present,
            schedule_available,
        }
    }

    pub fn all_met(&self) -> bool {
        self.identity_present
            && self.setup_complete
            && self.primary_entity_present
            && self.schedule_available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Detecting,
    Debouncing,
    Rescheduling,
    RetryArmed,
}

/// What the coordinator is doing, as published to the host
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorStatus {
    pub phase: Phase,
    pub checkpoint: Option<SchedulerCheckpoint>,
    pub midnight_armed_for: Option<NaiveDate>,
    pub reschedules_completed: u64,
    pub running: bool,
}

#[derive(Debug)]
enum Command {
    Startup,
    Resume,
    Shutdown,
}

/// Host-side handle. Entry points never block and never fail.
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<CoordinatorStatus>,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    pub fn on_startup(&self) {
        self.send(Command::Startup);
    }

    pub fn on_resume(&self) {
        self.send(Command::Resume);
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorStatus> {
        self.status.clone()
    }

    /// Cancel every timer and stop the coordinator.
    ///
    /// A reschedule already handed to the platform keeps running to completion.
    pub async fn shutdown(self) {
        self.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Reminder coordinator task ended abnormally");
        }
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.tx.send(command) {
            tracing::debug!(command = ?e.0, "Reminder coordinator already stopped");
        }
    }
}

pub struct ReminderCoordinator {
    deps: CoordinatorDeps,
    settings: ReminderSettings,
    checkpoints: CheckpointStore,
    checkpoint: Option<SchedulerCheckpoint>,
    executor: RescheduleExecutor,
    monitor: PermissionMonitor,
    midnight: Option<MidnightTimer>,
    retry_deadline: Option<Instant>,
    retry_attempts: u32,
    reschedules_completed: u64,
    status_tx: watch::Sender<CoordinatorStatus>,
}

/// Sleep until `deadline`, or forever when there is none
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_for_midnight(timer: Option<MidnightTimer>, clock: Arc<dyn Clock>) -> NaiveDate {
    match timer {
        Some(timer) => timer.fired(&*clock).await,
        None => std::future::pending().await,
    }
}

impl ReminderCoordinator {
    /// Build the coordinator and load the checkpoint. Nothing runs until
    /// [`spawn`](Self::spawn) and a trigger.
    pub fn new(deps: CoordinatorDeps, settings: ReminderSettings) -> Self {
        let checkpoints = CheckpointStore::new(deps.store.clone());
        let checkpoint = checkpoints.load();
        let executor = RescheduleExecutor::new(
            RescheduleDeps {
                schedule: deps.schedule.clone(),
                sink: deps.sink.clone(),
                clock: deps.clock.clone(),
            },
            settings.debounce,
            settings.retry_backoff,
        );
        let monitor = PermissionMonitor::new(
            deps.store.clone(),
            deps.permission.clone(),
            deps.sink.clone(),
            deps.day_index.clone(),
            deps.events.clone(),
        );
        let (status_tx, _) = watch::channel(CoordinatorStatus {
            phase: Phase::Idle,
            checkpoint,
            midnight_armed_for: None,
            reschedules_completed: 0,
            running: false,
        });

        Self {
            deps,
            settings,
            checkpoints,
            checkpoint,
            executor,
            monitor,
            midnight: None,
            retry_deadline: None,
            retry_attempts: 0,
            reschedules_completed: 0,
            status_tx,
        }
    }

    /// Start the actor on the current tokio runtime
    pub fn spawn(self) -> CoordinatorHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let status = self.status_tx.subscribe();
        let task = tokio::spawn(self.run(rx));
        CoordinatorHandle { tx, status, task }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        tracing::info!(
            has_checkpoint = self.checkpoint.is_some(),
            "Reminder coordinator started"
        );

        loop {
            let debounce_deadline = self.executor.debounce_deadline();
            let retry_deadline = self.retry_deadline;
            let midnight = self.midnight;
            let clock = self.deps.clock.clone();

            tokio::select! {
                biased;

                command = rx.recv() => match command {
                    Some(Command::Startup) => self.on_startup().await,
                    Some(Command::Resume) => self.handle_trigger(TriggerReason::Resume).await,
                    Some(Command::Shutdown) | None => break,
                },
                Some(completion) = self.executor.completion(), if self.executor.is_running() => {
                    self.handle_completion(completion);
                }
                () = sleep_until_opt(debounce_deadline), if debounce_deadline.is_some() => {
                    self.executor.on_debounce_elapsed();
                }
                () = sleep_until_opt(retry_deadline), if retry_deadline.is_some() => {
                    self.retry_deadline = None;
                    self.handle_trigger(TriggerReason::Retry).await;
                }
                today = wait_for_midnight(midnight, clock), if midnight.is_some() => {
                    self.handle_midnight(today).await;
                }
            }

            self.publish(self.phase());
        }

        self.teardown();
    }

    async fn on_startup(&mut self) {
        self.handle_trigger(TriggerReason::Startup).await;
        if self.midnight.is_none() {
            self.midnight = Some(MidnightTimer::arm(
                &*self.deps.clock,
                self.settings.midnight_poll_slice,
            ));
        }
    }

    async fn handle_midnight(&mut self, today: NaiveDate) {
        tracing::info!(%today, "Midnight rollover");
        if let Err(e) = self.deps.day_index.clear_all_for_yesterday(today) {
            tracing::warn!(error = %e, "Failed to clear yesterday's reminder bookkeeping");
        }
        self.handle_trigger(TriggerReason::Midnight).await;
        self.midnight = Some(MidnightTimer::arm(
            &*self.deps.clock,
            self.settings.midnight_poll_slice,
        ));
    }

    /// Permission check, change detection, then reschedule or retry
    async fn handle_trigger(&mut self, reason: TriggerReason) {
        self.publish(Phase::Detecting);

        let now = self.deps.clock.now();
        let today = now.date_naive();
        let offset = offset_minutes(&now);
        let session = self.deps.session.snapshot();

        if let Some(identity) = session.identity.as_deref() {
            self.monitor.check(identity, &now).await;
        }

        let signal = detect(today, offset, self.checkpoint.as_ref());
        if !signal.any() {
            tracing::debug!(reason = %reason, %today, offset, "No date or offset change");
            self.clear_precondition_retry();
            return;
        }

        tracing::info!(
            reason = %reason,
            date_changed = signal.date_changed,
            tz_changed = signal.tz_changed,
            %today,
            offset,
            "Reminder schedule may be stale"
        );

        // Midnight already cleared before calling in
        if reason != TriggerReason::Midnight {
            if let Err(e) = self.deps.day_index.clear_all_for_yesterday(today) {
                tracing::warn!(error = %e, "Failed to clear stale reminder bookkeeping");
            }
        }

        let schedule_available = self.deps.schedule.current_schedule().is_some();
        let preconditions = ReschedulePreconditions::evaluate(&session, schedule_available);
        if preconditions.all_met() {
            self.clear_precondition_retry();
            self.executor.request(reason);
        } else {
            self.arm_precondition_retry(reason, preconditions);
        }
    }

    fn arm_precondition_retry(&mut self, reason: TriggerReason, preconditions: ReschedulePreconditions) {
        if reason != TriggerReason::Retry {
            self.retry_attempts = 0;
        }

        if self.retry_attempts >= self.settings.max_precondition_retries {
            tracing::debug!(
                attempts = self.retry_attempts,
                ?preconditions,
                "Preconditions still unmet, waiting for the next trigger"
            );
            self.clear_precondition_retry();
            return;
        }

        self.retry_attempts += 1;
        self.retry_deadline = Some(Instant::now() + self.settings.precondition_retry_delay);
        tracing::debug!(
            reason = %reason,
            attempt = self.retry_attempts,
            ?preconditions,
            "Preconditions unmet, retry armed"
        );
    }

    fn clear_precondition_retry(&mut self) {
        self.retry_deadline = None;
        self.retry_attempts = 0;
    }

    fn handle_completion(&mut self, completion: Completion) {
        let Completion { request, result } = completion;
        let reason = request.reason;

        match result {
            Ok(RescheduleOutcome::Completed {
                at,
                reminder_count,
                attempts,
            }) => {
                self.record_success(reason, at);
                self.reschedules_completed += 1;
                tracing::info!(
                    request_id = %request.id,
                    reason = %reason,
                    reminder_count,
                    attempts,
                    "Reminders rescheduled"
                );
                self.deps.events.report(CoordinatorEvent::Rescheduled {
                    reason,
                    reminder_count,
                    at,
                });
            }
            Ok(RescheduleOutcome::ScheduleMissing) => {
                self.deps.events.notify_user(UserNotice::ScheduleNotFound);
            }
            Ok(RescheduleOutcome::Failed { error, attempts }) => {
                tracing::error!(
                    request_id = %request.id,
                    reason = %reason,
                    attempts,
                    error = %error,
                    "Reschedule failed, waiting for the next trigger"
                );
                self.deps.events.report(CoordinatorEvent::RescheduleFailed {
                    reason,
                    error: error.to_string(),
                    at: self.deps.clock.now(),
                });
            }
            Err(join_error) => {
                let error = CoordinatorError::Task(join_error.to_string());
                self.report_unexpected(reason, &error);
            }
        }
    }

    fn record_success(&mut self, reason: TriggerReason, at: DateTime<FixedOffset>) {
        let date = at.date_naive();
        let offset = offset_minutes(&at);
        match self.checkpoints.save(date, offset) {
            Ok(checkpoint) => self.checkpoint = Some(checkpoint),
            Err(e) => {
                // Keep the in-memory copy so this session does not loop
                self.checkpoint = Some(SchedulerCheckpoint {
                    last_run_date: date,
                    last_tz_offset_minutes: offset,
                });
                self.report_unexpected(reason, &e);
            }
        }
    }

    fn report_unexpected(&self, reason: TriggerReason, error: &CoordinatorError) {
        tracing::error!(reason = %reason, error = %error, "Unexpected reminder coordinator failure");
        self.deps.events.report(CoordinatorEvent::Unexpected {
            reason,
            message: error.to_string(),
            at: self.deps.clock.now(),
        });
    }

    fn phase(&self) -> Phase {
        if self.executor.is_running() {
            Phase::Rescheduling
        } else if self.executor.is_pending() {
            Phase::Debouncing
        } else if self.retry_deadline.is_some() {
            Phase::RetryArmed
        } else {
            Phase::Idle
        }
    }

    fn publish(&self, phase: Phase) {
        self.status_tx.send_replace(CoordinatorStatus {
            phase,
            checkpoint: self.checkpoint,
            midnight_armed_for: self.midnight.map(|t| t.armed_for()),
            reschedules_completed: self.reschedules_completed,
            running: self.executor.is_running(),
        });
    }

    fn teardown(&mut self) {
        self.executor.cancel_pending();
        self.retry_deadline = None;
        self.midnight = None;
        if self.executor.is_running() {
            tracing::info!("Reminder coordinator stopping with a reschedule in flight");
        }
        self.publish(Phase::Idle);
        tracing::info!("Reminder coordinator stopped");
    }
}

/// Convenience for hosts: load settings from the store and start
pub fn spawn_coordinator(deps: CoordinatorDeps) -> CoordinatorHandle {
    let settings = ReminderSettings::load(&*deps.store);
    ReminderCoordinator::new(deps, settings).spawn()
}
