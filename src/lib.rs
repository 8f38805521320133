//! CatCare reminders - keeps scheduled treatment reminders in step with the
//! device's date and timezone
//!
//! This library provides the reminder scheduling coordinator for the CatCare
//! app, organized around trait-based dependency injection for testability.

pub mod traits;
pub mod mocks;
pub mod production;

pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod day_index;
pub mod detector;
pub mod error;
pub mod executor;
pub mod midnight;
pub mod permission_monitor;
pub mod settings;
mod state;

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::AppConfig;
pub use coordinator::{
    spawn_coordinator, CoordinatorDeps, CoordinatorHandle, CoordinatorStatus, Phase,
    ReminderCoordinator,
};
pub use day_index::DayIndex;
pub use error::CoordinatorError;
pub use executor::TriggerReason;
pub use permission_monitor::record_intent;
pub use settings::ReminderSettings;
pub use state::{HostAdapters, ReminderState};

/// Initialize logging to both stdout and a daily file under `log_dir`.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the app.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = rolling::daily(log_dir, "catcare-reminders.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "catcare_reminders=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer()) // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false)) // file
        .try_init()?;

    tracing::info!(log_dir = %log_dir.display(), "CatCare reminders logging initialized");
    Ok(guard)
}
