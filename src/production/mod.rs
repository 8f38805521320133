//! Production implementations of traits
//!
//! The notification sink, permission query, schedule provider and session
//! state are platform bindings supplied by the host application.

mod clock;
mod event_sink;

pub use clock::SystemClock;
pub use event_sink::TracingEventSink;
