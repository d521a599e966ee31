//! Observability for rollback runs
//!
//! - Structured JSON log lines (`Logger`)
//! - Typed events (`Event`)
//! - Timed scopes around each phase transition (`ObservationScope`)
//!
//! Observability is read-only: nothing here influences the run, and a
//! failed write to stdout/stderr is ignored.

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::ObservationScope;

/// Log `event` for the run named `test`.
///
/// The `test` field replaces the `[name]` prefix a human-readable log
/// would carry.
pub fn log_event(test: &str, event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    };
    let mut all = Vec::with_capacity(fields.len() + 1);
    all.push(("test", test));
    all.extend_from_slice(fields);
    Logger::log(severity, event.as_str(), &all);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_does_not_panic() {
        log_event("unit", Event::RunBegin, &[]);
        log_event("unit", Event::PhaseTransition, &[("to", "RollbackOps")]);
    }
}
