//! Timed begin/complete logging around one harness step.

use std::cell::Cell;
use std::time::Instant;

use super::logger::Logger;

/// Logs `{name}_BEGIN` on creation and `{name}_COMPLETE` or
/// `{name}_FAILED` when closed, with the elapsed time. A scope dropped
/// without being closed logs `{name}_INCOMPLETE`.
///
/// ```ignore
/// let scope = ObservationScope::new("RETURN_TO_STEADY_STATE", "my_test");
/// // ... poll ...
/// scope.complete();
/// ```
pub struct ObservationScope<'a> {
    name: &'a str,
    test: &'a str,
    started: Instant,
    closed: Cell<bool>,
}

impl<'a> ObservationScope<'a> {
    pub fn new(name: &'a str, test: &'a str) -> Self {
        Logger::info(&format!("{}_BEGIN", name), &[("test", test)]);
        Self {
            name,
            test,
            started: Instant::now(),
            closed: Cell::new(false),
        }
    }

    fn elapsed_ms(&self) -> String {
        self.started.elapsed().as_millis().to_string()
    }

    pub fn complete(self) {
        self.closed.set(true);
        let elapsed = self.elapsed_ms();
        Logger::info(
            &format!("{}_COMPLETE", self.name),
            &[("test", self.test), ("elapsed_ms", &elapsed)],
        );
    }

    pub fn fail(self, reason: &str) {
        self.closed.set(true);
        let elapsed = self.elapsed_ms();
        Logger::error(
            &format!("{}_FAILED", self.name),
            &[("test", self.test), ("elapsed_ms", &elapsed), ("reason", reason)],
        );
    }

    /// Close the scope according to `result` and hand the result back.
    pub fn finish<T, E: std::fmt::Display>(self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => self.complete(),
            Err(err) => self.fail(&err.to_string()),
        }
        result
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.closed.get() {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("test", self.test), ("reason", "scope dropped without completion")],
            );
        }
    }
}
