#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Ordered record of every operation identifier that passed through the
/// dispatch hook, including invocations that later failed a contract
/// check. Owned by the session whose invocations it records; it
/// accumulates until [`OpLog::reset`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpLog {
    entries: Vec<String>,
}

impl OpLog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn append(&mut self, operation: impl Into<String>) {
        self.entries.push(operation.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Unconditional clear. No error conditions.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// The logged identifiers in invocation order, comma-separated.
    #[must_use]
    pub fn render(&self) -> String {
        self.entries.join(",")
    }

    /// Print the rendered log to stdout. Output only; the log is not
    /// mutated.
    pub fn display(&self) {
        println!("{}", self.render());
    }
}

#[cfg(test)]
mod tests {
    use super::OpLog;

    #[test]
    fn append_preserves_invocation_order() {
        let mut log = OpLog::new();
        log.append("add");
        log.append("mul");
        log.append("add");
        assert_eq!(log.entries(), ["add", "mul", "add"]);
        assert_eq!(log.render(), "add,mul,add");
    }

    #[test]
    fn reset_always_yields_an_empty_log() {
        let mut log = OpLog::new();
        log.reset();
        assert!(log.is_empty());

        log.append("add");
        log.append("sub");
        log.reset();
        assert!(log.is_empty());
        assert_eq!(log.render(), "");
    }

    #[test]
    fn render_does_not_mutate() {
        let mut log = OpLog::new();
        log.append("neg");
        let first = log.render();
        let second = log.render();
        assert_eq!(first, second);
        assert_eq!(log.len(), 1);
    }
}
