//! The injected reporter for contained foreign exceptions.
//!
//! The bridge never lets a continuation fault reach the host's
//! unhandled-rejection channel; it hands the fault to a [`FaultReporter`]
//! instead. The reporter is a collaborator, not a global: production code
//! injects [`ConsoleReporter`], tests inject [`CollectingReporter`] and
//! assert on what was reported.

use std::cell::RefCell;
use std::rc::Rc;

use causeway_types::Fault;

/// The fixed first line written for every contained fault.
pub const UNHANDLED_FAULT_MESSAGE: &str = "The promise does not handle the following exception";

/// Sink for faults contained by the bridge's combinators. Called exactly
/// once per contained fault.
pub trait FaultReporter {
    /// Record one contained fault.
    fn report(&self, fault: &Fault);
}

/// Writes two lines to the process error channel: the fixed introductory
/// message and the fault's rendering. Also emits a `tracing::error!`
/// event for subscribers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl FaultReporter for ConsoleReporter {
    fn report(&self, fault: &Fault) {
        tracing::error!(payload = %fault.payload(), "contained foreign exception in promise continuation");
        eprintln!("{UNHANDLED_FAULT_MESSAGE}");
        eprintln!("{}", fault.payload());
    }
}

/// Accumulates reported faults for inspection.
#[derive(Debug, Default, Clone)]
pub struct CollectingReporter {
    faults: Rc<RefCell<Vec<Fault>>>,
}

impl CollectingReporter {
    /// An empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything reported so far.
    #[must_use]
    pub fn take(&self) -> Vec<Fault> {
        self.faults.borrow_mut().drain(..).collect()
    }
}

impl FaultReporter for CollectingReporter {
    fn report(&self, fault: &Fault) {
        self.faults.borrow_mut().push(fault.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_types::Value;

    #[test]
    fn collector_accumulates_and_drains() {
        let reporter = CollectingReporter::new();
        reporter.report(&Fault::message("one"));
        reporter.report(&Fault::new(Value::from(2)));

        let reported = reporter.take();
        assert_eq!(reported.len(), 2);
        assert_eq!(reported[0].payload(), &Value::text("one"));
        assert_eq!(reported[1].payload(), &Value::from(2));
        assert!(reporter.take().is_empty());
    }
}
