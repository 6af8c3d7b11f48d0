//! Reporter interface and the bundled reporters
//!
//! The driver emits four kinds of events: a suite starts, an assertion
//! passes, something fails (with a message), and a stack trace is available
//! for the preceding failure. Where and how they are shown is up to the
//! reporter.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use serde::Serialize;

/// Receiver of run events.
///
/// Runs are sequential and single-threaded, so reporters take `&self` and use
/// interior mutability if they need state.
pub trait Reporter {
    fn start_suite(&self, name: &str);
    fn pass(&self, name: &str);
    fn fail(&self, message: &str);
    fn report_stack(&self, stack: &str);
}

impl<R: Reporter + ?Sized> Reporter for Rc<R> {
    fn start_suite(&self, name: &str) {
        (**self).start_suite(name)
    }

    fn pass(&self, name: &str) {
        (**self).pass(name)
    }

    fn fail(&self, message: &str) {
        (**self).fail(message)
    }

    fn report_stack(&self, stack: &str) {
        (**self).report_stack(stack)
    }
}

// ---------------------------------------------------------------------------
// ConsoleReporter
// ---------------------------------------------------------------------------

const INDENT: &str = "  ";

fn indent(text: &str, depth: usize) -> String {
    let prefix = INDENT.repeat(depth);
    text.lines()
        .map(|line| format!("{}{}", prefix, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Plain-text reporter writing to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    fn emit(&self, text: &str) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        // A closed stdout must not abort the run.
        let _ = writeln!(out, "{}", text);
    }
}

impl Reporter for ConsoleReporter {
    fn start_suite(&self, name: &str) {
        self.emit(&format!("\n{}{}\n", INDENT, name));
    }

    fn pass(&self, name: &str) {
        self.emit(&indent(&format!("\u{221A} {}", name), 2));
    }

    fn fail(&self, message: &str) {
        self.emit(&indent(&format!("\u{00D7} {}", message.trim_end()), 2));
    }

    fn report_stack(&self, stack: &str) {
        self.emit(&indent(stack.trim_end(), 3));
    }
}

// ---------------------------------------------------------------------------
// SummaryReporter
// ---------------------------------------------------------------------------

/// Events recorded for one suite
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteSummary {
    pub name: String,
    pub passed: Vec<String>,
    pub failures: Vec<String>,
    pub stacks: Vec<String>,
}

/// Everything a [`SummaryReporter`] saw during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub suites: Vec<SuiteSummary>,
}

impl RunSummary {
    /// Names of suites with at least one failure event
    pub fn failing_suites(&self) -> Vec<&str> {
        self.suites
            .iter()
            .filter(|s| !s.failures.is_empty())
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "suites": self.suites.len(),
            "failing": self.failing_suites(),
            "passed_assertions": self.suites.iter().map(|s| s.passed.len()).sum::<usize>(),
            "failure_events": self.suites.iter().map(|s| s.failures.len()).sum::<usize>(),
            "details": self.suites,
        })
    }
}

/// Records events, optionally forwarding them to another reporter
#[derive(Default)]
pub struct SummaryReporter {
    summary: RefCell<RunSummary>,
    forward: Option<Box<dyn Reporter>>,
}

impl SummaryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record events and also pass them on to `reporter`
    pub fn forwarding_to(reporter: impl Reporter + 'static) -> Self {
        Self {
            summary: RefCell::default(),
            forward: Some(Box::new(reporter)),
        }
    }

    pub fn summary(&self) -> RunSummary {
        self.summary.borrow().clone()
    }

    fn with_current(&self, f: impl FnOnce(&mut SuiteSummary)) {
        let mut summary = self.summary.borrow_mut();
        if summary.suites.is_empty() {
            summary.suites.push(SuiteSummary::default());
        }
        if let Some(suite) = summary.suites.last_mut() {
            f(suite);
        }
    }
}

impl Reporter for SummaryReporter {
    fn start_suite(&self, name: &str) {
        self.summary.borrow_mut().suites.push(SuiteSummary {
            name: name.to_string(),
            ..Default::default()
        });
        if let Some(forward) = &self.forward {
            forward.start_suite(name);
        }
    }

    fn pass(&self, name: &str) {
        self.with_current(|suite| suite.passed.push(name.to_string()));
        if let Some(forward) = &self.forward {
            forward.pass(name);
        }
    }

    fn fail(&self, message: &str) {
        self.with_current(|suite| suite.failures.push(message.to_string()));
        if let Some(forward) = &self.forward {
            forward.fail(message);
        }
    }

    fn report_stack(&self, stack: &str) {
        self.with_current(|suite| suite.stacks.push(stack.to_string()));
        if let Some(forward) = &self.forward {
            forward.report_stack(stack);
        }
    }
}
