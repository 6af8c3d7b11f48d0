//! Reporting bridge between a loaded page and the driver
//!
//! One bridge exists per test run. The page attaches it by calling
//! `window.__setupJSDOMReporter()` (served as `/resources/testharnessreport.js`),
//! then delivers one event per assertion and a final completion event. The
//! bridge classifies each event, forwards it to the [`Reporter`], and owns the
//! run's state machine: only the first transition into `Resolved` counts.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Deserialize;
use tracing::{debug, error};

use crate::engine::Window;
use crate::reporter::Reporter;

/// Status codes shared by assertions and the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pass,
    Fail,
    Timeout,
    Incomplete,
    PreconditionFailed,
    Unknown(i64),
}

impl Status {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Status::Pass,
            1 => Status::Fail,
            2 => Status::Timeout,
            3 => Status::Incomplete,
            4 => Status::PreconditionFailed,
            other => Status::Unknown(other),
        }
    }
}

/// A per-assertion result as delivered by the page's harness
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AssertionResult {
    pub name: String,
    pub status: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
}

impl AssertionResult {
    pub fn new(name: impl Into<String>, status: i64) -> Self {
        Self {
            name: name.into(),
            status,
            message: None,
            stack: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// Harness-level status delivered with the completion event
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HarnessStatus {
    pub status: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
}

impl HarnessStatus {
    pub fn new(status: i64) -> Self {
        Self {
            status,
            message: None,
            stack: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// Stack text in the `message\nstack` shape the reporter expects
fn stack_text(message: &Option<String>, stack: &Option<String>) -> String {
    format!(
        "{}\n{}",
        message.as_deref().unwrap_or("undefined"),
        stack.as_deref().unwrap_or("undefined")
    )
}

// ---------------------------------------------------------------------------
// TestRunOutcome
// ---------------------------------------------------------------------------

/// Final classification of one test run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestRunOutcome {
    Pass,
    Fail { message: String, stack: String },
    Timeout { message: String, stack: String },
    Incomplete { message: String, stack: String },
    PreconditionFailed { message: String, stack: String },
    HarnessError { message: String, stack: String },
}

impl TestRunOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, TestRunOutcome::Pass)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            TestRunOutcome::Pass => None,
            TestRunOutcome::Fail { message, .. }
            | TestRunOutcome::Timeout { message, .. }
            | TestRunOutcome::Incomplete { message, .. }
            | TestRunOutcome::PreconditionFailed { message, .. }
            | TestRunOutcome::HarnessError { message, .. } => Some(message),
        }
    }

    pub fn harness_error(message: impl Into<String>, stack: impl Into<String>) -> Self {
        TestRunOutcome::HarnessError {
            message: message.into(),
            stack: stack.into(),
        }
    }
}

impl fmt::Display for TestRunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestRunOutcome::Pass => write!(f, "PASS"),
            TestRunOutcome::Fail { message, .. } => write!(f, "FAIL: {}", message),
            TestRunOutcome::Timeout { message, .. } => write!(f, "TIMEOUT: {}", message),
            TestRunOutcome::Incomplete { message, .. } => write!(f, "INCOMPLETE: {}", message),
            TestRunOutcome::PreconditionFailed { message, .. } => {
                write!(f, "PRECONDITION FAILED: {}", message)
            }
            TestRunOutcome::HarnessError { message, .. } => write!(f, "HARNESS ERROR: {}", message),
        }
    }
}

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// Driver state for one test run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Loading,
    Running,
    Resolved(TestRunOutcome),
}

impl RunState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, RunState::Resolved(_))
    }
}

#[derive(Debug)]
struct BridgeState {
    run: RunState,
    attached: bool,
    teardown_requested: bool,
    first_failure: Option<(String, String)>,
}

// ---------------------------------------------------------------------------
// ReportingBridge
// ---------------------------------------------------------------------------

/// Per-run channel from the page to the driver
#[derive(Clone)]
pub struct ReportingBridge {
    state: Rc<RefCell<BridgeState>>,
    reporter: Rc<dyn Reporter>,
}

impl fmt::Debug for ReportingBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportingBridge").field("state", &self.state).finish()
    }
}

impl ReportingBridge {
    pub fn new(reporter: Rc<dyn Reporter>) -> Self {
        Self {
            state: Rc::new(RefCell::new(BridgeState {
                run: RunState::Pending,
                attached: false,
                teardown_requested: false,
                first_failure: None,
            })),
            reporter,
        }
    }

    // -- page-facing ---------------------------------------------------------

    /// Called when the page runs `__setupJSDOMReporter()`.
    ///
    /// Worker fan-out is unsupported, so `fetch_tests_from_worker` becomes a
    /// no-op and such tests report as empty.
    pub fn attach(&self, window: &mut dyn Window) {
        {
            let mut state = self.state.borrow_mut();
            if state.attached {
                debug!(url = window.url(), "reporter already attached");
                return;
            }
            state.attached = true;
        }
        window.define_noop_function("fetch_tests_from_worker");
    }

    pub fn is_attached(&self) -> bool {
        self.state.borrow().attached
    }

    /// Per-assertion callback
    pub fn add_result(&self, result: AssertionResult) {
        {
            let state = self.state.borrow();
            if !state.attached || state.run.is_resolved() {
                debug!(name = %result.name, status = result.status, "ignoring assertion result");
                return;
            }
        }

        let stack = stack_text(&result.message, &result.stack);
        let failure = match Status::from_code(result.status) {
            Status::Pass => {
                self.reporter.pass(&result.name);
                return;
            }
            Status::Fail => format!("{}\n", result.name),
            Status::Timeout => format!("{} (timeout)\n", result.name),
            Status::Incomplete => format!("{} (incomplete)\n", result.name),
            Status::PreconditionFailed => format!("{} (precondition failed)\n", result.name),
            Status::Unknown(code) => {
                let message = format!("unknown test status: {}", code);
                self.reporter.fail(&message);
                self.record_failure(message, String::new());
                return;
            }
        };
        self.reporter.fail(&failure);
        self.reporter.report_stack(&stack);
        self.record_failure(failure, stack);
    }

    /// Per-suite completion callback. Always requests teardown.
    pub fn complete(&self, harness: HarnessStatus) {
        {
            let mut state = self.state.borrow_mut();
            if !state.attached {
                debug!(status = harness.status, "ignoring completion before attach");
                return;
            }
            state.teardown_requested = true;
            if state.run.is_resolved() {
                debug!(status = harness.status, "ignoring completion after resolution");
                return;
            }
        }

        let stack = stack_text(&harness.message, &harness.stack);
        let outcome = match Status::from_code(harness.status) {
            Status::Pass => {
                let first_failure = self.state.borrow().first_failure.clone();
                match first_failure {
                    None => TestRunOutcome::Pass,
                    Some((message, stack)) => TestRunOutcome::Fail {
                        message: message.trim_end().to_string(),
                        stack,
                    },
                }
            }
            Status::Fail => {
                self.reporter.fail("test harness threw unexpected error");
                self.reporter.report_stack(&stack);
                TestRunOutcome::harness_error("test harness threw unexpected error", stack)
            }
            Status::Timeout => {
                self.reporter.fail("test harness should not timeout");
                TestRunOutcome::Timeout {
                    message: "test harness should not timeout".to_string(),
                    stack,
                }
            }
            Status::Incomplete => {
                self.reporter.fail("test harness did not complete");
                self.reporter.report_stack(&stack);
                TestRunOutcome::Incomplete {
                    message: "test harness did not complete".to_string(),
                    stack,
                }
            }
            Status::PreconditionFailed => {
                self.reporter.fail("test harness precondition failed");
                self.reporter.report_stack(&stack);
                TestRunOutcome::PreconditionFailed {
                    message: "test harness precondition failed".to_string(),
                    stack,
                }
            }
            Status::Unknown(code) => {
                let message = format!("unknown test harness status: {}", code);
                self.reporter.fail(&message);
                TestRunOutcome::harness_error(message, String::new())
            }
        };
        self.resolve(outcome);
    }

    /// An uncaught page error after the bridge attached. Completes the page
    /// with harness status 1, as testharness.js does on an error event.
    pub fn script_error(&self, message: &str, stack: &str) {
        error!(error = message, stack, "uncaught exception in test page");
        self.complete(HarnessStatus::new(1).with_message(message).with_stack(stack));
    }

    /// Whether the page's event loop should stop
    pub fn teardown_requested(&self) -> bool {
        self.state.borrow().teardown_requested
    }

    // -- driver-facing -------------------------------------------------------

    pub fn state(&self) -> RunState {
        self.state.borrow().run.clone()
    }

    pub fn outcome(&self) -> Option<TestRunOutcome> {
        match &self.state.borrow().run {
            RunState::Resolved(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    pub(crate) fn begin_loading(&self) {
        self.advance(RunState::Pending, RunState::Loading);
    }

    pub(crate) fn begin_running(&self) {
        self.advance(RunState::Loading, RunState::Running);
    }

    fn advance(&self, from: RunState, to: RunState) {
        let mut state = self.state.borrow_mut();
        if state.run == from {
            state.run = to;
        }
    }

    /// Move to `Resolved`. Returns `false` if the run was already resolved.
    pub(crate) fn resolve(&self, outcome: TestRunOutcome) -> bool {
        let mut state = self.state.borrow_mut();
        if state.run.is_resolved() {
            debug!(%outcome, "ignoring second resolution");
            return false;
        }
        state.run = RunState::Resolved(outcome);
        true
    }

    fn record_failure(&self, message: String, stack: String) {
        let mut state = self.state.borrow_mut();
        if state.first_failure.is_none() {
            state.first_failure = Some((message, stack));
        }
    }
}
