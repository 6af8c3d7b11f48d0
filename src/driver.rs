//! Test execution driver
//!
//! Runs one test document: load it through the engine, patch the globals the
//! environment lacks, run the user's setup hook, attach the reporting bridge,
//! and let the page run until its harness reports completion.
//!
//! ```text
//! Pending -> Loading -> Running -> Resolved
//!               \__________________/
//!                 load failure
//! ```

use std::rc::Rc;

use tracing::{debug, error};

use crate::bridge::{ReportingBridge, TestRunOutcome};
use crate::engine::{DomEngine, LoadRequest, Window};
use crate::error::LoadError;
use crate::fetch::ResourceLoader;
use crate::reporter::Reporter;

/// Worker constructors the environment does not provide
const INERT_CONSTRUCTORS: &[&str] = &["Worker", "SharedWorker"];

/// Hook run against every window before the bridge is installed
pub type SetupHook = Rc<dyn Fn(&mut dyn Window)>;

/// Message for pages that went idle without reporting completion
pub const NO_COMPLETION: &str = "test harness did not report completion";

/// Drives single test runs against one engine
pub struct TestDriver<'a> {
    engine: &'a dyn DomEngine,
    loader: ResourceLoader,
    reporter: Rc<dyn Reporter>,
    setup: SetupHook,
}

impl<'a> TestDriver<'a> {
    pub fn new(engine: &'a dyn DomEngine, loader: ResourceLoader, reporter: Rc<dyn Reporter>) -> Self {
        Self {
            engine,
            loader,
            reporter,
            setup: Rc::new(|_: &mut dyn Window| {}),
        }
    }

    pub fn with_setup(mut self, setup: SetupHook) -> Self {
        self.setup = setup;
        self
    }

    /// Run the document at `url`; `true` means the test passed
    pub async fn run_test(&self, url: &str) -> bool {
        self.run_test_outcome(url).await.is_pass()
    }

    /// Run the document at `url` and return its classified outcome
    pub async fn run_test_outcome(&self, url: &str) -> TestRunOutcome {
        let bridge = ReportingBridge::new(Rc::clone(&self.reporter));
        bridge.begin_loading();

        let request = LoadRequest {
            url: url.to_string(),
            loader: self.loader.clone(),
        };
        let mut window = match self.engine.load(request).await {
            Ok(window) => window,
            Err(err) => {
                self.fail_with(&bridge, err);
                return self.finish(&bridge);
            }
        };

        for name in INERT_CONSTRUCTORS {
            window.define_inert_constructor(name);
        }
        (self.setup)(window.as_mut());
        window.install_reporter(bridge.clone());
        bridge.begin_running();

        if let Err(err) = window.settle().await {
            self.fail_with(&bridge, err);
        }
        window.close();

        if bridge.outcome().is_none() {
            self.reporter.fail(NO_COMPLETION);
            bridge.resolve(TestRunOutcome::Incomplete {
                message: NO_COMPLETION.to_string(),
                stack: String::new(),
            });
        }
        self.finish(&bridge)
    }

    /// Resolve with a harness error, reporting the stack only if this is the
    /// run's first resolution
    fn fail_with(&self, bridge: &ReportingBridge, err: LoadError) {
        let stack = err.stack();
        if bridge.resolve(TestRunOutcome::harness_error(err.to_string(), stack.clone())) {
            error!(error = %err, "test document failed to load");
            self.reporter.report_stack(&stack);
        } else {
            debug!(error = %err, "load error after resolution ignored");
        }
    }

    fn finish(&self, bridge: &ReportingBridge) -> TestRunOutcome {
        bridge
            .outcome()
            .unwrap_or_else(|| TestRunOutcome::harness_error(NO_COMPLETION, String::new()))
    }
}
