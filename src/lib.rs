//! wpt-harness: run web-platform-tests against an embeddable DOM engine
//!
//! The harness serves a WPT checkout to a [`DomEngine`] without touching the
//! network, runs each test document, and reports every `testharness.js`
//! assertion through a [`Reporter`].
//!
//! # Quick Start
//!
//! ```no_run
//! use wpt_harness::{run, RunOptions, ScriptedEngine};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> wpt_harness::Result<()> {
//!     let failures = run("wpt/dom", &ScriptedEngine::new(), RunOptions::new()).await?;
//!     println!("{} failing tests", failures);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! A run flows: [`source_file`] discovery → [`runner`] → [`driver`] →
//! [`engine`] → [`fetch`] → [`router`], with results coming back through
//! [`bridge`] into a [`reporter`].
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Serving** | [`router`], [`fetch`], [`server`] |
//! | **Execution** | [`driver`], [`bridge`], [`engine`] |
//! | **Orchestration** | [`runner`], [`source_file`], [`config`], [`reporter`] |

pub mod bridge;
pub mod config;
pub mod driver;
pub mod engine;
pub mod fetch;
pub mod reporter;
pub mod router;
pub mod runner;
pub mod server;
pub mod source_file;

mod error;

pub use bridge::{AssertionResult, HarnessStatus, ReportingBridge, RunState, Status, TestRunOutcome};
pub use config::{normalize_root_url, AcceptAll, PatternFilter, RunOptions, RunnerConfig, TestFilter};
pub use driver::{SetupHook, TestDriver};
pub use engine::scripted::ScriptedEngine;
pub use engine::{DomEngine, LoadRequest, Window};
pub use error::{Error, FetchError, LoadError, Result, RouteError};
pub use fetch::{CancelToken, Fetch, FetchHandle, ResourceLoader, VirtualRequest};
pub use reporter::{ConsoleReporter, Reporter, RunSummary, SummaryReporter};
pub use router::{HarnessAssets, Router};
pub use runner::run;

/// wpt-harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
