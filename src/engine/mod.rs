//! DOM engine seam
//!
//! The harness does not parse HTML or run scripts itself. A [`DomEngine`]
//! loads a document through the [`ResourceLoader`] it is handed and returns a
//! [`Window`] the driver can patch, attach the reporting bridge to, and drive
//! until the page goes idle.

pub mod scripted;

use async_trait::async_trait;

use crate::bridge::ReportingBridge;
use crate::error::LoadError;
use crate::fetch::ResourceLoader;

/// A full-page load request
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Absolute URL of the document
    pub url: String,
    /// Loader for the document and every sub-resource
    pub loader: ResourceLoader,
}

/// An engine able to load documents and execute their scripts
#[async_trait(?Send)]
pub trait DomEngine {
    /// Fetch and parse the document at `request.url`.
    ///
    /// Scripts may be queued but must not run before [`Window::settle`], so
    /// the driver can patch globals and attach the bridge first.
    async fn load(&self, request: LoadRequest) -> Result<Box<dyn Window>, LoadError>;
}

/// A loaded document and its global scope
#[async_trait(?Send)]
pub trait Window {
    /// URL the document was loaded from
    fn url(&self) -> &str;

    /// Define `name` as a constructor producing objects that do nothing
    fn define_inert_constructor(&mut self, name: &str);

    /// Define `name` as a function that ignores its arguments and returns
    /// `undefined`
    fn define_noop_function(&mut self, name: &str);

    /// Make `window.__setupJSDOMReporter()` attach `bridge`
    fn install_reporter(&mut self, bridge: ReportingBridge);

    /// Run scripts and queued tasks until nothing is left to do or the bridge
    /// asks for teardown.
    ///
    /// Returns an error only for failures raised before the page attached
    /// the bridge; later script errors go to
    /// [`ReportingBridge::script_error`].
    async fn settle(&mut self) -> Result<(), LoadError>;

    /// Tear the environment down. Further calls do nothing.
    fn close(&mut self);
}
