//! Virtual resource router
//!
//! Answers every URL a test page can request: synthesized harness documents,
//! well-known harness scripts and stubs, and files of the test corpus. The
//! route table is built once and never changes; nothing is cached between
//! requests.

pub mod handlers;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use url::Url;

use crate::error::RouteError;
use crate::fetch::{CancelToken, VirtualRequest};
pub use handlers::DocumentHandler;

/// Directory holding the bundled harness scripts
pub const DEFAULT_HARNESS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/harness");

/// Locations of the harness scripts served verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessAssets {
    pub testharness: PathBuf,
    pub idlharness: PathBuf,
    pub webidl_parser: PathBuf,
    pub gc: PathBuf,
    pub testdriver: PathBuf,
}

impl HarnessAssets {
    /// Assets laid out as `testharness.js`, `idlharness.js`,
    /// `webidl2/lib/webidl2.js`, `gc.js` and `testdriver-dummy.js` under `dir`
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            testharness: dir.join("testharness.js"),
            idlharness: dir.join("idlharness.js"),
            webidl_parser: dir.join("webidl2").join("lib").join("webidl2.js"),
            gc: dir.join("gc.js"),
            testdriver: dir.join("testdriver-dummy.js"),
        }
    }
}

impl Default for HarnessAssets {
    fn default() -> Self {
        Self::from_dir(DEFAULT_HARNESS_DIR)
    }
}

/// Which transport a request arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// In-process fetch adapter
    Virtual,
    /// Real socket
    Socket,
}

/// Entry of the exact-path resource table
enum StaticResource {
    /// Read from a bundled asset
    Asset(fn(&HarnessAssets) -> &Path),
    /// Fixed inline body
    Inline(&'static str),
}

/// Exact-path resources, in lookup order
const RESOURCE_TABLE: &[(&str, StaticResource)] = &[
    ("/resources/testharness.js", StaticResource::Asset(|a| a.testharness.as_path())),
    ("/resources/idlharness.js", StaticResource::Asset(|a| a.idlharness.as_path())),
    ("/resources/WebIDLParser.js", StaticResource::Asset(|a| a.webidl_parser.as_path())),
    ("/common/gc.js", StaticResource::Asset(|a| a.gc.as_path())),
    (
        "/service-workers/service-worker/resources/test-helpers.sub.js",
        StaticResource::Inline("window.service_worker_test = () => {};"),
    ),
    (
        "/resources/testharnessreport.js",
        StaticResource::Inline("window.__setupJSDOMReporter();"),
    ),
    (
        "/streams/resources/test-initializer.js",
        StaticResource::Inline("window.worker_test = () => {};"),
    ),
    ("/resources/testharness.css", StaticResource::Inline("")),
    ("/resources/testdriver.js", StaticResource::Asset(|a| a.testdriver.as_path())),
    ("/resources/testdriver-vendor.js", StaticResource::Inline("")),
];

/// Paths that only the virtual transport answers from the table
const VIRTUAL_ONLY: &[&str] = &["/common/gc.js"];

/// Read a file, giving up as soon as `cancel` fires
async fn read_file(path: &Path, cancel: &CancelToken) -> Result<std::io::Result<Vec<u8>>, RouteError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RouteError::Cancelled),
        result = tokio::fs::read(path) => Ok(result),
    }
}

/// Stateless URL resolver over an immutable route table
#[derive(Debug, Clone)]
pub struct Router {
    host: String,
    tests_path: PathBuf,
    tests_url: String,
    assets: HarnessAssets,
    routes: Vec<DocumentHandler>,
}

impl Router {
    /// `host` is an origin such as `http://127.0.0.1:8000`; `tests_url` is
    /// the URL path prefix the corpus is mounted under, e.g. `/` or `/wpt/`.
    pub fn new(
        host: impl Into<String>,
        tests_path: impl Into<PathBuf>,
        tests_url: impl Into<String>,
        assets: HarnessAssets,
    ) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            tests_path: tests_path.into(),
            tests_url: tests_url.into(),
            assets,
            routes: vec![DocumentHandler::Window, DocumentHandler::AnyHtml],
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn tests_path(&self) -> &Path {
        &self.tests_path
    }

    pub fn tests_url(&self) -> &str {
        &self.tests_url
    }

    /// Resolve a request from the virtual fetch adapter
    pub async fn resolve(&self, request: &VirtualRequest) -> Result<Vec<u8>, RouteError> {
        self.route(&request.url, Transport::Virtual, &request.cancel).await
    }

    /// Resolve a request that arrived over a socket
    pub async fn resolve_socket(&self, url: &str) -> Result<Vec<u8>, RouteError> {
        self.route(url, Transport::Socket, &CancelToken::new()).await
    }

    async fn route(&self, url: &str, transport: Transport, cancel: &CancelToken) -> Result<Vec<u8>, RouteError> {
        if cancel.is_cancelled() {
            return Err(RouteError::Cancelled);
        }

        let parsed = Url::parse(url).map_err(|_| RouteError::UnexpectedUrl(url.to_string()))?;
        let origin = parsed.origin().ascii_serialization();
        if origin != self.host {
            warn!(url, origin = %origin, expected = %self.host, "rejected cross-origin request");
            return Err(RouteError::OriginMismatch {
                url: url.to_string(),
                origin,
                expected: self.host.clone(),
            });
        }

        let pathname = parsed.path();
        debug!(pathname, ?transport, "routing request");

        for handler in &self.routes {
            if pathname.ends_with(handler.suffix()) {
                if let Some(document) = self.synthesize(*handler, &parsed, cancel).await? {
                    return Ok(document);
                }
                break;
            }
        }

        let skip_table = transport == Transport::Socket && VIRTUAL_ONLY.contains(&pathname);
        if !skip_table {
            if let Some((_, resource)) = RESOURCE_TABLE.iter().find(|(path, _)| *path == pathname) {
                return match resource {
                    StaticResource::Inline(body) => Ok(body.as_bytes().to_vec()),
                    StaticResource::Asset(locate) => {
                        let path = locate(&self.assets);
                        read_file(path, cancel).await?.map_err(|source| RouteError::Asset {
                            path: path.to_path_buf(),
                            source,
                        })
                    }
                };
            }
        }

        if let Some(path) = handlers::filesystem_path(&self.tests_path, pathname, &self.tests_url) {
            // Any read failure, permission errors included, is reported as an unexpected URL.
            if let Ok(body) = read_file(&path, cancel).await? {
                return Ok(body);
            }
        }

        warn!(url, "unexpected URL");
        Err(RouteError::UnexpectedUrl(url.to_string()))
    }

    /// Build the harness document for `url`, or `None` when the wrapped
    /// script does not exist so the request falls through to the corpus.
    async fn synthesize(
        &self,
        handler: DocumentHandler,
        url: &Url,
        cancel: &CancelToken,
    ) -> Result<Option<Vec<u8>>, RouteError> {
        let script_pathname = handler.script_pathname(url.path());
        let Some(script_path) = handlers::filesystem_path(&self.tests_path, &script_pathname, &self.tests_url) else {
            return Ok(None);
        };
        match read_file(&script_path, cancel).await? {
            Ok(source) => {
                let source = String::from_utf8_lossy(&source);
                Ok(Some(handler.render(url, &source).into_bytes()))
            }
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HOST: &str = "http://127.0.0.1:8000";

    fn router_for(dir: &Path) -> Router {
        Router::new(HOST, dir, "/", HarnessAssets::from_dir(dir.join("harness")))
    }

    #[tokio::test]
    async fn test_inline_stub() {
        let dir = tempdir().unwrap();
        let router = router_for(dir.path());
        let body = router
            .resolve(&VirtualRequest::new(format!("{}/resources/testharnessreport.js", HOST)))
            .await
            .unwrap();
        assert_eq!(body, b"window.__setupJSDOMReporter();");
    }

    #[tokio::test]
    async fn test_missing_asset_is_asset_error() {
        let dir = tempdir().unwrap();
        let router = router_for(dir.path());
        let err = router
            .resolve(&VirtualRequest::new(format!("{}/resources/idlharness.js", HOST)))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Asset { .. }));
    }

    #[tokio::test]
    async fn test_gc_helper_is_virtual_only() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("harness")).unwrap();
        std::fs::write(dir.path().join("harness/gc.js"), "self.garbageCollect = () => {};").unwrap();
        let router = router_for(dir.path());
        let url = format!("{}/common/gc.js", HOST);

        assert!(router.resolve(&VirtualRequest::new(url.clone())).await.is_ok());
        let err = router.resolve_socket(&url).await.unwrap_err();
        assert!(matches!(err, RouteError::UnexpectedUrl(_)));
    }

    #[tokio::test]
    async fn test_window_html_without_script_falls_through() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("bar.window.html"), "<p>static</p>").unwrap();
        let router = router_for(dir.path());
        let body = router
            .resolve(&VirtualRequest::new(format!("{}/bar.window.html", HOST)))
            .await
            .unwrap();
        assert_eq!(body, b"<p>static</p>");
    }

    #[tokio::test]
    async fn test_cancelled_request_fails() {
        let dir = tempdir().unwrap();
        let router = router_for(dir.path());
        let request = VirtualRequest::new(format!("{}/resources/testharness.css", HOST));
        request.cancel.cancel();
        assert!(matches!(router.resolve(&request).await, Err(RouteError::Cancelled)));
    }

    #[tokio::test]
    async fn test_unparseable_url() {
        let dir = tempdir().unwrap();
        let router = router_for(dir.path());
        let err = router.resolve(&VirtualRequest::new("not a url")).await.unwrap_err();
        assert!(matches!(err, RouteError::UnexpectedUrl(_)));
    }
}
