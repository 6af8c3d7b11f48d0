//! Run configuration
//!
//! [`RunOptions`] is what the orchestrator consumes. [`RunnerConfig`] is its
//! on-disk form (`wpt-harness.json`), limited to what can be expressed in
//! JSON: setup hooks and custom filters are code-only.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::driver::SetupHook;
use crate::engine::Window;
use crate::error::{Error, Result};
use crate::reporter::{ConsoleReporter, Reporter};
use crate::router::{HarnessAssets, DEFAULT_HARNESS_DIR};

/// Ensure a single leading and a single trailing `/`
pub fn normalize_root_url(root_url: &str) -> String {
    let trimmed = root_url.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Decides whether a discovered test runs. May suspend.
#[async_trait(?Send)]
pub trait TestFilter {
    async fn accept(&self, test_path: &str, url: &str) -> bool;
}

#[async_trait(?Send)]
impl<F> TestFilter for F
where
    F: Fn(&str, &str) -> bool,
{
    async fn accept(&self, test_path: &str, url: &str) -> bool {
        self(test_path, url)
    }
}

/// Accepts every test
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

#[async_trait(?Send)]
impl TestFilter for AcceptAll {
    async fn accept(&self, _test_path: &str, _url: &str) -> bool {
        true
    }
}

/// Substring include/exclude lists over test paths.
///
/// An empty include list accepts everything not excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl PatternFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    pub fn matches(&self, test_path: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| test_path.contains(p.as_str()));
        included && !self.exclude.iter().any(|p| test_path.contains(p.as_str()))
    }
}

#[async_trait(?Send)]
impl TestFilter for PatternFilter {
    async fn accept(&self, test_path: &str, _url: &str) -> bool {
        self.matches(test_path)
    }
}

// ---------------------------------------------------------------------------
// RunOptions
// ---------------------------------------------------------------------------

/// Options for [`run`](crate::runner::run)
pub struct RunOptions {
    /// URL path prefix the corpus is served under
    pub root_url: String,
    /// Called with every window before the test's harness attaches
    pub setup: SetupHook,
    pub filter: Rc<dyn TestFilter>,
    pub reporter: Rc<dyn Reporter>,
    pub assets: HarnessAssets,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            root_url: "/".to_string(),
            setup: Rc::new(|_: &mut dyn Window| {}),
            filter: Rc::new(AcceptAll),
            reporter: Rc::new(ConsoleReporter),
            assets: HarnessAssets::default(),
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_url(mut self, root_url: impl Into<String>) -> Self {
        self.root_url = root_url.into();
        self
    }

    pub fn setup(mut self, setup: impl Fn(&mut dyn Window) + 'static) -> Self {
        self.setup = Rc::new(setup);
        self
    }

    pub fn filter(mut self, filter: impl TestFilter + 'static) -> Self {
        self.filter = Rc::new(filter);
        self
    }

    pub fn reporter(mut self, reporter: Rc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn assets(mut self, assets: HarnessAssets) -> Self {
        self.assets = assets;
        self
    }
}

// ---------------------------------------------------------------------------
// RunnerConfig
// ---------------------------------------------------------------------------

/// Serializable run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunnerConfig {
    #[serde(default = "default_root_url")]
    pub root_url: String,
    #[serde(default = "default_harness_dir")]
    pub harness_dir: PathBuf,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_root_url() -> String {
    "/".to_string()
}

fn default_harness_dir() -> PathBuf {
    PathBuf::from(DEFAULT_HARNESS_DIR)
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            root_url: default_root_url(),
            harness_dir: default_harness_dir(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl RunnerConfig {
    /// Parse a config from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    /// Load a config file. Relative `harnessDir` values resolve against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config = Self::from_json(&text)?;
        if config.harness_dir.is_relative() {
            if let Some(dir) = path.parent() {
                config.harness_dir = dir.join(&config.harness_dir);
            }
        }
        Ok(config)
    }

    pub fn pattern_filter(&self) -> PatternFilter {
        PatternFilter::new(self.include.clone(), self.exclude.clone())
    }

    /// Options carrying this config's root URL, assets, and filter
    pub fn to_options(&self) -> RunOptions {
        RunOptions::new()
            .root_url(self.root_url.clone())
            .assets(HarnessAssets::from_dir(&self.harness_dir))
            .filter(self.pattern_filter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_root_url() {
        assert_eq!(normalize_root_url("/"), "/");
        assert_eq!(normalize_root_url(""), "/");
        assert_eq!(normalize_root_url("wpt"), "/wpt/");
        assert_eq!(normalize_root_url("/wpt"), "/wpt/");
        assert_eq!(normalize_root_url("wpt/"), "/wpt/");
        assert_eq!(normalize_root_url("//a/b//"), "/a/b/");
    }

    #[test]
    fn test_pattern_filter() {
        let filter = PatternFilter::new(vec!["dom/".to_string()], vec!["slow".to_string()]);
        assert!(filter.matches("dom/nodes/a.html"));
        assert!(!filter.matches("dom/nodes/slow.html"));
        assert!(!filter.matches("fetch/a.any.html"));
        assert!(PatternFilter::default().matches("anything.html"));
    }

    #[tokio::test]
    async fn test_closure_filter() {
        let filter = |path: &str, _url: &str| path.ends_with(".any.html");
        assert!(filter.accept("a.any.html", "http://x/a.any.html").await);
        assert!(!filter.accept("a.html", "http://x/a.html").await);
        assert!(AcceptAll.accept("a.html", "").await);
    }

    #[test]
    fn test_config_from_json() {
        let config = RunnerConfig::from_json(r#"{"rootUrl": "wpt", "exclude": ["manual"]}"#).unwrap();
        assert_eq!(config.root_url, "wpt");
        assert_eq!(config.exclude, vec!["manual".to_string()]);
        assert_eq!(config.harness_dir, PathBuf::from(DEFAULT_HARNESS_DIR));
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        let err = RunnerConfig::from_json(r#"{"rootURL": "/"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_config_load_resolves_harness_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wpt-harness.json");
        std::fs::write(&path, r#"{"harnessDir": "vendor/harness"}"#).unwrap();
        let config = RunnerConfig::load(&path).unwrap();
        assert_eq!(config.harness_dir, dir.path().join("vendor/harness"));
    }
}
