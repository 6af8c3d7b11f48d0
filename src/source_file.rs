//! Source file expansion
//!
//! Maps one file of a web-platform-tests corpus to the logical test paths it
//! produces. A `.any.js` file can describe several scopes (window, workers,
//! shell); only the scopes a window-only DOM environment can execute become
//! runnable test paths.

use regex::Regex;
use std::fmt;
use std::path::{Component, Path};
use std::sync::OnceLock;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Directory names that hold support files rather than tests
const NON_TEST_DIRS: &[&str] = &["resources", "support", "tools", "common"];

/// A `// META: key=value` line from the head of a test script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
}

fn meta_regex() -> &'static Regex {
    static META: OnceLock<Regex> = OnceLock::new();
    META.get_or_init(|| Regex::new(r"^//\s*META:\s*(\w+)\s*=\s*(.*?)\s*$").unwrap())
}

/// Parse the leading `// META:` block of a script.
///
/// Parsing stops at the first line that is neither blank nor a `//` comment.
pub fn parse_meta(source: &str) -> Vec<MetaEntry> {
    let mut entries = Vec::new();
    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with("//") {
            break;
        }
        if let Some(caps) = meta_regex().captures(line) {
            entries.push(MetaEntry {
                key: caps[1].to_string(),
                value: caps[2].to_string(),
            });
        }
    }
    entries
}

/// Scope a test variant executes in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VariantScope {
    Window,
    DedicatedWorker,
    SharedWorker,
    ServiceWorker,
    Shell,
    ShadowRealm,
}

impl VariantScope {
    /// Suffix appended after `.any` for this scope's document
    fn any_suffix(&self) -> &'static str {
        match self {
            VariantScope::Window => ".any.html",
            VariantScope::DedicatedWorker => ".any.worker.html",
            VariantScope::SharedWorker => ".any.sharedworker.html",
            VariantScope::ServiceWorker => ".any.serviceworker.html",
            VariantScope::Shell => ".any.js",
            VariantScope::ShadowRealm => ".any.shadowrealm.html",
        }
    }

    /// Whether a window-only DOM environment can run this scope
    pub fn is_runnable(&self) -> bool {
        matches!(self, VariantScope::Window)
    }
}

impl fmt::Display for VariantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantScope::Window => write!(f, "window"),
            VariantScope::DedicatedWorker => write!(f, "dedicatedworker"),
            VariantScope::SharedWorker => write!(f, "sharedworker"),
            VariantScope::ServiceWorker => write!(f, "serviceworker"),
            VariantScope::Shell => write!(f, "jsshell"),
            VariantScope::ShadowRealm => write!(f, "shadowrealm"),
        }
    }
}

/// Expand a `global=` META value into scopes
fn parse_globals(value: &str, scopes: &mut Vec<VariantScope>) {
    for name in value.split(',').map(str::trim) {
        let expanded: &[VariantScope] = match name {
            "window" => &[VariantScope::Window],
            "worker" => &[
                VariantScope::DedicatedWorker,
                VariantScope::SharedWorker,
                VariantScope::ServiceWorker,
            ],
            "dedicatedworker" => &[VariantScope::DedicatedWorker],
            "sharedworker" => &[VariantScope::SharedWorker],
            "serviceworker" => &[VariantScope::ServiceWorker],
            "jsshell" => &[VariantScope::Shell],
            "shadowrealm" => &[VariantScope::ShadowRealm],
            _ => &[],
        };
        for scope in expanded {
            if !scopes.contains(scope) {
                scopes.push(*scope);
            }
        }
    }
}

/// One logical variant of a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestVariant {
    pub test_path: String,
    pub scope: VariantScope,
}

/// Kind of test a source file is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// `*.any.js`: runs in every scope listed by `// META: global=`
    Any,
    /// `*.window.js`: runs in a window only
    Window,
    /// `*.worker.js`: runs in a dedicated worker only
    Worker,
    /// A standalone HTML document
    Html,
    /// Support file, reference, manual test, or anything else
    NonTest,
}

/// A file of the test corpus, addressed relative to the corpus root
#[derive(Debug, Clone)]
pub struct SourceFile {
    root: std::path::PathBuf,
    relative_path: String,
}

impl SourceFile {
    /// `relative_path` uses the platform separator; it is normalized to `/`
    pub fn new(root: impl AsRef<Path>, relative_path: impl AsRef<Path>) -> Self {
        let relative_path = relative_path
            .as_ref()
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        Self {
            root: root.as_ref().to_path_buf(),
            relative_path,
        }
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    fn file_name(&self) -> &str {
        self.relative_path.rsplit('/').next().unwrap_or(&self.relative_path)
    }

    /// Whether the path names a support file rather than a test
    fn is_non_test(&self) -> bool {
        let mut parts: Vec<&str> = self.relative_path.split('/').collect();
        let Some(name) = parts.pop() else {
            return true;
        };
        if parts.iter().any(|dir| NON_TEST_DIRS.contains(dir) || dir.starts_with('.')) {
            return true;
        }
        if name.starts_with('.') || name.starts_with('_') {
            return true;
        }
        if parts.contains(&"reference") {
            return true;
        }
        let stem = name.split('.').next().unwrap_or(name);
        stem.ends_with("-ref")
            || stem.ends_with("-notref")
            || stem.ends_with("-manual")
            || name == "META.yml"
            || name == "WEB_FEATURES.yml"
    }

    pub fn kind(&self) -> SourceKind {
        if self.is_non_test() {
            return SourceKind::NonTest;
        }
        let name = self.file_name();
        if name.ends_with(".any.js") {
            SourceKind::Any
        } else if name.ends_with(".window.js") {
            SourceKind::Window
        } else if name.ends_with(".worker.js") {
            SourceKind::Worker
        } else if name.ends_with(".html") || name.ends_with(".htm") || name.ends_with(".xhtml") {
            SourceKind::Html
        } else {
            SourceKind::NonTest
        }
    }

    /// Scopes an `.any.js` file declares; window and dedicated worker by default
    fn any_scopes(&self) -> Result<Vec<VariantScope>> {
        let path = self.root.join(&self.relative_path);
        let bytes = std::fs::read(&path).map_err(|e| Error::discovery(&path, e))?;
        let source = String::from_utf8_lossy(&bytes);
        let mut scopes = Vec::new();
        let mut declared = false;
        for entry in parse_meta(&source) {
            if entry.key == "global" {
                declared = true;
                parse_globals(&entry.value, &mut scopes);
            }
        }
        if !declared {
            scopes = vec![VariantScope::Window, VariantScope::DedicatedWorker];
        }
        scopes.sort();
        Ok(scopes)
    }

    fn replace_suffix(&self, suffix: &str, replacement: &str) -> String {
        let base = &self.relative_path[..self.relative_path.len() - suffix.len()];
        format!("{}{}", base, replacement)
    }

    /// Every variant the file describes, runnable or not
    pub fn variants(&self) -> Result<Vec<TestVariant>> {
        let variants = match self.kind() {
            SourceKind::NonTest => Vec::new(),
            SourceKind::Html => vec![TestVariant {
                test_path: self.relative_path.clone(),
                scope: VariantScope::Window,
            }],
            SourceKind::Window => vec![TestVariant {
                test_path: self.replace_suffix(".window.js", ".window.html"),
                scope: VariantScope::Window,
            }],
            SourceKind::Worker => vec![TestVariant {
                test_path: self.replace_suffix(".worker.js", ".worker.html"),
                scope: VariantScope::DedicatedWorker,
            }],
            SourceKind::Any => self
                .any_scopes()?
                .into_iter()
                .map(|scope| TestVariant {
                    test_path: self.replace_suffix(".any.js", scope.any_suffix()),
                    scope,
                })
                .collect(),
        };
        Ok(variants)
    }

    /// Test paths this environment can run
    pub fn test_paths(&self) -> Result<Vec<String>> {
        Ok(self
            .variants()?
            .into_iter()
            .filter(|v| v.scope.is_runnable())
            .map(|v| v.test_path)
            .collect())
    }
}

/// Walk the corpus and return every runnable test path, sorted.
pub fn discover_test_paths(root: &Path) -> Result<Vec<String>> {
    let mut test_paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| Error::discovery(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| Error::discovery(entry.path(), e))?;
        test_paths.extend(SourceFile::new(root, relative).test_paths()?);
    }
    test_paths.sort();
    test_paths.dedup();
    Ok(test_paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_parse_meta() {
        let source = "// META: title=Blob constructor\n//META: script=support.js\n// META: timeout=long\n\ntest(() => {});\n// META: script=ignored.js\n";
        let meta = parse_meta(source);
        assert_eq!(
            meta,
            vec![
                MetaEntry { key: "title".into(), value: "Blob constructor".into() },
                MetaEntry { key: "script".into(), value: "support.js".into() },
                MetaEntry { key: "timeout".into(), value: "long".into() },
            ]
        );
    }

    #[test]
    fn test_kind_detection() {
        let root = Path::new("/corpus");
        assert_eq!(SourceFile::new(root, "a/b.any.js").kind(), SourceKind::Any);
        assert_eq!(SourceFile::new(root, "a/b.window.js").kind(), SourceKind::Window);
        assert_eq!(SourceFile::new(root, "a/b.worker.js").kind(), SourceKind::Worker);
        assert_eq!(SourceFile::new(root, "a/b.html").kind(), SourceKind::Html);
        assert_eq!(SourceFile::new(root, "a/b.js").kind(), SourceKind::NonTest);
        assert_eq!(SourceFile::new(root, "a/resources/b.html").kind(), SourceKind::NonTest);
        assert_eq!(SourceFile::new(root, "a/b-ref.html").kind(), SourceKind::NonTest);
        assert_eq!(SourceFile::new(root, "a/b-manual.html").kind(), SourceKind::NonTest);
        assert_eq!(SourceFile::new(root, "a/_tmp.html").kind(), SourceKind::NonTest);
    }

    #[test]
    fn test_any_js_default_scopes() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("foo.any.js"), "test(() => {});").unwrap();
        let file = SourceFile::new(dir.path(), "foo.any.js");
        let variants = file.variants().unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].test_path, "foo.any.html");
        assert_eq!(variants[1].test_path, "foo.any.worker.html");
        assert_eq!(file.test_paths().unwrap(), vec!["foo.any.html".to_string()]);
    }

    #[test]
    fn test_any_js_not_utf8() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("latin1.any.js"), b"// META: title=caf\xe9\n// META: global=window\n").unwrap();
        let file = SourceFile::new(dir.path(), "latin1.any.js");
        assert_eq!(file.test_paths().unwrap(), vec!["latin1.any.html".to_string()]);
        assert_eq!(file.variants().unwrap().len(), 1);
    }

    #[test]
    fn test_any_js_worker_only() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("w.any.js"), "// META: global=worker\ntest(() => {});").unwrap();
        let file = SourceFile::new(dir.path(), "w.any.js");
        assert_eq!(file.variants().unwrap().len(), 3);
        assert!(file.test_paths().unwrap().is_empty());
    }

    #[test]
    fn test_discover_sorted() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b/resources")).unwrap();
        std::fs::write(dir.path().join("b/z.window.js"), "").unwrap();
        std::fs::write(dir.path().join("b/resources/helper.js"), "").unwrap();
        std::fs::write(dir.path().join("a.html"), "").unwrap();
        std::fs::write(dir.path().join("c.any.js"), "").unwrap();
        std::fs::write(dir.path().join("c.worker.js"), "").unwrap();

        let paths = discover_test_paths(dir.path()).unwrap();
        assert_eq!(paths, vec!["a.html", "b/z.window.html", "c.any.html"]);
    }

    #[test]
    fn test_discover_missing_root() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(discover_test_paths(&missing), Err(Error::Discovery { .. })));
    }
}
