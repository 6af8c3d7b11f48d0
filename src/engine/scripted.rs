//! Directive-driven engine
//!
//! A minimal [`DomEngine`] for exercising the harness without a browser
//! engine. Documents are fetched through the resource loader and their
//! `<script>` elements run in document order, but instead of JavaScript the
//! engine only understands one directive per line:
//!
//! ```text
//! //! result <status> <name> [| <message>]   per-assertion result
//! //! complete <status> [| <message>]         harness completion
//! //! throw <message>                         uncaught exception
//! //! call <global>                           call a global function
//! //! construct <global>                      `new` a global constructor
//! ```
//!
//! A line containing `__setupJSDOMReporter()` attaches the reporting bridge,
//! which is exactly what `/resources/testharnessreport.js` does. Assignments
//! of a literal to a global (`self.x = ...`, `window.x = ...`) define `x` as
//! a callable no-op, which covers the inline stubs the router serves. Blank
//! lines and comments are skipped. Anything else is an unsupported statement
//! and throws a `SyntaxError`.
//!
//! The harness libraries themselves (`testharness.js` and friends) are
//! fetched but not interpreted; the directives stand in for them. Like
//! testharness.js, an uncaught exception after the bridge attached completes
//! the page with harness status 1, and a page that attached the bridge and
//! never issued `complete` completes with status 0 once its scripts have run.

use std::collections::{HashSet, VecDeque};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use super::{DomEngine, LoadRequest, Window};
use crate::bridge::{AssertionResult, HarnessStatus, ReportingBridge};
use crate::error::LoadError;
use crate::fetch::ResourceLoader;

fn script_regex() -> &'static Regex {
    static SCRIPT: OnceLock<Regex> = OnceLock::new();
    SCRIPT.get_or_init(|| Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").unwrap())
}

fn global_definition_regex() -> &'static Regex {
    static GLOBAL: OnceLock<Regex> = OnceLock::new();
    GLOBAL.get_or_init(|| Regex::new(r"^(?:self|window|globalThis)\.([A-Za-z_$][\w$]*)\s*=\s*(.*)$").unwrap())
}

fn src_regex() -> &'static Regex {
    static SRC: OnceLock<Regex> = OnceLock::new();
    SRC.get_or_init(|| Regex::new(r#"(?i)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).unwrap())
}

/// Script URLs provided natively by the directives
const HARNESS_LIBRARIES: &[&str] = &[
    "/resources/testharness.js",
    "/resources/idlharness.js",
    "/resources/WebIDLParser.js",
    "/resources/testdriver.js",
    "/resources/testdriver-vendor.js",
    "/common/gc.js",
];

fn is_harness_library(src: &str) -> bool {
    Url::parse(src).is_ok_and(|url| HARNESS_LIBRARIES.contains(&url.path()))
}

/// Net `{` minus `}` on a line
fn brace_balance(text: &str) -> isize {
    text.chars().fold(0, |depth, c| match c {
        '{' => depth + 1,
        '}' => depth - 1,
        _ => depth,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Script {
    Inline(String),
    External(String),
}

/// Extract the document's scripts in order, resolving `src` against `base`
fn parse_scripts(html: &str, base: &Url) -> Result<VecDeque<Script>, LoadError> {
    let mut scripts = VecDeque::new();
    let mut matched = 0;
    for caps in script_regex().captures_iter(html) {
        matched += 1;
        let attributes = &caps[1];
        match src_regex().captures(attributes) {
            Some(src) => {
                let raw = src
                    .get(1)
                    .or_else(|| src.get(2))
                    .or_else(|| src.get(3))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                match base.join(raw) {
                    Ok(url) => scripts.push_back(Script::External(url.to_string())),
                    Err(err) => warn!(src = raw, error = %err, "skipping script with invalid src"),
                }
            }
            None => scripts.push_back(Script::Inline(caps[2].to_string())),
        }
    }

    let opened = html.to_ascii_lowercase().matches("<script").count();
    if opened != matched {
        return Err(LoadError::Malformed {
            url: base.to_string(),
            message: "unterminated <script> element".to_string(),
        });
    }
    Ok(scripts)
}

/// Split `<head> | <message>` into its parts
fn split_message(text: &str) -> (&str, Option<&str>) {
    match text.split_once('|') {
        Some((head, message)) => (head.trim(), Some(message.trim())),
        None => (text.trim(), None),
    }
}

/// The directive engine
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptedEngine;

impl ScriptedEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl DomEngine for ScriptedEngine {
    async fn load(&self, request: LoadRequest) -> Result<Box<dyn Window>, LoadError> {
        let body = request.loader.fetch(&request.url).await.map_err(|source| LoadError::Fetch {
            url: request.url.clone(),
            source,
        })?;
        let base = Url::parse(&request.url).map_err(|err| LoadError::Malformed {
            url: request.url.clone(),
            message: err.to_string(),
        })?;
        let html = String::from_utf8(body).map_err(|_| LoadError::Malformed {
            url: request.url.clone(),
            message: "document is not valid UTF-8".to_string(),
        })?;
        let scripts = parse_scripts(&html, &base)?;
        debug!(url = %request.url, scripts = scripts.len(), "document parsed");

        Ok(Box::new(ScriptedWindow {
            url: request.url,
            loader: request.loader,
            scripts,
            functions: HashSet::new(),
            constructors: HashSet::new(),
            bridge: None,
            open_literal: 0,
            closed: false,
        }))
    }
}

/// Outcome of running one line
enum Step {
    Continue,
    /// An exception aborted the current script
    Threw { message: String, stack: String },
}

/// Window of the directive engine
pub struct ScriptedWindow {
    url: String,
    loader: ResourceLoader,
    scripts: VecDeque<Script>,
    functions: HashSet<String>,
    constructors: HashSet<String>,
    bridge: Option<ReportingBridge>,
    /// Unclosed braces of a multi-line global definition
    open_literal: isize,
    closed: bool,
}

impl ScriptedWindow {
    fn teardown_requested(&self) -> bool {
        self.closed || self.bridge.as_ref().is_some_and(|b| b.teardown_requested())
    }

    fn reporter_attached(&self) -> bool {
        self.bridge.as_ref().is_some_and(|b| b.is_attached())
    }

    /// Run one script. An exception raised before the bridge attached is a
    /// load error; afterwards it completes the page with harness status 1.
    fn execute(&mut self, source: &str, origin: &str) -> Result<(), LoadError> {
        self.open_literal = 0;
        for (index, line) in source.lines().enumerate() {
            if self.teardown_requested() {
                return Ok(());
            }
            let location = format!("    at {}:{}", origin, index + 1);
            if let Step::Threw { message, stack } = self.step(line.trim(), location) {
                return match &self.bridge {
                    Some(bridge) if bridge.is_attached() => {
                        bridge.script_error(&message, &stack);
                        Ok(())
                    }
                    _ => Err(LoadError::Script { message, stack }),
                };
            }
        }
        Ok(())
    }

    fn step(&mut self, line: &str, location: String) -> Step {
        let throw = |message: String| Step::Threw {
            message,
            stack: location.clone(),
        };

        if line.contains("__setupJSDOMReporter()") {
            return match self.bridge.clone() {
                Some(bridge) => {
                    bridge.attach(self);
                    Step::Continue
                }
                None => throw("TypeError: window.__setupJSDOMReporter is not a function".to_string()),
            };
        }

        if self.open_literal > 0 {
            self.open_literal += brace_balance(line);
            return Step::Continue;
        }

        let Some(directive) = line.strip_prefix("//!") else {
            if line.is_empty() || line.starts_with("//") || line.starts_with("/*") || line.starts_with('*') {
                return Step::Continue;
            }
            if let Some(caps) = global_definition_regex().captures(line) {
                self.functions.insert(caps[1].to_string());
                self.open_literal = brace_balance(&caps[2]).max(0);
                return Step::Continue;
            }
            return throw("SyntaxError: unsupported statement".to_string());
        };
        let (command, rest) = directive.trim().split_once(' ').unwrap_or((directive.trim(), ""));
        match command {
            "result" => {
                let (head, message) = split_message(rest);
                let (status, name) = head.split_once(' ').unwrap_or((head, ""));
                let Ok(status) = status.parse::<i64>() else {
                    return throw(format!("SyntaxError: invalid status {:?}", status));
                };
                if let Some(bridge) = &self.bridge {
                    let mut result = AssertionResult::new(name.trim(), status).with_stack(location.trim());
                    if let Some(message) = message {
                        result = result.with_message(message);
                    }
                    bridge.add_result(result);
                }
                Step::Continue
            }
            "complete" => {
                let (head, message) = split_message(rest);
                let Ok(status) = head.parse::<i64>() else {
                    return throw(format!("SyntaxError: invalid status {:?}", head));
                };
                if let Some(bridge) = &self.bridge {
                    let mut harness = HarnessStatus::new(status);
                    if let Some(message) = message {
                        harness = harness.with_message(message);
                    }
                    bridge.complete(harness);
                }
                Step::Continue
            }
            "throw" => throw(rest.trim().to_string()),
            "call" if self.functions.contains(rest.trim()) => Step::Continue,
            "construct" if self.constructors.contains(rest.trim()) => Step::Continue,
            "call" | "construct" => throw(format!("ReferenceError: {} is not defined", rest.trim())),
            other => throw(format!("SyntaxError: unknown directive {:?}", other)),
        }
    }
}

#[async_trait(?Send)]
impl Window for ScriptedWindow {
    fn url(&self) -> &str {
        &self.url
    }

    fn define_inert_constructor(&mut self, name: &str) {
        self.constructors.insert(name.to_string());
    }

    fn define_noop_function(&mut self, name: &str) {
        self.functions.insert(name.to_string());
    }

    fn install_reporter(&mut self, bridge: ReportingBridge) {
        self.bridge = Some(bridge);
    }

    async fn settle(&mut self) -> Result<(), LoadError> {
        while let Some(script) = self.scripts.pop_front() {
            if self.teardown_requested() {
                break;
            }
            let (source, origin) = match script {
                Script::Inline(source) => (source, self.url.clone()),
                Script::External(src) => match self.loader.fetch(&src).await {
                    Ok(_) if is_harness_library(&src) => {
                        debug!(src = %src, "harness library provided by directives");
                        continue;
                    }
                    Ok(body) => (String::from_utf8_lossy(&body).into_owned(), src),
                    Err(err) => {
                        // A failed script load fires an error event; it does not abort the page.
                        warn!(src = %src, error = %err, "script failed to load");
                        continue;
                    }
                },
            };
            self.execute(&source, &origin)?;
        }

        if self.reporter_attached() && !self.teardown_requested() {
            if let Some(bridge) = &self.bridge {
                bridge.complete(HarnessStatus::new(0));
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            debug!(url = %self.url, "window closed");
        }
        self.closed = true;
        self.scripts.clear();
        self.bridge = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_scripts_in_order() {
        let base = Url::parse("http://127.0.0.1:1/dir/page.html").unwrap();
        let html = "<script src=\"/resources/testharness.js\"></script>\n<SCRIPT>//! call x</SCRIPT>\n<script src='rel.js' defer></script>";
        let scripts = parse_scripts(html, &base).unwrap();
        assert_eq!(
            scripts,
            VecDeque::from(vec![
                Script::External("http://127.0.0.1:1/resources/testharness.js".to_string()),
                Script::Inline("//! call x".to_string()),
                Script::External("http://127.0.0.1:1/dir/rel.js".to_string()),
            ])
        );
    }

    #[test]
    fn test_unterminated_script_is_malformed() {
        let base = Url::parse("http://127.0.0.1:1/page.html").unwrap();
        let err = parse_scripts("<script>//! throw x", &base).unwrap_err();
        assert!(matches!(err, LoadError::Malformed { .. }));
    }

    #[test]
    fn test_brace_balance() {
        assert_eq!(brace_balance("self.GLOBAL = {"), 1);
        assert_eq!(brace_balance("window.worker_test = () => {};"), 0);
        assert_eq!(brace_balance("};"), -1);
    }

    #[test]
    fn test_harness_libraries_recognized() {
        assert!(is_harness_library("http://127.0.0.1:1/resources/testharness.js"));
        assert!(is_harness_library("http://127.0.0.1:1/common/gc.js?x=1"));
        assert!(!is_harness_library("http://127.0.0.1:1/resources/testharnessreport.js"));
        assert!(!is_harness_library("http://127.0.0.1:1/dom/foo.any.js"));
    }

    #[test]
    fn test_split_message() {
        assert_eq!(split_message("1 name | boom"), ("1 name", Some("boom")));
        assert_eq!(split_message("0"), ("0", None));
    }
}
