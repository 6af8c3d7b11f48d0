//! Synthetic harness documents for `.window.html` and `.any.html` URLs
//!
//! A request for `foo.window.html` is answered with a small HTML page that
//! loads the harness and then `foo.window.js`. The `// META:` block of the
//! script contributes a title, a long-timeout marker, and extra scripts.

use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use crate::source_file::parse_meta;

/// Kind of synthesized document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentHandler {
    /// `*.window.html` -> `*.window.js`
    Window,
    /// `*.any.html` -> `*.any.js`, window scope
    AnyHtml,
}

impl DocumentHandler {
    /// URL path suffix this handler answers
    pub fn suffix(&self) -> &'static str {
        match self {
            DocumentHandler::Window => ".window.html",
            DocumentHandler::AnyHtml => ".any.html",
        }
    }

    /// Suffix of the script the document wraps
    fn script_suffix(&self) -> &'static str {
        match self {
            DocumentHandler::Window => ".window.js",
            DocumentHandler::AnyHtml => ".any.js",
        }
    }

    /// URL path of the wrapped script
    pub fn script_pathname(&self, pathname: &str) -> String {
        let base = pathname.strip_suffix(self.suffix()).unwrap_or(pathname);
        format!("{}{}", base, self.script_suffix())
    }

    /// Render the document for `url` given the wrapped script's source
    pub fn render(&self, url: &Url, script_source: &str) -> String {
        let mut script_src = self.script_pathname(url.path());
        if let Some(query) = url.query() {
            script_src.push('?');
            script_src.push_str(query);
        }

        let mut meta = String::new();
        let mut scripts = String::new();
        for entry in parse_meta(script_source) {
            match entry.key.as_str() {
                "title" => {
                    meta.push_str(&format!("<title>{}</title>\n", escape_html(&entry.value)));
                }
                "timeout" if entry.value == "long" => {
                    meta.push_str("<meta name=\"timeout\" content=\"long\">\n");
                }
                "script" => {
                    scripts.push_str(&format!(
                        "<script src=\"{}\"></script>\n",
                        escape_attribute(&entry.value)
                    ));
                }
                _ => {}
            }
        }

        let global = match self {
            DocumentHandler::Window => "",
            DocumentHandler::AnyHtml => ANY_GLOBAL_SCRIPT,
        };

        format!(
            "<!doctype html>\n<meta charset=utf-8>\n{meta}{global}<script src=\"/resources/testharness.js\"></script>\n<script src=\"/resources/testharnessreport.js\"></script>\n{scripts}<div id=log></div>\n<script src=\"{src}\"></script>\n",
            meta = meta,
            global = global,
            scripts = scripts,
            src = escape_attribute(&script_src),
        )
    }
}

const ANY_GLOBAL_SCRIPT: &str = "<script>\nself.GLOBAL = {\n  isWindow: function() { return true; },\n  isWorker: function() { return false; },\n  isShadowRealm: function() { return false; },\n};\n</script>\n";

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attribute(text: &str) -> String {
    escape_html(text).replace('"', "&quot;")
}

/// Map a URL path under `tests_url` to a file under `tests_path`.
///
/// Returns `None` when the path is outside the prefix or would escape the
/// corpus root.
pub fn filesystem_path(tests_path: &Path, pathname: &str, tests_url: &str) -> Option<PathBuf> {
    let relative = pathname.strip_prefix(tests_url)?;
    let decoded = percent_decode_str(relative).decode_utf8().ok()?;

    let mut path = tests_path.to_path_buf();
    for component in Path::new(decoded.as_ref()).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(path)
}
