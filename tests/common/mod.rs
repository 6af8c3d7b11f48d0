//! Shared test helpers for integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use wpt_harness::{HarnessAssets, ResourceLoader, Router, SummaryReporter};

/// Origin used for routers that are not behind a listener
pub const HOST: &str = "http://127.0.0.1:8000";

/// Stand-in for testharness.js; plain comments, so the directive engine skips it
pub const TESTHARNESS_JS: &str = "// testharness.js\n// (test double)\n";

/// A temporary corpus next to a temporary harness directory
pub struct Corpus {
    dir: TempDir,
}

impl Corpus {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tests")).unwrap();
        let harness = dir.path().join("harness");
        std::fs::create_dir_all(harness.join("webidl2/lib")).unwrap();
        std::fs::write(harness.join("testharness.js"), TESTHARNESS_JS).unwrap();
        std::fs::write(harness.join("idlharness.js"), "// idlharness.js\n").unwrap();
        std::fs::write(harness.join("webidl2/lib/webidl2.js"), "// webidl2.js\n").unwrap();
        std::fs::write(harness.join("gc.js"), "// gc.js\n").unwrap();
        std::fs::write(harness.join("testdriver-dummy.js"), "// testdriver\n").unwrap();
        Self { dir }
    }

    /// Write a corpus file, creating parent directories
    pub fn write(&self, relative: &str, contents: &str) -> &Self {
        let path = self.tests_path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
        self
    }

    /// Write raw corpus bytes
    pub fn write_bytes(&self, relative: &str, contents: &[u8]) -> &Self {
        let path = self.tests_path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
        self
    }

    pub fn tests_path(&self) -> PathBuf {
        self.dir.path().join("tests")
    }

    pub fn harness_dir(&self) -> PathBuf {
        self.dir.path().join("harness")
    }

    pub fn assets(&self) -> HarnessAssets {
        HarnessAssets::from_dir(self.harness_dir())
    }

    pub fn router(&self, host: &str, tests_url: &str) -> Router {
        Router::new(host, self.tests_path(), tests_url, self.assets())
    }

    pub fn loader(&self) -> ResourceLoader {
        ResourceLoader::new(Arc::new(self.router(HOST, "/")))
    }
}

pub fn summary_reporter() -> Rc<SummaryReporter> {
    Rc::new(SummaryReporter::new())
}

/// Issue a GET over a real socket and return `(status, body)`
pub async fn http_get(origin: &str, target: &str) -> (u16, Vec<u8>) {
    let addr = origin.trim_start_matches("http://");
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", target, addr);
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let split = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has a head");
    let head = String::from_utf8_lossy(&response[..split]).into_owned();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status line");
    (status, response[split + 4..].to_vec())
}

pub fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap()
}
