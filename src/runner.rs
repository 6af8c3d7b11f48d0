//! Run orchestration
//!
//! Serves a corpus, discovers its test paths, and drives them one at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{normalize_root_url, RunOptions};
use crate::driver::TestDriver;
use crate::engine::DomEngine;
use crate::error::{Error, Result};
use crate::fetch::ResourceLoader;
use crate::router::Router;
use crate::server::SocketServer;
use crate::source_file::discover_test_paths;

/// Enumerate the corpus off the control thread
pub async fn discover(tests_path: &Path) -> Result<Vec<String>> {
    let root = tests_path.to_path_buf();
    tokio::task::spawn_blocking(move || discover_test_paths(&root))
        .await
        .map_err(|err| Error::discovery(tests_path, err))?
}

/// Run every accepted test under `tests_path` and return how many did not
/// pass.
///
/// Fails only if the socket transport cannot start or the corpus cannot be
/// walked; per-test failures are counted and reported.
pub async fn run(tests_path: impl Into<PathBuf>, engine: &dyn DomEngine, options: RunOptions) -> Result<usize> {
    let tests_path = tests_path.into();
    let root_url = normalize_root_url(&options.root_url);

    let server = SocketServer::bind().await?;
    let origin = server.origin();
    let router = Arc::new(Router::new(&origin, &tests_path, &root_url, options.assets.clone()));
    let _listener = server.serve(Arc::clone(&router));
    let base_url = format!("{}{}", origin, root_url);
    info!(corpus = %tests_path.display(), %base_url, "serving test corpus");

    let test_paths = discover(&tests_path).await?;
    info!(count = test_paths.len(), "discovered tests");

    let driver = TestDriver::new(engine, ResourceLoader::new(router), options.reporter.clone())
        .with_setup(options.setup.clone());

    let mut failures = 0;
    for test_path in &test_paths {
        let url = format!("{}{}", base_url, test_path);
        if !options.filter.accept(test_path, &url).await {
            debug!(test_path = %test_path, "filtered out");
            continue;
        }

        options.reporter.start_suite(test_path);
        if !driver.run_test(&url).await {
            failures += 1;
        }
    }

    info!(tests = test_paths.len(), failures, "run complete");
    Ok(failures)
}
