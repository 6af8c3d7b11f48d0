//! wpt-harness CLI
//!
//! Lists, serves, and runs a web-platform-tests corpus with the built-in
//! directive engine.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wpt_harness::runner::discover;
use wpt_harness::server::SocketServer;
use wpt_harness::{
    normalize_root_url, run, ConsoleReporter, HarnessAssets, ResourceLoader, Router, RunnerConfig, ScriptedEngine,
    SummaryReporter, VERSION,
};

/// Origin used when resolving URLs without a listener
const OFFLINE_ORIGIN: &str = "http://127.0.0.1:8000";

#[derive(Parser)]
#[command(name = "wpt-harness")]
#[command(author, version, about = "Run web-platform-tests against an embeddable DOM engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding testharness.js and the other bundled scripts
    #[arg(long, global = true, value_name = "DIR")]
    harness_dir: Option<PathBuf>,

    /// URL path the corpus is served under
    #[arg(long, global = true, value_name = "PATH")]
    root_url: Option<String>,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List the runnable test paths of a corpus
    List {
        /// Corpus directory
        corpus: PathBuf,
    },

    /// Resolve one URL path the way a test page would and print the body
    Route {
        /// Corpus directory
        corpus: PathBuf,
        /// URL path, e.g. /dom/foo.any.html
        path: String,
    },

    /// Serve a corpus over HTTP until interrupted
    Serve {
        /// Corpus directory
        corpus: PathBuf,
    },

    /// Run every test of a corpus
    Run {
        /// Corpus directory
        corpus: PathBuf,
        /// Only run tests whose path contains one of these
        #[arg(short, long)]
        include: Vec<String>,
        /// Skip tests whose path contains one of these
        #[arg(short, long)]
        exclude: Vec<String>,
        /// Print a JSON summary instead of the console report
        #[arg(long)]
        json: bool,
    },
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Config file merged with command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<RunnerConfig> {
    let mut config = match &cli.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };
    if let Some(dir) = &cli.harness_dir {
        config.harness_dir = dir.clone();
    }
    if let Some(root_url) = &cli.root_url {
        config.root_url = root_url.clone();
    }
    Ok(config)
}

fn check_corpus(corpus: &Path) -> anyhow::Result<()> {
    if !corpus.is_dir() {
        bail!("corpus directory not found: {}", corpus.display());
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    info!(version = VERSION, "wpt-harness starting");

    match dispatch(&cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(cli)?;
    match &cli.command {
        Commands::List { corpus } => list_tests(corpus).await,
        Commands::Route { corpus, path } => route_path(corpus, path, &config).await,
        Commands::Serve { corpus } => serve_corpus(corpus, &config).await,
        Commands::Run {
            corpus,
            include,
            exclude,
            json,
        } => {
            let mut config = config;
            config.include.extend(include.iter().cloned());
            config.exclude.extend(exclude.iter().cloned());
            run_corpus(corpus, &config, *json).await
        }
    }
}

async fn list_tests(corpus: &Path) -> anyhow::Result<ExitCode> {
    check_corpus(corpus)?;
    for test_path in discover(corpus).await? {
        println!("{}", test_path);
    }
    Ok(ExitCode::SUCCESS)
}

async fn route_path(corpus: &Path, path: &str, config: &RunnerConfig) -> anyhow::Result<ExitCode> {
    check_corpus(corpus)?;
    let root_url = normalize_root_url(&config.root_url);
    let router = Router::new(
        OFFLINE_ORIGIN,
        corpus,
        root_url,
        HarnessAssets::from_dir(&config.harness_dir),
    );
    let loader = ResourceLoader::new(Arc::new(router));
    let url = format!("{}/{}", OFFLINE_ORIGIN, path.trim_start_matches('/'));
    match loader.fetch(&url).await {
        Ok(body) => {
            print!("{}", String::from_utf8_lossy(&body));
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}", err);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn serve_corpus(corpus: &Path, config: &RunnerConfig) -> anyhow::Result<ExitCode> {
    check_corpus(corpus)?;
    let root_url = normalize_root_url(&config.root_url);
    let server = SocketServer::bind().await?;
    let origin = server.origin();
    let router = Router::new(&origin, corpus, &root_url, HarnessAssets::from_dir(&config.harness_dir));
    let handle = server.serve(Arc::new(router));
    println!("Serving {} at {}{}", corpus.display(), origin, root_url);

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to listen for Ctrl-C")?,
        _ = handle.wait() => {}
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_corpus(corpus: &Path, config: &RunnerConfig, json: bool) -> anyhow::Result<ExitCode> {
    check_corpus(corpus)?;
    let engine = ScriptedEngine::new();
    let options = config.to_options();

    let summary = Rc::new(if json {
        SummaryReporter::new()
    } else {
        SummaryReporter::forwarding_to(ConsoleReporter)
    });
    let failures = run(corpus, &engine, options.reporter(summary.clone())).await?;

    let summary = summary.summary();
    if json {
        println!("{}", serde_json::to_string_pretty(&summary.to_json())?);
    } else {
        println!("\n{} failing", failures);
        for name in summary.failing_suites() {
            println!("  {}", name);
        }
    }

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
