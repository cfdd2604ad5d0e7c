//! graph-loader: run one viewport fetch or one timeline stream against the
//! configured backend and print what was loaded.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI args
//!   3. Load config
//!   4. Resolve effective log level (CLI `-v` flags > env > config)
//!   5. Init logger once
//!   6. Build backend + session
//!   7. Spawn Ctrl-C → stop watcher
//!   8. Run the requested command and print a summary

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use graph_loader::config;
use graph_loader::error::AppError;
use graph_loader::graph::{GraphEdge, GraphNode, GraphSnapshot, ViewportBounds};
use graph_loader::logger;
use graph_loader::timeline::{StreamOutcome, TimelineConsumer};
use graph_loader::viewport::{FetchOutcome, SkipReason};
use graph_loader::{GraphBackend, GraphSession};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    let backend = GraphBackend::from_config(&config.backend, config.api_key.clone())?;

    info!(
        backend = backend.name(),
        api_base_url = %config.backend.api_base_url,
        tags = ?config.container_tags,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let session = Arc::new(GraphSession::new(backend, &config));

    let watcher = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, stopping");
            watcher.viewport().cancel();
            watcher.timeline().stop();
        }
    });

    match args.command {
        Command::Viewport(bounds) => run_viewport(&session, bounds).await,
        Command::Timeline => run_timeline(&session).await,
    }
}

async fn run_viewport(session: &GraphSession, bounds: Option<ViewportBounds>) -> Result<(), AppError> {
    let outcome = match bounds {
        Some(bounds) => session.fetch_viewport(bounds).await,
        None => session.fetch_initial_viewport().await,
    };

    match outcome {
        FetchOutcome::Loaded { .. } => {
            let graph = session.graph();
            let area = session.viewport().current_viewport();
            println!(
                "✓ viewport loaded: {} documents, {} nodes, {} edges",
                session.total_loaded(),
                graph.nodes.len(),
                graph.edges.len()
            );
            if let Some(v) = area {
                println!("  area: x [{}, {}] y [{}, {}]", v.min_x, v.max_x, v.min_y, v.max_y);
            }
            Ok(())
        }
        FetchOutcome::Skipped(SkipReason::InvalidBounds) => match bounds {
            Some(bounds) => Err(AppError::InvalidBounds(bounds)),
            None => Err(AppError::Config("viewport.initial_size produced non-finite bounds".into())),
        },
        FetchOutcome::Skipped(reason) => {
            warn!(?reason, "viewport fetch skipped");
            Ok(())
        }
        FetchOutcome::Cancelled => {
            println!("viewport fetch cancelled");
            Ok(())
        }
        FetchOutcome::Failed(e) => Err(e.into()),
    }
}

/// Accumulates delivered batches into one overview graph.
#[derive(Default)]
struct Overview {
    graph: Mutex<GraphSnapshot>,
}

impl TimelineConsumer for Overview {
    fn on_batch(&self, nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) {
        let mut graph = self.graph.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (new_nodes, new_edges) = graph.absorb(nodes, edges);
        info!(
            new_nodes,
            new_edges,
            documents = graph.document_count(),
            "batch received"
        );
    }

    fn on_complete(&self, total_documents: u64, total_edges: u64) {
        info!(total_documents, total_edges, "timeline complete");
    }
}

async fn run_timeline(session: &GraphSession) -> Result<(), AppError> {
    let overview = Overview::default();
    let outcome = session.start_timeline(&overview).await;
    session.stop_timeline();

    let graph = overview.graph.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let summary = format!(
        "{} documents, {} nodes, {} edges",
        graph.document_count(),
        graph.nodes.len(),
        graph.edges.len()
    );

    match outcome {
        StreamOutcome::Completed { total_documents, total_edges } => {
            println!("✓ timeline complete: {summary} (server totals: {total_documents} documents, {total_edges} edges)");
            Ok(())
        }
        StreamOutcome::Ended => {
            println!("timeline ended without completion: {summary}");
            Ok(())
        }
        StreamOutcome::Aborted => {
            println!("timeline stopped: {summary}");
            Ok(())
        }
        StreamOutcome::Failed(e) => Err(e.into()),
    }
}

enum Command {
    Viewport(Option<ViewportBounds>),
    Timeline,
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
    command: Command,
}

fn print_usage() {
    println!("Usage: graph-loader [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  viewport [MIN_X MAX_X MIN_Y MAX_Y]  Fetch one viewport (default: initial centred area)");
    println!("  timeline                            Stream the whole filtered corpus");
    println!();
    println!("Options:");
    println!("  -h, --help                 Print help");
    println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
    println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
}

fn usage_error(msg: &str) -> ! {
    eprintln!("error: {msg}");
    eprintln!("run with --help for usage");
    std::process::exit(1);
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;
    let mut positional: Vec<String> = Vec::new();

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            positional.extend(iter.by_ref());
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "-f" | "--config" => match iter.next() {
                Some(path) => config_path = Some(path),
                None => usage_error("-f/--config requires a path argument"),
            },
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            // negative coordinates are positional
            a if a.starts_with('-') && a.parse::<f64>().is_err() => {
                usage_error(&format!("unknown option '{a}'"));
            }
            other => positional.push(other.to_string()),
        }
    }

    let command = match positional.first().map(String::as_str) {
        Some("viewport") => Command::Viewport(parse_bounds(&positional[1..])),
        Some("timeline") if positional.len() == 1 => Command::Timeline,
        Some("timeline") => usage_error("timeline takes no arguments"),
        Some(other) => usage_error(&format!("unknown command '{other}'")),
        None => usage_error("missing command"),
    };

    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path, command }
}

fn parse_bounds(args: &[String]) -> Option<ViewportBounds> {
    match args {
        [] => None,
        [min_x, max_x, min_y, max_y] => {
            let parse = |s: &String| {
                s.parse::<f64>()
                    .unwrap_or_else(|_| usage_error(&format!("'{s}' is not a number")))
            };
            Some(ViewportBounds::new(parse(min_x), parse(max_x), parse(min_y), parse(max_y)))
        }
        _ => usage_error("viewport takes either no bounds or exactly four: MIN_X MAX_X MIN_Y MAX_Y"),
    }
}
