//! Dry-run planner for fludrive gesture commands.
//!
//! Parses an execute script the way the driver would and prints, one JSON line
//! each, the element commands it would send to the app. Nothing is sent.
//!
//! # Usage
//!
//! ```bash
//! # Build a locator for a widget
//! fludrive finder text "Item 42"
//! fludrive finder value-key item-list
//!
//! # Plan a single drag
//! fludrive plan flutter:scroll '["<list>", {"dx": 0, "dy": -300, "durationMilliseconds": 200}]'
//!
//! # Plan a search, pretending the item appears after three scrolls
//! fludrive plan flutter:scrollUntilVisible \
//!     '["<list>", {"item": "<item>", "dyScroll": -300, "waitTimeout": 5000}]' --visible-after 3
//!
//! # Show the resolved configuration
//! fludrive config
//! ```

mod planner;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use fludrive_core::commands::{run_command, FlutterCommand};
use fludrive_core::config::DriverConfig;
use fludrive_core::element::Finder;
use fludrive_core::scroll_until::ScrollEngine;

use planner::{PlannedWaiter, RecordingTransport};

#[derive(Parser)]
#[command(name = "fludrive")]
#[command(about = "Plan Flutter gesture commands without a device")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.fludrive/config.json)
    #[arg(short, long, env = "FLUDRIVE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the element commands an execute script would send
    Plan {
        /// Script name, e.g. flutter:scrollUntilVisible
        script: String,
        /// Script arguments as a JSON array: [locator, {options}]
        args: String,
        /// Pretend the awaited element appears after this many scrolls
        #[arg(long, default_value_t = 1)]
        visible_after: usize,
        /// Pretend the awaited element never appears
        #[arg(long, conflicts_with = "visible_after")]
        never_visible: bool,
    },

    /// Print the locator for a widget finder
    Finder {
        kind: FinderKind,
        value: String,
    },

    /// Print the resolved configuration as JSON
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum FinderKind {
    ValueKey,
    Text,
    Type,
    Tooltip,
    Semantics,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match DriverConfig::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: cannot read config {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => DriverConfig::load(),
    };

    match cli.command {
        Command::Plan {
            script,
            args,
            visible_after,
            never_visible,
        } => {
            let after = (!never_visible).then_some(visible_after);
            plan(&config, &script, &args, after).await
        }
        Command::Finder { kind, value } => {
            let finder = match kind {
                FinderKind::ValueKey => Finder::by_value_key(value),
                FinderKind::Text => Finder::by_text(value),
                FinderKind::Type => Finder::by_type(value),
                FinderKind::Tooltip => Finder::by_tooltip(value),
                FinderKind::Semantics => Finder::by_semantics_label(value, false),
            };
            println!("{}", finder.to_locator().as_str());
            ExitCode::SUCCESS
        }
        Command::Config => match serde_json::to_string_pretty(&config) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn plan(config: &DriverConfig, script: &str, args: &str, visible_after: Option<usize>) -> ExitCode {
    let args: Vec<Value> = match serde_json::from_str(args) {
        Ok(Value::Array(args)) => args,
        Ok(other) => vec![other],
        Err(e) => {
            eprintln!("Error: arguments are not valid JSON: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let command = match FlutterCommand::parse(script, &args, config) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    debug!(command = command.name(), "planning");

    let transport = RecordingTransport::new();
    let waiter = Arc::new(PlannedWaiter::new(visible_after, transport.scroll_count()));
    let engine = ScrollEngine::new(&transport, waiter, config);

    match run_command(&engine, command).await {
        Ok(result) => {
            println!("{}", serde_json::json!({ "result": result }));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
