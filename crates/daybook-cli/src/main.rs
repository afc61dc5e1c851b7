mod calendar;
mod cli;
mod config;
mod storage;
mod tasks;
mod tui;

use crate::cli::ConfigCommand;
use clap::Parser;
use color_eyre::Result;
use daybook_core::{clock::SystemClock, events::TaskEvent, storage::KvStore};
use daybook_storage::JsonFileStore;
use daybook_task::Planner;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Entry point wiring the CLI to the planner and the TUI.
fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command.unwrap_or(cli::Command::Tui) {
        cli::Command::Tui => {
            let mut planner = open_planner(storage::store_from_config(&config)?);
            tui::launch(&mut planner)?
        }
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check(&config)?,
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
        cli::Command::Task(cmd) => tasks::handle(cmd, &config)?,
        cli::Command::Calendar(args) => calendar::handle(args, &config)?,
        cli::Command::Stats => tasks::stats(&config)?,
        cli::Command::Export { output } => tasks::export(output.as_deref(), &config)?,
        cli::Command::Import { path } => tasks::import(&path, &config)?,
        cli::Command::Restore => tasks::restore(&config)?,
        cli::Command::Theme => tasks::toggle_theme(&config)?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters; stay quiet by default so command output is clean.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("daybook {}", env!("CARGO_PKG_VERSION"));
}

/// Open the planner on `store` and report storage trouble on stderr.
pub(crate) fn open_planner(store: JsonFileStore) -> Planner<JsonFileStore> {
    let mut planner = Planner::open(store, SystemClock);
    if let Some(reason) = planner.storage_error() {
        warn!(%reason, "storage unavailable");
        eprintln!("warning: could not read saved data ({reason}); changes will not be saved");
    }
    planner.subscribe(|event| {
        if let TaskEvent::StorageFailed { reason } = event {
            eprintln!("warning: saving failed ({reason}); changes are kept in memory only");
        }
    });
    planner
}

/// Writes, reads back and removes a probe record in the data directory.
fn run_health_check(config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(config)?;
    run_store_health(&store)?;
    println!("Storage: ok ({})", store.root().display());
    Ok(())
}

fn run_store_health<S: KvStore>(store: &S) -> Result<()> {
    let probe_key = "health/probe";
    let payload = b"\"ok\"";
    store
        .put(probe_key, payload)
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    let round_trip = store
        .get(probe_key)
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    store
        .delete(probe_key)
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;

    if round_trip != payload {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
