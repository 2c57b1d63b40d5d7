// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printrelay: network relay for raw print data.
//
// Entry point. Parses the command line, initialises logging and runs one
// command: serve, printers, test or config.

mod cli;
mod logging;
mod services;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use printrelay_core::error::{SinkError, StartError, StopError};
use printrelay_core::human_errors::{
    HumanError, describe_connection_error, describe_sink_error, describe_start_error,
    describe_stop_error,
};
use printrelay_core::types::{EventKind, JobOutcome};
use printrelay_server::{ClientError, EventStream, RelayServer, check_connection, local_ipv4, send_raw};
use printrelay_sink::{DirectorySink, PrintSink, platform_catalog, platform_sink};

use cli::{Cli, Commands, ConfigCommands, ServeArgs, TestArgs};
use services::config_store::{ConfigStore, ConfigStoreError};

#[derive(Debug, Error)]
enum CommandError {
    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Stop(#[from] StopError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Settings(#[from] ConfigStoreError),

    #[error("read {}: {source}", path.display())]
    ReadJob {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("listen for Ctrl+C: {0}")]
    Signal(std::io::Error),
}

impl CommandError {
    fn human(&self) -> Option<HumanError> {
        match self {
            Self::Start(e) => Some(describe_start_error(e)),
            Self::Stop(e) => Some(describe_stop_error(e)),
            Self::Sink(e) => Some(describe_sink_error(e)),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_dir = match &cli.command {
        Commands::Serve(args) => args.log_dir.clone(),
        _ => None,
    };
    if let Err(e) = logging::init(log_dir.as_deref()) {
        eprintln!("error: could not set up logging: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Serve(args) => serve(args, cli.config).await,
        Commands::Printers => printers(cli.config).await,
        Commands::Test(args) => test(args, cli.config).await,
        Commands::Config { action } => match action {
            ConfigCommands::Show => config_show(cli.config),
            ConfigCommands::Set {
                printer,
                port,
                auto_start,
                minimize_to_tray,
            } => config_set(cli.config, printer, port, auto_start, minimize_to_tray),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            match e.human() {
                Some(human) => {
                    eprintln!("error: {}", human.message);
                    eprintln!("hint: {}", human.suggestion);
                }
                None => eprintln!("error: {e}"),
            }
            ExitCode::FAILURE
        }
    }
}

// -- serve --------------------------------------------------------------------

async fn serve(args: ServeArgs, config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let mut store = ConfigStore::discover(config_path);
    let mut config = store.load();
    if let Some(printer) = args.printer {
        config.printer_name = printer;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate().map_err(StartError::InvalidConfig)?;

    let sink: Arc<dyn PrintSink> = match &args.spool_dir {
        Some(root) => {
            let sink = DirectorySink::new(root);
            let dir = sink.ensure_printer(&config.printer_name)?;
            info!(path = %dir.display(), "spooling jobs to directory");
            Arc::new(sink)
        }
        None => platform_sink(),
    };

    let server = RelayServer::new(sink);
    let feed = tokio::spawn(log_events(server.subscribe()));

    server.start(config.clone()).await?;
    let port = server.local_addr().map_or(config.port, |addr| addr.port());
    println!(
        "printrelay listening on {}:{port}, forwarding to \"{}\"",
        local_ipv4(),
        config.printer_name
    );
    println!("Press Ctrl+C to stop.");

    let signal = tokio::signal::ctrl_c().await;
    info!("shutting down");
    let stopped = server.stop().await;
    feed.abort();

    signal.map_err(CommandError::Signal)?;
    stopped?;
    Ok(())
}

/// Mirror the event feed into the log.
async fn log_events(mut events: EventStream) {
    while let Some(event) = events.next().await {
        match &event.kind {
            EventKind::StateChange(change) => match &change.reason {
                Some(reason) => warn!(from = %change.from, to = %change.to, reason = %reason, "relay state"),
                None => info!(from = %change.from, to = %change.to, "relay state"),
            },
            EventKind::JobOutcome(job) => {
                if let JobOutcome::Failed(e) = &job.outcome {
                    let human = describe_connection_error(e);
                    warn!(job = %job.id, peer = %job.peer, "{} {}", human.message, human.suggestion);
                }
            }
        }
        match serde_json::to_string(&event) {
            Ok(json) => debug!(event = %json, "relay event"),
            Err(e) => debug!(error = %e, "event not serializable"),
        }
    }
}

// -- printers -----------------------------------------------------------------

async fn printers(config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let configured = ConfigStore::discover(config_path).load().printer_name;
    let names = tokio::task::spawn_blocking(|| platform_catalog().list_printers())
        .await
        .map_err(|e| SinkError::DeliveryFailed(e.to_string()))??;

    if names.is_empty() {
        println!("No printers found.");
    }
    for name in names {
        let marker = if name == configured { "*" } else { " " };
        println!("{marker} {name}");
    }
    Ok(())
}

// -- test ---------------------------------------------------------------------

async fn test(args: TestArgs, config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let port = match args.port {
        Some(port) => port,
        None => ConfigStore::discover(config_path).load().port,
    };

    let payload = match (args.text, args.file) {
        (Some(text), _) => Some(text.into_bytes()),
        (None, Some(path)) => Some(
            tokio::fs::read(path.clone())
                .await
                .map_err(|source| CommandError::ReadJob { path, source })?,
        ),
        (None, None) => None,
    };

    match payload {
        Some(data) => {
            send_raw(&args.host, port, &data).await?;
            println!("Sent {} bytes to {}:{port}.", data.len(), args.host);
        }
        None => {
            check_connection(&args.host, port).await?;
            println!("Connected to {}:{port}; connection test only, no data sent.", args.host);
        }
    }
    Ok(())
}

// -- config -------------------------------------------------------------------

fn config_show(config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let mut store = ConfigStore::discover(config_path);
    let config = store.load();
    match store.loaded_from() {
        Some(path) => eprintln!("# from {}", path.display()),
        None => eprintln!("# defaults (no settings file found)"),
    }
    let json = serde_json::to_string_pretty(&config).map_err(ConfigStoreError::from)?;
    println!("{json}");
    Ok(())
}

fn config_set(
    config_path: Option<PathBuf>,
    printer: Option<String>,
    port: Option<u16>,
    auto_start: Option<bool>,
    minimize_to_tray: Option<bool>,
) -> Result<(), CommandError> {
    let mut store = ConfigStore::discover(config_path);
    let mut config = store.load();
    if let Some(printer) = printer {
        config.printer_name = printer;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(auto_start) = auto_start {
        config.auto_start = auto_start;
    }
    if let Some(minimize_to_tray) = minimize_to_tray {
        config.minimize_to_tray = minimize_to_tray;
    }

    let path = store.save(&config)?;
    println!("Settings saved to {}.", path.display());
    Ok(())
}
