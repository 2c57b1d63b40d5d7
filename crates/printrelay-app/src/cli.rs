// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "printrelay", version, about = "Relay raw TCP print jobs to a local printer")]
pub(crate) struct Cli {
    /// Settings file to use before the standard locations
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the relay until Ctrl+C
    Serve(ServeArgs),

    /// List installed printers
    Printers,

    /// Send a test job to a running relay
    Test(TestArgs),

    /// Inspect or change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Printer to forward jobs to (overrides the settings file)
    #[arg(long)]
    pub printer: Option<String>,

    /// Port to listen on (overrides the settings file)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Write jobs as files under this directory instead of printing them
    #[arg(long)]
    pub spool_dir: Option<PathBuf>,

    /// Also write daily-rotated log files here
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Args)]
pub(crate) struct TestArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Defaults to the configured port
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Text to send as the job
    #[arg(long, conflicts_with = "file")]
    pub text: Option<String>,

    /// File whose bytes are sent as the job
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub(crate) enum ConfigCommands {
    /// Print the effective settings as JSON
    Show,

    /// Change stored settings
    Set {
        #[arg(long)]
        printer: Option<String>,

        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        port: Option<u16>,

        #[arg(long)]
        auto_start: Option<bool>,

        #[arg(long)]
        minimize_to_tray: Option<bool>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_overrides_parse() {
        let cli = Cli::parse_from(["printrelay", "serve", "--printer", "Office", "--port", "9200"]);
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.printer.as_deref(), Some("Office"));
        assert_eq!(args.port, Some(9200));
    }

    #[test]
    fn port_zero_is_refused() {
        assert!(Cli::try_parse_from(["printrelay", "serve", "--port", "0"]).is_err());
    }

    #[test]
    fn text_and_file_are_exclusive() {
        let parsed = Cli::try_parse_from(["printrelay", "test", "--text", "hi", "--file", "job.prn"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn config_set_takes_booleans() {
        let cli = Cli::parse_from(["printrelay", "config", "set", "--auto-start", "true"]);
        let Commands::Config {
            action: ConfigCommands::Set { auto_start, .. },
        } = cli.command
        else {
            panic!("expected config set");
        };
        assert_eq!(auto_start, Some(true));
    }
}
