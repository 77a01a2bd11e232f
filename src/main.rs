//! agentbus CLI: settings validation and credential inspection
//!
//! The bus layer itself is a library wired into the wider agent; this binary
//! validates operator-supplied settings and reports how credentials resolve
//! without touching the network.

use agentbus::config::Settings;
use agentbus::logging::init_default_logging;
use agentbus::transport::resolve_connection_info;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "agentbus")]
#[command(about = "Message-bus protocol layer for the management agent")]
#[command(version)]
struct Cli {
    /// Settings file path
    #[arg(short, long, value_name = "FILE", default_value = "agentbus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate settings and report how connection credentials resolve
    Check {
        /// Print the parsed settings
        #[arg(long)]
        show: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_default_logging();

    let settings = match Settings::load_from_file(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Loading settings from {}: {e}", cli.config.display());
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Check { show } => {
            if show {
                match toml::to_string_pretty(&settings) {
                    Ok(rendered) => println!("{rendered}"),
                    Err(e) => {
                        error!("Rendering settings: {e}");
                        process::exit(1);
                    }
                }
            }

            match resolve_connection_info(&settings) {
                Ok(info) => {
                    info!(
                        "Settings valid: agent {} will connect to {} (auth: {}, mutual TLS: {})",
                        settings.agent.id,
                        info.addr,
                        if info.username.is_some() { "basic" } else { "none" },
                        if info.tls.is_some() { "enabled" } else { "disabled" },
                    );
                }
                Err(e) => {
                    error!("Resolving connection credentials: {e}");
                    process::exit(1);
                }
            }
        }
    }
}
