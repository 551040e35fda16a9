mod audit;
mod commands;
mod config;
mod executor;
mod inventory;
mod probe;
mod report;
mod topology;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use crate::report::Report;

#[derive(Parser)]
#[command(
    name = "draingate",
    version,
    about = "Admission-controlled draining of datacenter network uplinks"
)]
struct Cli {
    /// Path to config file (default: ~/.config/draingate/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Report output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Debug logs
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether draining a link would breach the resilience threshold
    Audit {
        /// Device name as known to the inventory
        device: String,

        /// Interface name on the device
        interface: String,

        /// Tolerated degraded fraction of the peer group, in (0, 1]
        #[arg(long)]
        threshold: Option<f64>,

        /// Also probe live interface state through the device gateway
        #[arg(long)]
        probe: bool,
    },

    /// Run the admission check and, if admitted, drain the link
    Drain {
        /// Device name as known to the inventory
        device: String,

        /// Interface name on the device
        interface: String,

        /// Tolerated degraded fraction of the peer group, in (0, 1]
        #[arg(long)]
        threshold: Option<f64>,

        /// Actually commit the drain instead of the default dry run
        #[arg(long)]
        no_dry_run: bool,
    },

    /// Reverse a drain (no admission check needed to restore capacity)
    Undrain {
        /// Device name as known to the inventory
        device: String,

        /// Interface name on the device
        interface: String,

        /// Actually commit the undrain instead of the default dry run
        #[arg(long)]
        no_dry_run: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config_path = cli.config.as_deref();
    let result = match &cli.command {
        Commands::Audit {
            device,
            interface,
            threshold,
            probe,
        } => commands::audit::run(device, interface, *threshold, *probe, config_path),
        Commands::Drain {
            device,
            interface,
            threshold,
            no_dry_run,
        } => commands::drain::run(device, interface, *threshold, *no_dry_run, config_path),
        Commands::Undrain {
            device,
            interface,
            no_dry_run,
        } => commands::undrain::run(device, interface, *no_dry_run, config_path),
    };

    // The single exit boundary: the report (or the error) decides the code.
    match result {
        Ok(report) => {
            print_report(&report, cli.format);
            std::process::exit(report.exit_code());
        }
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn print_report(report: &Report, format: OutputFormat) {
    match format {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", report.render_json()),
    }
}

/// Logs go to stderr so stdout stays report-only.
fn init_tracing(debug: bool) {
    let default = if debug { "draingate=debug" } else { "draingate=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
