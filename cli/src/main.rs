//! wg-host - WireGuard endpoint manager
//!
//! Thin trigger surface over the core reconciliation engine. Each
//! `reconcile` invocation reads the operator's snapshot file, pairs it with
//! the last applied snapshot (so the engine sees what changed), and runs a
//! full pass. `status` is a read-only report.

use clap::{Parser, Subcommand};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;
use wg_host_core::{ConfigSnapshot, ConfigUpdate, HostPaths, Reconciler};

const LAST_APPLIED: &str = "last-applied.toml";

#[derive(Parser)]
#[command(name = "wg-host", version, about = "Manage a WireGuard endpoint on this host")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile host state against a configuration snapshot
    Reconcile {
        /// Path to the snapshot TOML file
        #[arg(long)]
        config: PathBuf,
        /// Directory holding the last applied snapshot
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
    /// Print the endpoint status (public key, public IP, listen port)
    Status {
        /// Path to the snapshot TOML file
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> wg_host_core::Result<()> {
    match cli.command {
        Commands::Reconcile { config, state_dir } => {
            let mut paths = HostPaths::default();
            if let Some(dir) = state_dir {
                paths.state_dir = dir;
            }
            let last_applied = paths.state_dir.join(LAST_APPLIED);

            let snapshot = ConfigSnapshot::load(&config)?;
            let update = if last_applied.exists() {
                ConfigUpdate::changed(snapshot.clone(), ConfigSnapshot::load(&last_applied)?)
            } else {
                ConfigUpdate::install(snapshot.clone())
            };

            Reconciler::new(paths).reconcile(&update)?;
            snapshot.save_to(&last_applied)?;
            Ok(())
        }
        Commands::Status { config } => {
            let snapshot = ConfigSnapshot::load(&config)?;
            let report = Reconciler::new(HostPaths::default()).status(&snapshot)?;
            println!("public-key: {}", report.public_key);
            println!(
                "public-ip: {}",
                report.public_ip.as_deref().unwrap_or("unknown")
            );
            println!("listen-port: {}", report.listen_port);
            Ok(())
        }
    }
}
