//! scalekeep — CPU-driven replica autoscaler.
//!
//! Each invocation of `scalekeep pass` runs one reconciliation pass and
//! exits; schedule it with cron or a systemd timer.
//!
//! ```text
//! scalekeep --config scalekeep.toml pass --snapshot upstream.json
//! scalekeep status shop/api
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use scalekeep_core::ScalekeepConfig;

mod actuator;
mod commands;
mod logging;
mod snapshot;

#[derive(Parser)]
#[command(
    name = "scalekeep",
    about = "scalekeep — CPU-driven replica autoscaler",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the config file. Missing file means built-in defaults.
    #[arg(short, long, global = true, default_value = "scalekeep.toml")]
    config: PathBuf,

    /// Override `global.state_path`.
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one reconciliation pass over every service in the snapshot.
    Pass {
        /// JSON snapshot of upstream responses (projects, stats, replicas).
        #[arg(short, long)]
        snapshot: PathBuf,
        /// Log decisions without calling the actuator or touching state.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print persisted state for one service or all of them.
    Status {
        /// Service as `project/service`.
        service: Option<String>,
    },
    /// Validate the config file and print the resolved policies.
    Check,
    /// Run the decision engine once for the given inputs.
    Decide {
        /// Current CPU reading (normalized like upstream samples).
        #[arg(long)]
        cpu: f64,
        /// Current replica count.
        #[arg(long)]
        replicas: u32,
        /// Previous CPU reading, if any.
        #[arg(long)]
        prior: Option<f64>,
        /// Use this service's policy instead of the defaults.
        #[arg(long)]
        service: Option<String>,
        /// Evaluate as if the service were in its cooldown window.
        #[arg(long)]
        cooldown: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ScalekeepConfig::load(&cli.config)?.with_env_overrides();
    let _log_guard = logging::init(&config.logging)?;

    let state_path = cli.state.unwrap_or_else(|| config.state_path());

    match cli.command {
        Command::Pass { snapshot, dry_run } => {
            commands::pass::run(&config, &state_path, &snapshot, dry_run).await
        }
        Command::Status { service } => commands::status::run(&config, &state_path, service.as_deref()),
        Command::Check => commands::check::run(&config),
        Command::Decide {
            cpu,
            replicas,
            prior,
            service,
            cooldown,
        } => commands::decide::run(&config, cpu, replicas, prior, service.as_deref(), cooldown),
    }
}
