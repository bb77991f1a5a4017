use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

mod graph;
mod launch;
mod plan;
mod render;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "topodeploy")]
#[command(about = "Forwarder topology deployment tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a topology: spawn one forwarder instance per node and connect
    /// the links described by the graph.
    Deploy {
        /// DOT file with the topology description.
        dotfile: String,

        /// Directory the forwarder suite is installed under (binaries in bin/).
        #[arg(long, env = "FWD_HOME")]
        home: PathBuf,

        /// Key-store file created before any instance starts.
        #[arg(long, default_value = "keyfile")]
        keyfile: String,

        /// Key-store password.
        #[arg(long, default_value = "foo")]
        password: String,

        /// Key subject name.
        #[arg(long, default_value = "fwd")]
        key_subject: String,

        /// Key size in bits.
        #[arg(long, default_value = "1024")]
        key_bits: u32,

        /// Key validity in days.
        #[arg(long, default_value = "365")]
        key_days: u32,

        /// How often to poll a fresh instance's control port.
        #[arg(long, default_value = "20")]
        ready_attempts: u32,

        /// Delay between readiness polls, in milliseconds.
        #[arg(long, default_value = "250")]
        ready_delay_ms: u64,
    },

    /// Print the deployment plan without touching any process.
    Plan {
        /// DOT file with the topology description.
        dotfile: String,

        /// Emit the plan as JSON instead of one action per line.
        #[arg(long)]
        json: bool,
    },

    /// Kill forwarder instances left over from previous runs.
    Cleanup,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Deploy {
            dotfile,
            home,
            keyfile,
            password,
            key_subject,
            key_bits,
            key_days,
            ready_attempts,
            ready_delay_ms,
        } => {
            // 1) Parse + plan. Malformed input fails here, before any
            //    process is touched.
            let graph = graph::parse_dot_file(&dotfile)?;
            let deployment = plan::plan(&graph)?;
            if deployment.actions.is_empty() {
                info!("{} has no edges; nothing to deploy", dotfile);
                return Ok(());
            }

            // 2) Execute.
            let mut launcher = launch::Launcher::new(
                render::ToolPaths::under_home(&home),
                render::KeyStore {
                    keyfile,
                    password,
                    subject: key_subject,
                    bits: key_bits,
                    days: key_days,
                },
                launch::ReadyCheck {
                    attempts: ready_attempts,
                    delay: Duration::from_millis(ready_delay_ms),
                },
            );
            let report = match launcher.run(&deployment) {
                Ok(report) => report,
                Err(e) => {
                    // Partial deployments stay running; tell the caller what
                    // to clean up.
                    if !launcher.spawned().is_empty() {
                        warn!(
                            "instances already started: {}",
                            launcher.spawned().join(", ")
                        );
                    }
                    return Err(e);
                }
            };

            // 3) Report.
            for failure in &report.failures {
                warn!(command = %failure.command, error = %failure.error, "action failed");
            }
            println!("Forwarders running on {} node(s):", report.spawned.len());
            for node in &report.spawned {
                println!("  {}", node);
            }
            if !report.failures.is_empty() {
                println!("{} action(s) failed; see log above", report.failures.len());
            }
        }

        Commands::Plan { dotfile, json } => {
            let graph = graph::parse_dot_file(&dotfile)?;
            let deployment = plan::plan(&graph)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&deployment)?);
            } else {
                for action in &deployment.actions {
                    println!("{}", action);
                }
                println!(
                    "{} action(s), {} node(s)",
                    deployment.actions.len(),
                    deployment.running.len()
                );
            }
        }

        Commands::Cleanup => {
            launch::kill_stale();
            println!("Sent kill to running {} processes", render::FORWARDER_BIN);
        }
    }

    Ok(())
}
