//! Plan execution: key-store provisioning, process spawning, readiness.
//!
//! The daemon started by `SpawnFirst` is detached and keeps running after we
//! exit. Control commands (`spawn`, `add link`) are short-lived CLI calls and
//! run to completion so their failures are observable: each one is collected
//! instead of aborting the rest of the plan. Only a coordinator that never
//! becomes reachable is fatal, since everything after it talks to it.

use crate::Result;
use crate::plan::{Action, Plan};
use crate::render::{CommandLine, FORWARDER_BIN, KeyStore, ToolPaths, command, keystore_command};
use anyhow::{Context, bail};
use std::net::TcpStream;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounded polling of a freshly spawned instance's control port.
#[derive(Debug, Clone, Copy)]
pub struct ReadyCheck {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ReadyCheck {
    fn default() -> Self {
        ReadyCheck {
            attempts: 20,
            delay: Duration::from_millis(250),
        }
    }
}

/// One action that failed without stopping the run.
#[derive(Debug, Clone)]
pub struct LaunchFailure {
    pub command: String,
    pub error: String,
}

/// What a run actually did.
#[derive(Debug, Clone)]
pub struct LaunchReport {
    /// Node ids an instance was started for, in first-spawn order.
    pub spawned: Vec<String>,
    pub failures: Vec<LaunchFailure>,
}

pub struct Launcher {
    paths: ToolPaths,
    keys: KeyStore,
    ready: ReadyCheck,
    spawned: Vec<String>,
}

impl Launcher {
    pub fn new(paths: ToolPaths, keys: KeyStore, ready: ReadyCheck) -> Launcher {
        Launcher {
            paths,
            keys,
            ready,
            spawned: Vec::new(),
        }
    }

    /// Node ids spawned so far. Valid even after a failed [`Launcher::run`],
    /// so callers can tear the partial deployment down.
    pub fn spawned(&self) -> &[String] {
        &self.spawned
    }

    /// Execute a plan in order.
    pub fn run(&mut self, plan: &Plan) -> Result<LaunchReport> {
        kill_stale();
        self.provision_keystore()?;

        let mut failures = Vec::new();
        for action in &plan.actions {
            let cmd = command(action, &self.paths, &self.keys);
            info!(command = %cmd, "executing");
            match action {
                Action::SpawnFirst { node } => {
                    // Detached: dropping the Child does not kill the daemon,
                    // and we never wait on it.
                    let child = Command::new(&cmd.program)
                        .args(&cmd.args)
                        .stdout(Stdio::null())
                        .stderr(Stdio::null())
                        .spawn()
                        .with_context(|| format!("start forwarder daemon for {}", node))?;
                    info!(pid = child.id(), node = %node, "forwarder daemon started");
                    self.spawned.push(node.raw.clone());
                    self.wait_ready(node.control_port)
                        .with_context(|| format!("coordinator {} never became ready", node))?;
                }
                Action::SpawnMore { node, .. } => match run_control(&cmd) {
                    Ok(()) => {
                        self.spawned.push(node.raw.clone());
                        if let Err(e) = self.wait_ready(node.control_port) {
                            warn!(node = %node, error = %e, "instance not reachable");
                            failures.push(LaunchFailure {
                                command: cmd.to_string(),
                                error: e.to_string(),
                            });
                        }
                    }
                    Err(e) => {
                        warn!(node = %node, error = %e, "spawn failed");
                        failures.push(LaunchFailure {
                            command: cmd.to_string(),
                            error: e.to_string(),
                        });
                    }
                },
                Action::AddLink { from, to, .. } => {
                    if let Err(e) = run_control(&cmd) {
                        warn!(from = %from, to = %to, error = %e, "link creation failed");
                        failures.push(LaunchFailure {
                            command: cmd.to_string(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        Ok(LaunchReport {
            spawned: self.spawned.clone(),
            failures,
        })
    }

    /// Create the key store. Runs once, before any spawn; failure aborts the
    /// whole run.
    fn provision_keystore(&self) -> Result<()> {
        let cmd = keystore_command(&self.paths, &self.keys);
        info!(command = %cmd, "creating key store");
        let status = Command::new(&cmd.program)
            .args(&cmd.args)
            .status()
            .with_context(|| format!("run key tool {}", cmd.program.display()))?;
        if !status.success() {
            bail!("key store creation failed with {}", status);
        }
        Ok(())
    }

    fn wait_ready(&self, port: u16) -> Result<()> {
        let mut last_err = None;
        for _ in 0..self.ready.attempts {
            match TcpStream::connect(("localhost", port)) {
                Ok(_) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    std::thread::sleep(self.ready.delay);
                }
            }
        }
        bail!(
            "control port {} not reachable after {} attempts{}",
            port,
            self.ready.attempts,
            last_err.map(|e| format!(": {}", e)).unwrap_or_default()
        );
    }
}

/// Best-effort kill of forwarder instances from previous runs.
pub fn kill_stale() {
    match Command::new("pkill").arg(FORWARDER_BIN).status() {
        Ok(status) => debug!(%status, "pkill {}", FORWARDER_BIN),
        Err(e) => debug!(error = %e, "pkill unavailable"),
    }
}

fn run_control(cmd: &CommandLine) -> Result<()> {
    let status = Command::new(&cmd.program)
        .args(&cmd.args)
        .status()
        .with_context(|| format!("run {}", cmd.program.display()))?;
    if !status.success() {
        bail!("exited with {}", status);
    }
    Ok(())
}
