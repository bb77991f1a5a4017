//! Rendering actions into external-tool command lines.
//!
//! Planning knows nothing about the forwarder suite's CLI syntax; this
//! module is the one place that does. Three binaries are involved, all
//! expected under `<home>/bin`:
//! - `fwd`     the forwarder daemon
//! - `fwdctl`  the control CLI (spawn instances, add links)
//! - `fwdkey`  the key-store generation tool

use crate::plan::Action;
use std::path::{Path, PathBuf};

pub const FORWARDER_BIN: &str = "fwd";
pub const CONTROL_BIN: &str = "fwdctl";
pub const KEYTOOL_BIN: &str = "fwdkey";

/// Locations of the external binaries.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub forwarder: PathBuf,
    pub control: PathBuf,
    pub keytool: PathBuf,
}

impl ToolPaths {
    pub fn under_home(home: &Path) -> ToolPaths {
        let bin = home.join("bin");
        ToolPaths {
            forwarder: bin.join(FORWARDER_BIN),
            control: bin.join(CONTROL_BIN),
            keytool: bin.join(KEYTOOL_BIN),
        }
    }
}

/// Key-store parameters passed to every control invocation.
#[derive(Debug, Clone)]
pub struct KeyStore {
    pub keyfile: String,
    pub password: String,
    pub subject: String,
    pub bits: u32,
    pub days: u32,
}

/// A program plus arguments, ready to execute or to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Render one action as the command that executes it.
pub fn command(action: &Action, paths: &ToolPaths, keys: &KeyStore) -> CommandLine {
    match action {
        Action::SpawnFirst { node } => CommandLine {
            program: paths.forwarder.clone(),
            args: vec![
                "-c".to_string(),
                format!("tcp://localhost:{}/listener", node.control_port),
            ],
        },
        Action::SpawnMore {
            node,
            coordinator_port,
        } => {
            let mut cmd = control_command(paths, keys, *coordinator_port);
            cmd.args.push("spawn".to_string());
            cmd.args.push(node.control_port.to_string());
            cmd
        }
        Action::AddLink {
            from,
            link,
            from_port,
            to_port,
            ..
        } => {
            let mut cmd = control_command(paths, keys, from.control_port);
            cmd.args.push("add".to_string());
            cmd.args.push("link".to_string());
            cmd.args.push(format!(
                "udp://localhost:{}/local=false/name={}/src=localhost:{}",
                to_port, link, from_port
            ));
            cmd
        }
    }
}

/// The one-shot key-store creation command, run before any spawn.
pub fn keystore_command(paths: &ToolPaths, keys: &KeyStore) -> CommandLine {
    CommandLine {
        program: paths.keytool.clone(),
        args: vec![
            "-c".to_string(),
            keys.keyfile.clone(),
            keys.password.clone(),
            keys.subject.clone(),
            keys.bits.to_string(),
            keys.days.to_string(),
        ],
    }
}

/// Common `fwdctl` preamble addressing one instance's control port.
fn control_command(paths: &ToolPaths, keys: &KeyStore, target_port: u16) -> CommandLine {
    CommandLine {
        program: paths.control.clone(),
        args: vec![
            "-f".to_string(),
            keys.keyfile.clone(),
            "-p".to_string(),
            keys.password.clone(),
            "-a".to_string(),
            format!("tcp://localhost:{}", target_port),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeName;
    use pretty_assertions::assert_eq;

    fn paths() -> ToolPaths {
        ToolPaths::under_home(Path::new("/opt/fwd"))
    }

    fn keys() -> KeyStore {
        KeyStore {
            keyfile: "keyfile".to_string(),
            password: "foo".to_string(),
            subject: "fwd".to_string(),
            bits: 1024,
            days: 365,
        }
    }

    fn nn(raw: &str) -> NodeName {
        NodeName::parse(raw).unwrap()
    }

    #[test]
    fn renders_spawn_first() {
        let cmd = command(&Action::SpawnFirst { node: nn("R1_9001") }, &paths(), &keys());
        assert_eq!(
            cmd.to_string(),
            "/opt/fwd/bin/fwd -c tcp://localhost:9001/listener"
        );
    }

    #[test]
    fn renders_spawn_more() {
        let cmd = command(
            &Action::SpawnMore {
                node: nn("R2_9002"),
                coordinator_port: 9001,
            },
            &paths(),
            &keys(),
        );
        assert_eq!(
            cmd.to_string(),
            "/opt/fwd/bin/fwdctl -f keyfile -p foo -a tcp://localhost:9001 spawn 9002"
        );
    }

    #[test]
    fn renders_add_link() {
        let cmd = command(
            &Action::AddLink {
                from: nn("R1_9001"),
                to: nn("R2_9002"),
                link: "R1R2".to_string(),
                from_port: 5100,
                to_port: 5200,
            },
            &paths(),
            &keys(),
        );
        assert_eq!(
            cmd.to_string(),
            "/opt/fwd/bin/fwdctl -f keyfile -p foo -a tcp://localhost:9001 \
             add link udp://localhost:5200/local=false/name=R1R2/src=localhost:5100"
        );
    }

    #[test]
    fn renders_keystore_creation() {
        let cmd = keystore_command(&paths(), &keys());
        assert_eq!(
            cmd.to_string(),
            "/opt/fwd/bin/fwdkey -c keyfile foo fwd 1024 365"
        );
    }
}
