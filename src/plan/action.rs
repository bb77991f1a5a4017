//! Deployment actions.
//!
//! The planner emits these instead of command strings so the external-tool
//! syntax stays a rendering concern (see `crate::render`).

use crate::graph::NodeName;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Start the first forwarder daemon of the run. Its control port becomes
    /// the coordinator address for every later spawn.
    SpawnFirst { node: NodeName },

    /// Ask the coordinator to spawn another instance.
    SpawnMore { node: NodeName, coordinator_port: u16 },

    /// Create one direction of a link: addressed to `from`'s control port,
    /// local UDP endpoint `from_port`, remote UDP endpoint `to_port`.
    AddLink {
        from: NodeName,
        to: NodeName,
        link: String,
        from_port: u16,
        to_port: u16,
    },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::SpawnFirst { node } => {
                write!(f, "spawn-first {} control={}", node, node.control_port)
            }
            Action::SpawnMore {
                node,
                coordinator_port,
            } => write!(
                f,
                "spawn {} control={} via={}",
                node, node.control_port, coordinator_port
            ),
            Action::AddLink {
                from,
                to,
                link,
                from_port,
                to_port,
            } => write!(
                f,
                "add-link {} -> {} name={} src={} dst={}",
                from, to, link, from_port, to_port
            ),
        }
    }
}
