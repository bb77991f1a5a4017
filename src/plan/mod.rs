//! Deployment planning: turn a topology into an ordered action sequence.
//!
//! Planning is a pure function over the parsed graph. All state (which nodes
//! are already spawned, the next UDP port per node) lives in this single
//! pass and comes back out in the [`Plan`].

pub mod action;

pub use action::Action;

use crate::Result;
use crate::graph::{Graph, NodeName};
use anyhow::bail;
use serde::Serialize;
use std::collections::BTreeMap;

/// The full deployment plan for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Plan {
    /// The instance every later spawn is addressed to. None iff the graph
    /// has no edges.
    pub coordinator: Option<NodeName>,
    pub actions: Vec<Action>,
    /// Every node an instance is spawned for, in first-spawn order. This is
    /// the end-of-run report.
    pub running: Vec<NodeName>,
}

/// Plan a deployment.
///
/// Walks the edges in file order. For each edge: spawn either endpoint that
/// has no instance yet, then create both directions of the link, consuming
/// one UDP port per endpoint. A node touched by several edges keeps its
/// incrementing port counter across them.
pub fn plan(graph: &Graph) -> Result<Plan> {
    // The coordinator decision is explicit and up front: the source of the
    // first edge. With no edges there is nothing to spawn.
    let Some((first_src, _)) = graph.edges.first() else {
        return Ok(Plan::default());
    };
    let coordinator = NodeName::parse(first_src)?;

    let mut running: Vec<NodeName> = Vec::new();
    let mut next_port: BTreeMap<String, u16> = BTreeMap::new();
    let mut actions: Vec<Action> = Vec::new();

    for (src, dest) in &graph.edges {
        if src == dest {
            bail!("self-loop edge on node {:?} is not supported", src);
        }
        let src = NodeName::parse(src)?;
        let dest = NodeName::parse(dest)?;

        if !running.iter().any(|n| n.raw == src.raw) {
            if running.is_empty() {
                actions.push(Action::SpawnFirst { node: src.clone() });
            } else {
                actions.push(Action::SpawnMore {
                    node: src.clone(),
                    coordinator_port: coordinator.control_port,
                });
            }
            next_port.insert(src.raw.clone(), src.base_udp_port);
            running.push(src.clone());
        }
        if !running.iter().any(|n| n.raw == dest.raw) {
            actions.push(Action::SpawnMore {
                node: dest.clone(),
                coordinator_port: coordinator.control_port,
            });
            next_port.insert(dest.raw.clone(), dest.base_udp_port);
            running.push(dest.clone());
        }

        // Same link name for both directions of the edge.
        let link = format!("{}{}", src.prefix, dest.prefix);
        let from_port = next_port[&src.raw];
        let to_port = next_port[&dest.raw];

        actions.push(Action::AddLink {
            from: src.clone(),
            to: dest.clone(),
            link: link.clone(),
            from_port,
            to_port,
        });
        actions.push(Action::AddLink {
            from: dest.clone(),
            to: src.clone(),
            link,
            from_port: to_port,
            to_port: from_port,
        });

        bump_port(&mut next_port, &src)?;
        bump_port(&mut next_port, &dest)?;
    }

    Ok(Plan {
        coordinator: Some(coordinator),
        actions,
        running,
    })
}

fn bump_port(next_port: &mut BTreeMap<String, u16>, node: &NodeName) -> Result<()> {
    let Some(port) = next_port.get_mut(&node.raw) else {
        bail!("no port counter for node {}", node);
    };
    *port = match port.checked_add(1) {
        Some(p) => p,
        None => bail!("UDP port range exhausted for node {}", node),
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn nn(raw: &str) -> NodeName {
        NodeName::parse(raw).unwrap()
    }

    fn graph_of(edges: &[(&str, &str)]) -> Graph {
        let mut g = Graph::default();
        for (a, b) in edges {
            g.nodes.insert(a.to_string());
            g.nodes.insert(b.to_string());
            g.edges.push((a.to_string(), b.to_string()));
        }
        g
    }

    #[test]
    fn empty_graph_is_an_empty_plan() {
        let p = plan(&Graph::default()).unwrap();
        assert_eq!(p, Plan::default());
        assert!(p.coordinator.is_none());
    }

    #[test]
    fn single_edge_full_sequence() {
        let p = plan(&graph_of(&[("R1_9001", "R2_9002")])).unwrap();

        assert_eq!(
            p.actions,
            vec![
                Action::SpawnFirst { node: nn("R1_9001") },
                Action::SpawnMore {
                    node: nn("R2_9002"),
                    coordinator_port: 9001,
                },
                Action::AddLink {
                    from: nn("R1_9001"),
                    to: nn("R2_9002"),
                    link: "R1R2".to_string(),
                    from_port: 5100,
                    to_port: 5200,
                },
                Action::AddLink {
                    from: nn("R2_9002"),
                    to: nn("R1_9001"),
                    link: "R1R2".to_string(),
                    from_port: 5200,
                    to_port: 5100,
                },
            ]
        );
        assert_eq!(p.coordinator, Some(nn("R1_9001")));
        assert_eq!(p.running, vec![nn("R1_9001"), nn("R2_9002")]);
    }

    #[test]
    fn shared_endpoint_spawned_once() {
        let p = plan(&graph_of(&[
            ("R1_9001", "R2_9002"),
            ("R1_9001", "R3_9003"),
        ]))
        .unwrap();

        let spawns_of_r1 = p
            .actions
            .iter()
            .filter(|a| match a {
                Action::SpawnFirst { node } | Action::SpawnMore { node, .. } => {
                    node.raw == "R1_9001"
                }
                _ => false,
            })
            .count();
        assert_eq!(spawns_of_r1, 1);
        assert_eq!(p.running.len(), 3);
    }

    #[test]
    fn ports_increase_by_one_per_edge_touched() {
        // R1 is on three edges; its source ports must be 5100, 5101, 5102.
        let p = plan(&graph_of(&[
            ("R1_9001", "R2_9002"),
            ("R1_9001", "R3_9003"),
            ("R1_9001", "R4_9004"),
        ]))
        .unwrap();

        let r1_ports: Vec<u16> = p
            .actions
            .iter()
            .filter_map(|a| match a {
                Action::AddLink {
                    from, from_port, ..
                } if from.raw == "R1_9001" => Some(*from_port),
                _ => None,
            })
            .collect();
        assert_eq!(r1_ports, vec![5100, 5101, 5102]);
    }

    #[test]
    fn link_name_shared_by_both_directions() {
        let p = plan(&graph_of(&[("R1_9001", "R2_9002")])).unwrap();
        let names: Vec<&str> = p
            .actions
            .iter()
            .filter_map(|a| match a {
                Action::AddLink { link, .. } => Some(link.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["R1R2", "R1R2"]);
    }

    #[test]
    fn chain_spawns_through_coordinator() {
        let p = plan(&graph_of(&[("A_1", "B_2"), ("B_2", "C_3")])).unwrap();

        // Three spawns: A first, then B and C via A's control port.
        let spawns: Vec<&Action> = p
            .actions
            .iter()
            .filter(|a| !matches!(a, Action::AddLink { .. }))
            .collect();
        assert_eq!(spawns.len(), 3);
        assert_eq!(spawns[0], &Action::SpawnFirst { node: nn("A_1") });
        assert_eq!(
            spawns[1],
            &Action::SpawnMore {
                node: nn("B_2"),
                coordinator_port: 1,
            }
        );
        assert_eq!(
            spawns[2],
            &Action::SpawnMore {
                node: nn("C_3"),
                coordinator_port: 1,
            }
        );

        // Two link actions per edge.
        let links = p.actions.len() - spawns.len();
        assert_eq!(links, 4);

        // B sits on both edges: its counter carries over.
        let b_ports: Vec<u16> = p
            .actions
            .iter()
            .filter_map(|a| match a {
                Action::AddLink {
                    from, from_port, ..
                } if from.raw == "B_2" => Some(*from_port),
                _ => None,
            })
            .collect();
        assert_eq!(b_ports, vec![5000, 5001]);
    }

    #[test]
    fn self_loop_is_rejected() {
        let err = plan(&graph_of(&[("R1_9001", "R1_9001")])).unwrap_err();
        assert!(err.to_string().contains("self-loop"));
    }

    #[test]
    fn malformed_node_name_is_fatal() {
        let err = plan(&graph_of(&[("R19001", "R2_9002")])).unwrap_err();
        assert!(err.to_string().contains("R19001"));
    }
}
