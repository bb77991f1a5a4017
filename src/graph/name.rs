//! Node identifiers.
//!
//! A node id encodes two fields separated by a single underscore:
//! a group prefix and the instance's control port, e.g. "R12_9001"
//! => group "R12", control port 9001.
//!
//! The digits after the prefix's leading letter feed the UDP base port
//! formula: "R12" => 12 => (50 + 12) * 100 = 6200. That base port is the
//! first UDP link endpoint assigned to the node.

use anyhow::bail;
use serde::Serialize;

/// Parsed and validated node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeName {
    /// The full id as written in the topology file.
    pub raw: String,
    /// Everything before the underscore ("R12").
    pub prefix: String,
    /// Port for administrative commands to this instance.
    pub control_port: u16,
    /// First UDP port assigned to this node's link endpoints.
    pub base_udp_port: u16,
}

impl NodeName {
    /// Parse a `<prefix>_<control-port>` node id.
    ///
    /// The prefix must start with an ASCII letter; any characters between
    /// that letter and the underscore must be decimal digits. No digits at
    /// all ("A_1") counts as numeric part 0.
    pub fn parse(raw: &str) -> anyhow::Result<NodeName> {
        if raw.matches('_').count() != 1 {
            bail!("node name {:?} must contain exactly one '_'", raw);
        }
        let Some((prefix, port)) = raw.split_once('_') else {
            bail!("node name {:?} must contain exactly one '_'", raw);
        };

        let mut chars = prefix.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {}
            _ => bail!("node name {:?}: prefix must start with a letter", raw),
        }
        let digits = chars.as_str();
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            bail!(
                "node name {:?}: expected digits after '{}', got {:?}",
                raw,
                &prefix[..1],
                digits
            );
        }
        let numeric: u32 = if digits.is_empty() { 0 } else { digits.parse()? };

        let control_port: u16 = match port.parse() {
            Ok(p) => p,
            Err(_) => bail!("node name {:?}: bad control port {:?}", raw, port),
        };

        let base = (50 + u64::from(numeric)) * 100;
        let base_udp_port = match u16::try_from(base) {
            Ok(p) => p,
            Err(_) => bail!(
                "node name {:?}: UDP base port {} does not fit in a port number",
                raw,
                base
            ),
        };

        Ok(NodeName {
            raw: raw.to_string(),
            prefix: prefix.to_string(),
            control_port,
            base_udp_port,
        })
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
