use anyhow::{Context, bail};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use tracing::debug;

/// Parsed topology: node set plus edges in file declaration order.
///
/// Edges are kept exactly as declared: not sorted, not deduplicated, and
/// `--` edges are recorded once like `->` edges (the deployment itself
/// creates both directions of every link).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    pub nodes: BTreeSet<String>,
    pub edges: Vec<(String, String)>,
}

/// Parse a DOT topology file.
pub fn parse_dot_file(path: &str) -> anyhow::Result<Graph> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read topology file {}", path))?;
    parse_dot(&text).with_context(|| format!("parse topology file {}", path))
}

enum LineKind {
    Edge(String, String),
    Node(String),
    Ignored,
}

/// Parse the node/edge subset of DOT.
///
/// Recognized statements:
/// - `a -> b;` / `a -- b;` edge statements, optional attribute list
/// - bare node statements (`a;`), optional attribute list
/// - `digraph x {` / `graph {` headers, closing `}`
/// - `//` and `#` comments, default-attribute statements, `key=value`
///
/// Anything else is a parse error carrying the line number.
pub fn parse_dot(text: &str) -> anyhow::Result<Graph> {
    // Identifiers may be quoted; attribute lists and semicolons are noise.
    let edge_re = Regex::new(
        r#"^\s*"?([A-Za-z0-9_]+)"?\s*(->|--)\s*"?([A-Za-z0-9_]+)"?\s*(\[[^\]]*\])?\s*;?\s*$"#,
    )?;
    let node_re = Regex::new(r#"^\s*"?([A-Za-z0-9_]+)"?\s*(\[[^\]]*\])?\s*;?\s*$"#)?;

    let mut graph = Graph::default();
    for (lineno, line) in text.lines().enumerate() {
        let lno = lineno + 1;
        match classify(line, &edge_re, &node_re) {
            Some(LineKind::Edge(src, dest)) => {
                graph.nodes.insert(src.clone());
                graph.nodes.insert(dest.clone());
                graph.edges.push((src, dest));
            }
            Some(LineKind::Node(name)) => {
                graph.nodes.insert(name);
            }
            Some(LineKind::Ignored) => {
                debug!(line = lno, "skipping non-topology line");
            }
            None => {
                bail!("cannot parse line {}: {:?}", lno, line.trim());
            }
        }
    }
    Ok(graph)
}

fn classify(line: &str, edge_re: &Regex, node_re: &Regex) -> Option<LineKind> {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with('#') {
        return Some(LineKind::Ignored);
    }
    // Graph header and closing brace.
    if trimmed == "}" || (trimmed.ends_with('{') && is_header(trimmed)) {
        return Some(LineKind::Ignored);
    }
    // Default-attribute statements and graph-level key=value settings.
    if trimmed.contains('=') && !trimmed.contains("->") && !trimmed.contains("--") {
        return Some(LineKind::Ignored);
    }

    if let Some(caps) = edge_re.captures(line) {
        let src = caps.get(1)?.as_str().to_string();
        let dest = caps.get(3)?.as_str().to_string();
        return Some(LineKind::Edge(src, dest));
    }
    if let Some(caps) = node_re.captures(line) {
        let name = caps.get(1)?.as_str();
        // DOT keywords are not node names.
        if matches!(name, "graph" | "digraph" | "node" | "edge" | "strict") {
            return Some(LineKind::Ignored);
        }
        return Some(LineKind::Node(name.to_string()));
    }
    None
}

fn is_header(trimmed: &str) -> bool {
    let head = trimmed.trim_end_matches('{').trim();
    let mut words = head.split_whitespace();
    matches!(words.next(), Some("graph" | "digraph" | "strict") | None)
}
