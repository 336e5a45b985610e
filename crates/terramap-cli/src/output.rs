//! Output helpers for CLI commands.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

use terramap_graph::GraphModel;

/// Writes text to a file, or to stdout when no path is given.
///
/// # Errors
///
/// Returns an error if the file or stdout cannot be written.
pub fn emit(text: &str, path: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = path {
        std::fs::write(path, text)?;
        tracing::info!(path = %path.display(), bytes = text.len(), "output written");
        return Ok(());
    }
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", text.trim_end())?;
    Ok(())
}

/// Renders a graph as an indented listing.
#[must_use]
pub fn graph_summary(model: &GraphModel) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} graph (rules v{}): {} node(s), {} edge(s)",
        model.provider,
        model.rules_version,
        model.nodes.len(),
        model.edges.len()
    );
    for node in &model.nodes {
        let marker = if node.group { "[+]" } else { " - " };
        let _ = write!(out, "  {marker} {} ({})", node.id, node.display_type);
        if !node.groups.is_empty() {
            let _ = write!(out, " in {}", node.groups.join(", "));
        }
        out.push('\n');
        for edge in model.edges_from(&node.id) {
            let _ = writeln!(out, "        -> {} [{:?}]", edge.target, edge.origin);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use terramap_graph::{Arrow, EdgeOrigin, GraphEdge, GraphNode};

    use super::*;

    fn node(id: &str, group: bool, groups: &[&str]) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            display_type: id.split('.').next().unwrap_or_default().to_string(),
            base_type: id.split('.').next().unwrap_or_default().to_string(),
            group,
            groups: groups.iter().map(|g| (*g).to_string()).collect(),
            rank: 0,
            index: 0,
            origins: Vec::new(),
            synthetic: false,
            vpc: false,
            edge_service: false,
            category: None,
        }
    }

    #[test]
    fn summary_lists_nodes_groups_and_edges() {
        let model = GraphModel {
            provider: "aws".into(),
            rules_version: "1.0".into(),
            nodes: vec![
                node("aws_vpc.main", true, &[]),
                node("aws_instance.web", false, &["aws_vpc.main"]),
            ],
            edges: vec![GraphEdge {
                source: "aws_instance.web".into(),
                target: "aws_vpc.main".into(),
                arrow: Arrow::Forward,
                origin: EdgeOrigin::Explicit,
            }],
            annotations: None,
        };
        let text = graph_summary(&model);
        assert!(text.starts_with("aws graph (rules v1.0): 2 node(s), 1 edge(s)"));
        assert!(text.contains("[+] aws_vpc.main (aws_vpc)"));
        assert!(text.contains("aws_instance.web (aws_instance) in aws_vpc.main"));
        assert!(text.contains("-> aws_vpc.main [Explicit]"));
    }

    #[test]
    fn emit_writes_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("graph.json");
        emit("{}", Some(&path)).expect("emit");
        assert_eq!(std::fs::read_to_string(path).expect("read"), "{}");
    }
}
