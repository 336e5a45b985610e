//! Graph model handed to renderers.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use terramap_common::error::Result;

/// Edge direction relative to the declaring node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arrow {
    /// Drawn from the declaring node to the target.
    Forward,
    /// Drawn from the target to the declaring node.
    Reverse,
}

/// Why an edge exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOrigin {
    /// A reference written in an attribute.
    Explicit,
    /// An auto-annotation rule.
    AutoAnnotation,
    /// An implied connection rule.
    Implied,
    /// A special handler.
    Handler,
}

/// One node of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Canonical id, e.g. `aws_lb.elb` or `module.net.aws_vpc.this`.
    pub id: String,
    /// Type shown by the renderer, after variant resolution.
    pub display_type: String,
    /// Resource type the id was derived from.
    pub base_type: String,
    /// Node is a container for other nodes.
    pub group: bool,
    /// Ids of the group nodes containing this node.
    pub groups: Vec<String>,
    /// Draw rank; lower ranks are drawn first.
    pub rank: usize,
    /// Order of first discovery.
    pub index: usize,
    /// Resource addresses folded into this node.
    pub origins: Vec<String>,
    /// Node was invented by the builder.
    pub synthetic: bool,
    /// Node is drawn inside a VPC.
    pub vpc: bool,
    /// Node is an edge service.
    pub edge_service: bool,
    /// Opaque category tag from the consolidation rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// One directed edge between two emitted nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Id of the node the arrow leaves.
    pub source: String,
    /// Id of the node the arrow enters.
    pub target: String,
    /// Whether the edge was flipped relative to its declaration.
    pub arrow: Arrow,
    /// Why the edge exists.
    pub origin: EdgeOrigin,
}

/// The ordered graph of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphModel {
    /// Provider of the rule table used.
    pub provider: String,
    /// Version of the rule table used.
    pub rules_version: String,
    /// Nodes, sorted by rank then discovery.
    pub nodes: Vec<GraphNode>,
    /// Edges between emitted nodes.
    pub edges: Vec<GraphEdge>,
    /// Architecture annotations from the dataset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_yaml::Value>,
}

impl GraphModel {
    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Returns the edges leaving a node.
    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a GraphEdge> {
        self.edges.iter().filter(move |edge| edge.source == id)
    }

    /// Returns the nodes contained in a group.
    pub fn members<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a GraphNode> {
        self.nodes
            .iter()
            .filter(move |node| node.groups.iter().any(|g| g == group))
    }

    /// Serialises the model as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// SHA-256 of the compact JSON encoding, as lowercase hex.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let digest = Sha256::digest(&bytes);
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        Ok(hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, rank: usize, groups: &[&str]) -> GraphNode {
        GraphNode {
            id: id.into(),
            display_type: id.split('.').next().unwrap_or_default().into(),
            base_type: id.split('.').next().unwrap_or_default().into(),
            group: false,
            groups: groups.iter().map(|g| (*g).to_string()).collect(),
            rank,
            index: 0,
            origins: vec![id.into()],
            synthetic: false,
            vpc: false,
            edge_service: false,
            category: None,
        }
    }

    fn model() -> GraphModel {
        GraphModel {
            provider: "aws".into(),
            rules_version: "1.0".into(),
            nodes: vec![
                node("aws_vpc.main", 2, &[]),
                node("aws_instance.web", 4, &["aws_vpc.main"]),
            ],
            edges: vec![GraphEdge {
                source: "aws_instance.web".into(),
                target: "aws_vpc.main".into(),
                arrow: Arrow::Forward,
                origin: EdgeOrigin::Explicit,
            }],
            annotations: None,
        }
    }

    #[test]
    fn lookups() {
        let m = model();
        assert!(m.node("aws_vpc.main").is_some());
        assert_eq!(m.edges_from("aws_instance.web").count(), 1);
        assert_eq!(m.members("aws_vpc.main").count(), 1);
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = model();
        let mut b = model();
        assert_eq!(a.fingerprint().expect("hash"), b.fingerprint().expect("hash"));
        assert_eq!(a.fingerprint().expect("hash").len(), 64);
        b.nodes[1].rank = 3;
        assert_ne!(a.fingerprint().expect("hash"), b.fingerprint().expect("hash"));
    }

    #[test]
    fn json_uses_snake_case_tags() {
        let json = model().to_json().expect("json");
        assert!(json.contains("\"origin\": \"explicit\""));
        assert!(json.contains("\"arrow\": \"forward\""));
        assert!(!json.contains("annotations"));
    }
}
