//! Rule-driven graph construction.
//!
//! The builder works on a `petgraph` stable graph keyed by node id. Steps
//! run in a fixed order over declarations in dataset order:
//!
//! 1. variant resolution and consolidation into nodes;
//! 2. explicit references, which become edges or group membership;
//! 3. special handlers;
//! 4. auto-annotations;
//! 5. implied connections.
//!
//! Reverse-arrow normalisation happens as edges are added, and the final
//! draw ordering when the model is emitted.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use terramap_resolve::MergedDataset;

use crate::declarations::{Declaration, collect};
use crate::handlers;
use crate::model::{Arrow, EdgeOrigin, GraphEdge, GraphModel, GraphNode};
use crate::references::{Reference, scan_value, unscoped};
use crate::rules::{HandlerKind, ProviderRules};

/// Options of one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Emit nodes for data sources.
    pub include_data: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { include_data: true }
    }
}

/// Builds graph models from merged datasets with one rule table.
#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder<'r> {
    rules: &'r ProviderRules,
    options: BuildOptions,
}

impl<'r> GraphBuilder<'r> {
    /// Creates a builder with default options.
    #[must_use]
    pub fn new(rules: &'r ProviderRules) -> Self {
        Self {
            rules,
            options: BuildOptions::default(),
        }
    }

    /// Replaces the build options.
    #[must_use]
    pub const fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the graph model of a dataset.
    #[must_use]
    pub fn build(&self, dataset: &MergedDataset) -> GraphModel {
        let decls = collect(dataset, self.options.include_data);
        tracing::info!(
            declarations = decls.len(),
            provider = %self.rules.provider,
            "building graph"
        );

        let mut state = GraphState::new(self.rules);
        for decl in &decls {
            state.declare(decl);
        }
        for decl in &decls {
            state.link_references(decl);
        }
        for decl in &decls {
            handlers::apply(&mut state, decl, &decls);
        }
        state.auto_annotate();
        for decl in &decls {
            state.imply(decl);
        }

        let model = state.into_model(dataset.annotations.clone());
        tracing::info!(nodes = model.nodes.len(), edges = model.edges.len(), "graph built");
        model
    }
}

/// Edge payload inside the working graph.
#[derive(Debug, Clone, Copy)]
struct EdgeInfo {
    arrow: Arrow,
    origin: EdgeOrigin,
}

/// Mutable graph under construction.
pub(crate) struct GraphState<'r> {
    rules: &'r ProviderRules,
    graph: StableDiGraph<GraphNode, EdgeInfo>,
    ids: BTreeMap<String, NodeIndex>,
    /// Declaration address to current node id.
    aliases: BTreeMap<String, String>,
    /// Consolidated nodes whose display type is already settled.
    variant_fixed: BTreeSet<String>,
    next_index: usize,
}

impl<'r> GraphState<'r> {
    pub(crate) fn new(rules: &'r ProviderRules) -> Self {
        Self {
            rules,
            graph: StableDiGraph::new(),
            ids: BTreeMap::new(),
            aliases: BTreeMap::new(),
            variant_fixed: BTreeSet::new(),
            next_index: 0,
        }
    }

    pub(crate) const fn rules(&self) -> &'r ProviderRules {
        self.rules
    }

    fn add_node(&mut self, id: &str, base_type: &str, synthetic: bool) -> NodeIndex {
        if let Some(ix) = self.ids.get(id) {
            return *ix;
        }
        let node = GraphNode {
            id: id.to_string(),
            display_type: base_type.to_string(),
            base_type: base_type.to_string(),
            group: self.rules.is_group(unscoped(id)),
            groups: Vec::new(),
            rank: 0,
            index: self.next_index,
            origins: Vec::new(),
            synthetic,
            vpc: false,
            edge_service: false,
            category: None,
        };
        self.next_index += 1;
        let ix = self.graph.add_node(node);
        let _ = self.ids.insert(id.to_string(), ix);
        ix
    }

    /// Ensures a builder-invented node exists.
    pub(crate) fn synthetic(&mut self, id: &str) {
        let base = id.split('.').next().unwrap_or(id).to_string();
        if !self.ids.contains_key(id) {
            tracing::debug!(node = id, "adding synthetic node");
        }
        let _ = self.add_node(id, &base, true);
    }

    pub(crate) fn node(&self, id: &str) -> Option<&GraphNode> {
        self.ids.get(id).map(|ix| &self.graph[*ix])
    }

    /// Current node id of a declaration address.
    pub(crate) fn node_for(&self, address: &str) -> Option<String> {
        self.aliases.get(address).cloned()
    }

    /// Resolves a reference from `scope`, module scope first then root.
    pub(crate) fn resolve(&self, reference: &Reference, scope: Option<&str>) -> Option<String> {
        if let Some(module) = reference.module.as_deref() {
            return self.node_for(&reference.address_in(Some(module)));
        }
        scope
            .and_then(|m| self.node_for(&reference.address_in(Some(m))))
            .or_else(|| self.node_for(&reference.address_in(None)))
    }

    /// Resolves every reference in one attribute of a declaration.
    pub(crate) fn references_in(&self, decl: &Declaration<'_>, attribute: &str) -> Vec<String> {
        let Some(value) = decl.block.attributes.get(attribute) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for reference in scan_value(value, &self.rules.prefix) {
            if let Some(id) = self.resolve(&reference, decl.module.as_deref()) {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        out
    }

    /// Groups containing a node.
    pub(crate) fn groups_of(&self, id: &str) -> Vec<String> {
        self.node(id).map(|n| n.groups.clone()).unwrap_or_default()
    }

    /// Adds `member` to `group`.
    pub(crate) fn join(&mut self, member: &str, group: &str) {
        if member == group || !self.ids.contains_key(group) {
            return;
        }
        if let Some(ix) = self.ids.get(member) {
            let node = &mut self.graph[*ix];
            if !node.groups.iter().any(|g| g == group) {
                node.groups.push(group.to_string());
            }
        }
    }

    /// Removes `member` from `group`.
    pub(crate) fn leave(&mut self, member: &str, group: &str) {
        if let Some(ix) = self.ids.get(member) {
            self.graph[*ix].groups.retain(|g| g != group);
        }
    }

    /// Adds an edge as given, skipping self edges and duplicates.
    pub(crate) fn connect_as(&mut self, source: &str, target: &str, arrow: Arrow, origin: EdgeOrigin) {
        if source == target {
            return;
        }
        let (Some(s), Some(t)) = (self.ids.get(source).copied(), self.ids.get(target).copied()) else {
            return;
        };
        if self.graph.find_edge(s, t).is_none() {
            let _ = self.graph.add_edge(s, t, EdgeInfo { arrow, origin });
        }
    }

    /// Adds an edge from a declaring node, flipping it when the source is
    /// on the reverse-arrow list.
    pub(crate) fn connect(&mut self, source: &str, target: &str, origin: EdgeOrigin) {
        if self.rules.is_reverse(unscoped(source)) {
            self.connect_as(target, source, Arrow::Reverse, origin);
        } else {
            self.connect_as(source, target, Arrow::Forward, origin);
        }
    }

    /// Joins group targets, connects everything else.
    fn link(&mut self, source: &str, target: &str, origin: EdgeOrigin) {
        if self.node(target).is_some_and(|n| n.group) {
            self.join(source, target);
        } else {
            self.connect(source, target, origin);
        }
    }

    /// Folds node `from` into node `into`: origins, memberships, edges and
    /// aliases move over and `from` disappears.
    pub(crate) fn fold(&mut self, from: &str, into: &str) {
        if from == into {
            return;
        }
        let (Some(fx), Some(ix)) = (self.ids.get(from).copied(), self.ids.get(into).copied()) else {
            return;
        };
        let incoming: Vec<(NodeIndex, EdgeInfo)> = self
            .graph
            .edges_directed(fx, Direction::Incoming)
            .map(|e| (e.source(), *e.weight()))
            .collect();
        let outgoing: Vec<(NodeIndex, EdgeInfo)> = self
            .graph
            .edges_directed(fx, Direction::Outgoing)
            .map(|e| (e.target(), *e.weight()))
            .collect();
        let Some(folded) = self.graph.remove_node(fx) else {
            return;
        };
        let _ = self.ids.remove(from);
        tracing::debug!(from, into, "folding node");

        for (s, info) in incoming {
            if s != ix && self.graph.find_edge(s, ix).is_none() {
                let _ = self.graph.add_edge(s, ix, info);
            }
        }
        for (t, info) in outgoing {
            if t != ix && self.graph.find_edge(ix, t).is_none() {
                let _ = self.graph.add_edge(ix, t, info);
            }
        }

        let target = &mut self.graph[ix];
        for origin in folded.origins {
            if !target.origins.contains(&origin) {
                target.origins.push(origin);
            }
        }
        for group in folded.groups {
            if group != into && !target.groups.contains(&group) {
                target.groups.push(group);
            }
        }
        for node in self.graph.node_weights_mut() {
            for group in &mut node.groups {
                if *group == from {
                    into.clone_into(group);
                }
            }
            let own = node.id.clone();
            let mut seen = BTreeSet::new();
            node.groups.retain(|g| *g != own && seen.insert(g.clone()));
        }
        for value in self.aliases.values_mut() {
            if *value == from {
                into.clone_into(value);
            }
        }
    }

    /// Node ids in discovery order.
    pub(crate) fn ids_in_order(&self) -> Vec<String> {
        let mut nodes: Vec<&GraphNode> = self.graph.node_weights().collect();
        nodes.sort_by_key(|n| n.index);
        nodes.into_iter().map(|n| n.id.clone()).collect()
    }

    /// Places a declaration into its node, consolidating where a rule matches.
    fn declare(&mut self, decl: &Declaration<'_>) {
        let rules = self.rules;
        let texts = decl.block.text_values();
        let variant = rules
            .variant_for(&decl.resource_type, &texts)
            .map(str::to_string);

        let id = if let Some(rule) = rules.consolidation_for(&decl.resource_type) {
            let canonical_type = rule.node.split_once('.').map_or(rule.node.as_str(), |(t, _)| t);
            let ix = self.add_node(&rule.node, canonical_type, false);
            let node = &mut self.graph[ix];
            node.vpc = rule.vpc;
            node.edge_service = rule.edge_service;
            node.category.clone_from(&rule.category);
            if let Some(v) = variant {
                if self.variant_fixed.insert(rule.node.clone()) {
                    node.display_type = v;
                }
            }
            rule.node.clone()
        } else {
            let ix = self.add_node(&decl.address, &decl.resource_type, false);
            if let Some(v) = variant {
                self.graph[ix].display_type = v;
            }
            if rules.handler_for(&decl.resource_type).is_none() {
                tracing::info!(resource_type = %decl.resource_type, "type matches no provider rule");
            }
            decl.address.clone()
        };

        if let Some(ix) = self.ids.get(&id) {
            let node = &mut self.graph[*ix];
            if !node.origins.contains(&decl.address) {
                node.origins.push(decl.address.clone());
            }
        }
        let _ = self.aliases.insert(decl.address.clone(), id);
    }

    /// Turns the references written in a declaration into edges or membership.
    fn link_references(&mut self, decl: &Declaration<'_>) {
        let Some(source) = self.node_for(&decl.address) else {
            return;
        };
        let owned = self
            .rules()
            .handler_for(&decl.resource_type)
            .map_or(&[][..], HandlerKind::owned_attributes);
        for (key, value) in &decl.block.attributes {
            if owned.contains(&key.as_str()) {
                continue;
            }
            for reference in scan_value(value, &self.rules.prefix) {
                match self.resolve(&reference, decl.module.as_deref()) {
                    Some(target) => self.link(&source, &target, EdgeOrigin::Explicit),
                    None => tracing::trace!(
                        from = %decl.address,
                        reference = %reference.address_in(None),
                        "reference to undeclared resource"
                    ),
                }
            }
        }
    }

    /// Adds the implied nodes and edges of auto-annotation rules.
    fn auto_annotate(&mut self) {
        let rules = self.rules;
        for id in self.ids_in_order() {
            let Some(rule) = rules.auto_annotation_for(unscoped(&id)) else {
                continue;
            };
            for target in &rule.targets {
                let targets = if let Some(stem) = target.strip_suffix('*') {
                    self.ids_in_order()
                        .into_iter()
                        .filter(|other| *other != id && unscoped(other).starts_with(stem))
                        .collect()
                } else {
                    self.synthetic(target);
                    vec![target.clone()]
                };
                for t in targets {
                    match rule.arrow {
                        Arrow::Forward => {
                            self.connect_as(&id, &t, Arrow::Forward, EdgeOrigin::AutoAnnotation);
                        }
                        Arrow::Reverse => {
                            self.connect_as(&t, &id, Arrow::Reverse, EdgeOrigin::AutoAnnotation);
                        }
                    }
                }
            }
        }
    }

    /// Applies implied-connection rules to one declaration.
    fn imply(&mut self, decl: &Declaration<'_>) {
        let Some(source) = self.node_for(&decl.address) else {
            return;
        };
        let rules = self.rules;
        for rule in &rules.implied_connections {
            if !decl.block.has_value(&rule.attribute) {
                continue;
            }
            let target = self
                .graph
                .node_weights()
                .filter(|n| n.base_type == rule.target)
                .min_by_key(|n| n.index)
                .map(|n| n.id.clone());
            match target {
                Some(t) => self.connect(&source, &t, EdgeOrigin::Implied),
                None => tracing::debug!(
                    from = %decl.address,
                    attribute = %rule.attribute,
                    target = %rule.target,
                    "implied connection has no target node"
                ),
            }
        }
    }

    /// Emits the ordered model.
    fn into_model(self, annotations: Option<serde_yaml::Value>) -> GraphModel {
        let mut nodes: Vec<GraphNode> = self
            .graph
            .node_weights()
            .cloned()
            .map(|mut node| {
                node.rank = self.rules.draw_rank(unscoped(&node.id));
                node.groups.retain(|g| self.ids.contains_key(g));
                node
            })
            .collect();
        nodes.sort_by_key(|n| (n.rank, n.index));

        let position: BTreeMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();
        let mut edges: Vec<(usize, usize, GraphEdge)> = self
            .graph
            .edge_references()
            .filter_map(|e| {
                let source = &self.graph[e.source()].id;
                let target = &self.graph[e.target()].id;
                Some((
                    *position.get(source.as_str())?,
                    *position.get(target.as_str())?,
                    GraphEdge {
                        source: source.clone(),
                        target: target.clone(),
                        arrow: e.weight().arrow,
                        origin: e.weight().origin,
                    },
                ))
            })
            .collect();
        edges.sort_by_key(|(s, t, _)| (*s, *t));

        GraphModel {
            provider: self.rules.provider.clone(),
            rules_version: self.rules.version.clone(),
            nodes,
            edges: edges.into_iter().map(|(_, _, e)| e).collect(),
            annotations,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use terramap_common::types::{ParsedFile, RawBlock, SectionKind, SourceFile};
    use terramap_parser::loader::LoadedFile;

    use super::*;

    fn block(labels: [&str; 2], attributes: Value, path: &str) -> RawBlock {
        RawBlock {
            kind: SectionKind::Resource,
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
            attributes: attributes.as_object().cloned().unwrap_or_default(),
            file: SourceFile::new(path),
        }
    }

    fn dataset(blocks: Vec<RawBlock>) -> MergedDataset {
        let mut dataset = MergedDataset::new();
        let _ = dataset.merge_file(LoadedFile {
            file: SourceFile::new("/infra/main.tf"),
            parsed: ParsedFile {
                blocks,
                assignments: serde_json::Map::new(),
            },
            salvaged: false,
        });
        dataset
    }

    fn rules() -> ProviderRules {
        ProviderRules::aws().expect("rules")
    }

    #[test]
    fn references_to_groups_become_membership() {
        let rules = rules();
        let model = GraphBuilder::new(&rules).build(&dataset(vec![
            block(["aws_vpc", "main"], json!({}), "/infra/main.tf"),
            block(
                ["aws_instance", "web"],
                json!({ "vpc_security_group_ids": ["${aws_vpc.main.id}"] }),
                "/infra/main.tf",
            ),
        ]));
        let web = model.node("aws_instance.web").expect("web");
        assert_eq!(web.groups, vec!["aws_vpc.main"]);
        assert!(model.edges.is_empty());
    }

    #[test]
    fn reverse_listed_sources_are_flipped() {
        let rules = rules();
        let model = GraphBuilder::new(&rules).build(&dataset(vec![
            block(["aws_instance", "web"], json!({}), "/infra/main.tf"),
            block(
                ["aws_iam_role", "app"],
                json!({ "description": "${aws_instance.web.arn}" }),
                "/infra/main.tf",
            ),
        ]));
        let edge = &model.edges[0];
        assert_eq!(edge.source, "aws_instance.web");
        assert_eq!(edge.target, "aws_iam_role.app");
        assert_eq!(edge.arrow, Arrow::Reverse);
    }

    #[test]
    fn implied_connection_targets_first_node_of_type() {
        let rules = rules();
        let model = GraphBuilder::new(&rules).build(&dataset(vec![
            block(["aws_acm_certificate", "site"], json!({}), "/infra/main.tf"),
            block(
                ["aws_cloudfront_distribution", "cdn"],
                json!({ "viewer_certificate": [{ "certificate_arn": "arn" }], "certificate_arn": "x" }),
                "/infra/main.tf",
            ),
            block(
                ["aws_instance", "no_target"],
                json!({ "container_definitions": "[]" }),
                "/infra/main.tf",
            ),
        ]));
        assert!(model.edges.iter().any(|e| {
            e.origin == EdgeOrigin::Implied
                && e.source == "aws_acm_certificate.acm"
                && e.target == "aws_cloudfront_distribution.cdn"
        }));
        assert!(model.edges_from("aws_instance.no_target").next().is_none());
    }

    #[test]
    fn wildcard_annotations_match_existing_nodes_only() {
        let rules = rules();
        let model = GraphBuilder::new(&rules).build(&dataset(vec![block(
            ["aws_nat_gateway", "gw"],
            json!({}),
            "/infra/main.tf",
        )]));
        assert_eq!(model.nodes.len(), 1);
        assert!(model.edges.is_empty());

        let model = GraphBuilder::new(&rules).build(&dataset(vec![
            block(["aws_nat_gateway", "gw"], json!({}), "/infra/main.tf"),
            block(["aws_internet_gateway", "main"], json!({}), "/infra/main.tf"),
        ]));
        assert!(model.edges.iter().any(|e| e.source == "aws_nat_gateway.gw"
            && e.target == "aws_internet_gateway.igw"
            && e.origin == EdgeOrigin::AutoAnnotation));
        assert!(model.node("tm_aws_internet.internet").is_some_and(|n| n.synthetic));
    }

    #[test]
    fn data_sources_follow_options() {
        let rules = rules();
        let mut blocks = vec![block(["aws_instance", "web"], json!({}), "/infra/main.tf")];
        let mut data = block(["aws_ami", "ubuntu"], json!({}), "/infra/main.tf");
        data.kind = SectionKind::Data;
        blocks.push(data);
        let dataset = dataset(blocks);

        let with = GraphBuilder::new(&rules).build(&dataset);
        assert!(with.node("data.aws_ami.ubuntu").is_some());
        let without = GraphBuilder::new(&rules)
            .with_options(BuildOptions { include_data: false })
            .build(&dataset);
        assert!(without.node("data.aws_ami.ubuntu").is_none());
    }
}
