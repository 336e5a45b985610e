//! Provider rule tables.
//!
//! A rule table is versioned YAML data describing how one provider's
//! declarations become graph nodes. Every lookup is longest-prefix-wins
//! over an explicit ordered list. The AWS table ships embedded; any
//! table can be loaded from a file instead.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use terramap_common::error::{Result, TerramapError};

use crate::model::Arrow;

/// The embedded AWS rule table.
const AWS_RULES: &str = include_str!("../../rules/aws.yaml");

/// Rank given to nodes that match no draw-order list.
pub const CATCH_ALL_RANK: usize = 4;

/// Collapses every declaration with a type prefix into one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationRule {
    /// Resource type prefix.
    pub prefix: String,
    /// Canonical `type.name` id of the representative node.
    pub node: String,
    /// Opaque category tag passed through to the renderer.
    #[serde(default, alias = "import_location")]
    pub category: Option<String>,
    /// Node is drawn inside a VPC.
    #[serde(default)]
    pub vpc: bool,
    /// Node is an edge service.
    #[serde(default)]
    pub edge_service: bool,
}

/// Prefix lists that fix the draw order before the consolidated prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawOrder {
    /// Nodes outside the cloud boundary.
    #[serde(default)]
    pub outer: Vec<String>,
    /// Nodes inside the cloud but outside any network group.
    #[serde(default)]
    pub edge: Vec<String>,
    /// Group (container) node prefixes.
    #[serde(default)]
    pub group: Vec<String>,
}

/// One keyword of a variant rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantKeyword {
    /// Case-sensitive text searched for in attribute values.
    pub keyword: String,
    /// Display type used when the keyword is found.
    pub variant: String,
}

/// Chooses a sub-variant display type from attribute values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRule {
    /// Resource type prefix.
    pub prefix: String,
    /// Keywords in priority order.
    pub keywords: Vec<VariantKeyword>,
}

/// Adds implied nodes linked to every node with a type prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoAnnotationRule {
    /// Node id prefix.
    pub prefix: String,
    /// Target node ids; a trailing `*` matches existing nodes only.
    #[serde(alias = "link")]
    pub targets: Vec<String>,
    /// Edge direction relative to the matching node.
    pub arrow: Arrow,
}

/// Links a declaration to a node type when an attribute is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpliedConnectionRule {
    /// Attribute name.
    pub attribute: String,
    /// Target resource type.
    pub target: String,
}

/// Special handlers for types needing more than reference edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Edges to every origin of a distribution.
    #[serde(alias = "aws_handle_cloudfront")]
    Cloudfront,
    /// Availability-zone groups for subnets.
    #[serde(alias = "aws_handle_subnet_azs")]
    SubnetAzs,
    /// Scaled resources join their scaling target.
    #[serde(alias = "aws_handle_autoscaling")]
    Autoscaling,
    /// Mount targets and access points fold into their file system.
    #[serde(alias = "aws_handle_efs")]
    Efs,
    /// Ingress and egress edges between security groups.
    #[serde(alias = "aws_handle_sg")]
    SecurityGroup,
    /// Shared services join one shared group.
    #[serde(alias = "aws_handle_sharedgroup")]
    SharedGroup,
}

impl HandlerKind {
    /// Attributes the handler interprets itself; the reference scan skips them.
    #[must_use]
    pub const fn owned_attributes(self) -> &'static [&'static str] {
        match self {
            Self::Cloudfront => &["origin"],
            Self::Autoscaling => &["resource_id", "scalable_dimension"],
            Self::SecurityGroup => &[
                "ingress",
                "egress",
                "security_group_id",
                "source_security_group_id",
            ],
            Self::SubnetAzs | Self::Efs | Self::SharedGroup => &[],
        }
    }
}

/// Binds a type prefix to a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRule {
    /// Resource type prefix; the bare provider prefix is the fallback.
    pub prefix: String,
    /// Handler to run.
    pub handler: HandlerKind,
}

/// A complete rule table for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRules {
    /// Provider name, e.g. `aws`.
    pub provider: String,
    /// Table version, reported in the graph model.
    pub version: String,
    /// Resource type prefix of the provider, e.g. `aws_`.
    pub prefix: String,
    /// Type prefix of nodes the builder invents, e.g. `tm_aws_`.
    pub synthetic_prefix: String,
    /// Consolidation rules.
    #[serde(default)]
    pub consolidated: Vec<ConsolidationRule>,
    /// Draw-order lists.
    #[serde(default)]
    pub draw_order: DrawOrder,
    /// Variant rules.
    #[serde(default)]
    pub variants: Vec<VariantRule>,
    /// Auto-annotation rules.
    #[serde(default)]
    pub auto_annotations: Vec<AutoAnnotationRule>,
    /// Node id prefixes whose outgoing edges are drawn reversed.
    #[serde(default)]
    pub reverse_arrows: Vec<String>,
    /// Implied connection rules.
    #[serde(default)]
    pub implied_connections: Vec<ImpliedConnectionRule>,
    /// Special handler rules.
    #[serde(default)]
    pub handlers: Vec<HandlerRule>,
    /// Type prefixes that join the shared services group.
    #[serde(default)]
    pub shared_services: Vec<String>,
}

/// Returns the entry with the longest prefix of `key`.
fn longest_prefix<'a, T>(items: &'a [T], key: &str, prefix: impl Fn(&T) -> &str) -> Option<&'a T> {
    items
        .iter()
        .filter(|item| key.starts_with(prefix(*item)))
        .max_by_key(|item| prefix(*item).len())
}

fn starts_with_any(list: &[String], key: &str) -> bool {
    list.iter().any(|prefix| key.starts_with(prefix.as_str()))
}

fn check_unique<'a>(what: &str, keys: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut seen = BTreeSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(TerramapError::rule_config(format!("duplicate {what} {key:?}")));
        }
    }
    Ok(())
}

impl ProviderRules {
    /// Loads the embedded AWS table.
    ///
    /// # Errors
    ///
    /// Returns [`TerramapError::RuleConfig`] if the embedded table is invalid.
    pub fn aws() -> Result<Self> {
        Self::from_yaml_str(AWS_RULES)
    }

    /// Parses and validates a rule table.
    ///
    /// # Errors
    ///
    /// Returns [`TerramapError::RuleConfig`] if the YAML is malformed or
    /// the table fails validation.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let rules: Self = serde_yaml::from_str(text)
            .map_err(|e| TerramapError::rule_config(format!("cannot decode rule table: {e}")))?;
        rules.validate()?;
        tracing::debug!(
            provider = %rules.provider,
            version = %rules.version,
            "loaded rule table"
        );
        Ok(rules)
    }

    /// Reads a rule table from a file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error or [`TerramapError::RuleConfig`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TerramapError::io(path, e))?;
        Self::from_yaml_str(&text).map_err(|e| match e {
            TerramapError::RuleConfig { message } => {
                TerramapError::rule_config(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Checks the table for conflicting or incomplete rules.
    ///
    /// # Errors
    ///
    /// Returns [`TerramapError::RuleConfig`] naming the first offending rule.
    pub fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() || self.prefix.is_empty() {
            return Err(TerramapError::rule_config("provider and prefix are required"));
        }
        if self.synthetic_prefix.is_empty() {
            return Err(TerramapError::rule_config("synthetic_prefix is required"));
        }
        let foreign = |what: &str, prefix: &str| -> Result<()> {
            if prefix.starts_with(self.prefix.as_str()) {
                Ok(())
            } else {
                Err(TerramapError::rule_config(format!(
                    "{what} prefix {prefix:?} does not start with provider prefix {:?}",
                    self.prefix
                )))
            }
        };

        check_unique(
            "consolidation prefix",
            self.consolidated.iter().map(|r| r.prefix.as_str()),
        )?;
        for rule in &self.consolidated {
            foreign("consolidation", &rule.prefix)?;
            if rule.node.split_once('.').is_none_or(|(t, n)| t.is_empty() || n.is_empty()) {
                return Err(TerramapError::rule_config(format!(
                    "consolidated node {:?} is not a type.name id",
                    rule.node
                )));
            }
        }

        check_unique("variant prefix", self.variants.iter().map(|r| r.prefix.as_str()))?;
        for rule in &self.variants {
            foreign("variant", &rule.prefix)?;
            if rule.keywords.is_empty() {
                return Err(TerramapError::rule_config(format!(
                    "variant rule {:?} has no keywords",
                    rule.prefix
                )));
            }
            if let Some(empty) = rule
                .keywords
                .iter()
                .find(|k| k.keyword.is_empty() || k.variant.is_empty())
            {
                return Err(TerramapError::rule_config(format!(
                    "variant rule {:?} has an empty keyword or variant ({:?} -> {:?})",
                    rule.prefix, empty.keyword, empty.variant
                )));
            }
        }

        check_unique(
            "auto-annotation prefix",
            self.auto_annotations.iter().map(|r| r.prefix.as_str()),
        )?;
        for rule in &self.auto_annotations {
            foreign("auto-annotation", &rule.prefix)?;
            if rule.targets.is_empty() || rule.targets.iter().any(String::is_empty) {
                return Err(TerramapError::rule_config(format!(
                    "auto-annotation rule {:?} has an empty target",
                    rule.prefix
                )));
            }
        }

        check_unique(
            "implied connection attribute",
            self.implied_connections.iter().map(|r| r.attribute.as_str()),
        )?;
        for rule in &self.implied_connections {
            if rule.attribute.is_empty() {
                return Err(TerramapError::rule_config("implied connection with empty attribute"));
            }
            foreign("implied connection target", &rule.target)?;
        }

        check_unique("handler prefix", self.handlers.iter().map(|r| r.prefix.as_str()))?;
        for rule in &self.handlers {
            foreign("handler", &rule.prefix)?;
        }
        Ok(())
    }

    /// Returns the consolidation rule for a resource type.
    #[must_use]
    pub fn consolidation_for(&self, resource_type: &str) -> Option<&ConsolidationRule> {
        longest_prefix(&self.consolidated, resource_type, |r| r.prefix.as_str())
    }

    /// Resolves the variant display type from attribute text.
    #[must_use]
    pub fn variant_for<'a>(&'a self, resource_type: &str, texts: &[&str]) -> Option<&'a str> {
        let rule = longest_prefix(&self.variants, resource_type, |r| r.prefix.as_str())?;
        rule.keywords
            .iter()
            .find(|k| texts.iter().any(|text| text.contains(k.keyword.as_str())))
            .map(|k| k.variant.as_str())
    }

    /// Returns the auto-annotation rule for a node id.
    #[must_use]
    pub fn auto_annotation_for(&self, node_id: &str) -> Option<&AutoAnnotationRule> {
        longest_prefix(&self.auto_annotations, node_id, |r| r.prefix.as_str())
    }

    /// Returns the handler for a resource type.
    #[must_use]
    pub fn handler_for(&self, resource_type: &str) -> Option<HandlerKind> {
        longest_prefix(&self.handlers, resource_type, |r| r.prefix.as_str()).map(|r| r.handler)
    }

    /// Returns `true` if the node id names a group node.
    #[must_use]
    pub fn is_group(&self, node_id: &str) -> bool {
        starts_with_any(&self.draw_order.group, node_id)
    }

    /// Returns `true` if edges leaving this node id are drawn reversed.
    #[must_use]
    pub fn is_reverse(&self, node_id: &str) -> bool {
        starts_with_any(&self.reverse_arrows, node_id)
    }

    /// Returns `true` if the resource type is a shared service.
    #[must_use]
    pub fn is_shared_service(&self, resource_type: &str) -> bool {
        starts_with_any(&self.shared_services, resource_type)
    }

    /// Returns the draw rank of a node id.
    #[must_use]
    pub fn draw_rank(&self, node_id: &str) -> usize {
        let consolidated: Vec<String> = self.consolidated.iter().map(|r| r.prefix.clone()).collect();
        [
            &self.draw_order.outer,
            &self.draw_order.edge,
            &self.draw_order.group,
            &consolidated,
        ]
        .iter()
        .position(|list| starts_with_any(list, node_id))
        .unwrap_or(CATCH_ALL_RANK)
    }

    /// One-line counts of each rule list.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} rules v{}: {} consolidated, {} variants, {} auto-annotations, {} implied, {} handlers, {} groups",
            self.provider,
            self.version,
            self.consolidated.len(),
            self.variants.len(),
            self.auto_annotations.len(),
            self.implied_connections.len(),
            self.handlers.len(),
            self.draw_order.group.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aws() -> ProviderRules {
        ProviderRules::aws().expect("embedded rules")
    }

    #[test]
    fn embedded_aws_table_is_valid() {
        let rules = aws();
        assert_eq!(rules.provider, "aws");
        assert_eq!(rules.consolidated.len(), 11);
        assert_eq!(rules.draw_order.edge.len(), 5);
        assert!(rules.summary().contains("11 consolidated"));
    }

    #[test]
    fn consolidation_uses_longest_prefix() {
        let rules = aws();
        let rule = rules.consolidation_for("aws_route53_zone").expect("rule");
        assert_eq!(rule.node, "aws_route53_record.route_53");
        assert!(rule.edge_service);
        assert!(rules.consolidation_for("aws_instance").is_none());
        assert_eq!(
            rules.consolidation_for("aws_lb_listener").map(|r| r.node.as_str()),
            Some("aws_lb.elb")
        );
    }

    #[test]
    fn variants_pick_first_keyword_found() {
        let rules = aws();
        assert_eq!(rules.variant_for("aws_lb", &["application"]), Some("aws_lb_alb"));
        assert_eq!(
            rules.variant_for("aws_rds_cluster", &["aurora-mysql"]),
            Some("aws_rds_aurora")
        );
        assert_eq!(rules.variant_for("aws_ecs_service", &["fargate"]), None);
        assert_eq!(rules.variant_for("aws_instance", &["application"]), None);
    }

    #[test]
    fn handler_falls_back_to_provider_prefix() {
        let rules = aws();
        assert_eq!(rules.handler_for("aws_subnet"), Some(HandlerKind::SubnetAzs));
        assert_eq!(
            rules.handler_for("aws_security_group_rule"),
            Some(HandlerKind::SecurityGroup)
        );
        assert_eq!(rules.handler_for("aws_instance"), Some(HandlerKind::SharedGroup));
        assert_eq!(rules.handler_for("google_compute_instance"), None);
    }

    #[test]
    fn draw_rank_follows_list_order() {
        let rules = aws();
        assert_eq!(rules.draw_rank("tm_aws_users.users"), 0);
        assert_eq!(rules.draw_rank("aws_route53_record.route_53"), 1);
        assert_eq!(rules.draw_rank("aws_vpc.main"), 2);
        assert_eq!(rules.draw_rank("aws_ecs_service.ecs"), 3);
        assert_eq!(rules.draw_rank("aws_instance.web"), CATCH_ALL_RANK);
    }

    #[test]
    fn group_and_reverse_lookups() {
        let rules = aws();
        assert!(rules.is_group("aws_subnet.public"));
        assert!(!rules.is_group("aws_instance.web"));
        assert!(rules.is_reverse("aws_lb.elb"));
        assert!(rules.is_reverse("aws_vpc.main"));
        assert!(!rules.is_reverse("aws_vpc_endpoint_x"));
        assert!(rules.is_shared_service("aws_kms_key"));
    }

    #[test]
    fn legacy_tags_are_accepted() {
        let rules = ProviderRules::from_yaml_str(
            r"
provider: aws
version: legacy
prefix: aws_
synthetic_prefix: tv_aws_
consolidated:
  - prefix: aws_acm
    node: aws_acm_certificate.acm
    import_location: resource_classes.aws.security
handlers:
  - prefix: aws_
    handler: aws_handle_sharedgroup
auto_annotations:
  - prefix: aws_route53
    link: [tv_aws_users.users]
    arrow: reverse
",
        )
        .expect("legacy table");
        assert_eq!(
            rules.consolidated[0].category.as_deref(),
            Some("resource_classes.aws.security")
        );
        assert_eq!(rules.handlers[0].handler, HandlerKind::SharedGroup);
        assert_eq!(rules.auto_annotations[0].arrow, Arrow::Reverse);
    }

    fn table(body: &str) -> String {
        format!("provider: aws\nversion: t\nprefix: aws_\nsynthetic_prefix: tm_aws_\n{body}")
    }

    #[test]
    fn duplicate_prefixes_are_rejected() {
        let err = ProviderRules::from_yaml_str(&table(
            "consolidated:\n  - prefix: aws_lb\n    node: aws_lb.a\n  - prefix: aws_lb\n    node: aws_lb.b\n",
        ))
        .unwrap_err();
        assert!(matches!(err, TerramapError::RuleConfig { .. }));
        assert!(err.to_string().contains("aws_lb"), "got: {err}");
    }

    #[test]
    fn empty_keywords_are_rejected() {
        let err = ProviderRules::from_yaml_str(&table(
            "variants:\n  - prefix: aws_lb\n    keywords:\n      - keyword: \"\"\n        variant: aws_lb_alb\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("empty keyword"), "got: {err}");
    }

    #[test]
    fn duplicate_implied_attributes_are_rejected() {
        let err = ProviderRules::from_yaml_str(&table(
            "implied_connections:\n  - attribute: certificate_arn\n    target: aws_acm_certificate\n  - attribute: certificate_arn\n    target: aws_acm_x\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("certificate_arn"), "got: {err}");
    }

    #[test]
    fn foreign_prefixes_are_rejected() {
        let err = ProviderRules::from_yaml_str(&table(
            "handlers:\n  - prefix: google_\n    handler: shared_group\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("google_"), "got: {err}");
    }

    #[test]
    fn rule_file_errors_name_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "provider: [").expect("write");
        let err = ProviderRules::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.yaml"), "got: {err}");
    }
}
