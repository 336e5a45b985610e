//! Special handlers for resource types that need more than reference edges.

use crate::builder::GraphState;
use crate::declarations::Declaration;
use crate::model::EdgeOrigin;
use crate::references::unscoped;
use crate::rules::HandlerKind;

/// Runs the handler bound to a declaration's type, if any.
pub(crate) fn apply(state: &mut GraphState<'_>, decl: &Declaration<'_>, all: &[Declaration<'_>]) {
    let Some(kind) = state.rules().handler_for(&decl.resource_type) else {
        return;
    };
    let Some(node) = state.node_for(&decl.address) else {
        return;
    };
    tracing::trace!(address = %decl.address, handler = ?kind, "running handler");
    match kind {
        HandlerKind::Cloudfront => cloudfront(state, decl, &node),
        HandlerKind::SubnetAzs => subnet_azs(state, decl, &node),
        HandlerKind::Autoscaling => autoscaling(state, decl, &node),
        HandlerKind::Efs => efs(state, &node, all),
        HandlerKind::SecurityGroup => security_group(state, decl, &node),
        HandlerKind::SharedGroup => shared_group(state, &node),
    }
}

/// Every origin of a distribution is connected to it.
fn cloudfront(state: &mut GraphState<'_>, decl: &Declaration<'_>, node: &str) {
    for target in state.references_in(decl, "origin") {
        state.connect(node, &target, EdgeOrigin::Handler);
    }
}

/// Turns an availability zone value into an id-safe key.
fn zone_key(zone: &str) -> String {
    let mut key = String::with_capacity(zone.len());
    for c in zone.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            key.push(c);
        } else if !key.ends_with('_') {
            key.push('_');
        }
    }
    key.trim_matches('_').to_string()
}

/// Subnets are placed inside a zone group, which takes over the subnet's
/// VPC membership.
fn subnet_azs(state: &mut GraphState<'_>, decl: &Declaration<'_>, node: &str) {
    let zone = decl
        .block
        .string_attribute("availability_zone")
        .or_else(|| decl.block.string_attribute("availability_zone_id"))
        .map(zone_key)
        .filter(|key| !key.is_empty());
    let Some(zone) = zone else {
        tracing::debug!(subnet = node, "subnet has no availability zone");
        return;
    };

    let az = format!("{}az.{zone}", state.rules().prefix);
    state.synthetic(&az);
    let vpc = format!("{}vpc.", state.rules().prefix);
    for group in state.groups_of(node) {
        if unscoped(&group).starts_with(&vpc) {
            state.leave(node, &group);
            state.join(&az, &group);
        }
    }
    state.join(node, &az);
}

/// Scaled resources join their scaling target.
fn autoscaling(state: &mut GraphState<'_>, decl: &Declaration<'_>, node: &str) {
    for attribute in HandlerKind::Autoscaling.owned_attributes() {
        for member in state.references_in(decl, attribute) {
            state.join(&member, node);
        }
    }
}

/// Mount targets and access points of a file system fold into it.
fn efs(state: &mut GraphState<'_>, node: &str, all: &[Declaration<'_>]) {
    let prefix = state.rules().prefix.clone();
    let parts = [format!("{prefix}efs_mount_target"), format!("{prefix}efs_access_point")];
    for other in all {
        if !parts.iter().any(|p| other.resource_type.starts_with(p.as_str())) {
            continue;
        }
        if !state.references_in(other, "file_system_id").iter().any(|id| id == node) {
            continue;
        }
        if let Some(part) = state.node_for(&other.address) {
            state.fold(&part, node);
        }
    }
}

/// Security group rules become edges between groups; inline ingress and
/// egress blocks do the same for the declaring group.
fn security_group(state: &mut GraphState<'_>, decl: &Declaration<'_>, node: &str) {
    let prefix = state.rules().prefix.clone();
    let group_type = format!("{prefix}security_group");

    if decl.resource_type == format!("{group_type}_rule") {
        let Some(group) = state.references_in(decl, "security_group_id").into_iter().next() else {
            tracing::debug!(rule = node, "security group rule without a group");
            return;
        };
        let egress = decl.block.string_attribute("type") == Some("egress");
        for peer in state.references_in(decl, "source_security_group_id") {
            if egress {
                state.connect(&group, &peer, EdgeOrigin::Handler);
            } else {
                state.connect(&peer, &group, EdgeOrigin::Handler);
            }
        }
        state.fold(node, &group);
        return;
    }

    let is_group = |state: &GraphState<'_>, id: &str| {
        state
            .node(id)
            .is_some_and(|n| n.base_type == group_type && n.id != node)
    };
    for peer in state.references_in(decl, "ingress") {
        if is_group(state, &peer) {
            state.connect(&peer, node, EdgeOrigin::Handler);
        }
    }
    for peer in state.references_in(decl, "egress") {
        if is_group(state, &peer) {
            state.connect(node, &peer, EdgeOrigin::Handler);
        }
    }
}

/// Shared services join the shared services group.
fn shared_group(state: &mut GraphState<'_>, node: &str) {
    let Some(base_type) = state.node(node).map(|n| n.base_type.clone()) else {
        return;
    };
    if !state.rules().is_shared_service(&base_type) {
        return;
    }
    let group = format!("{}group.shared_services", state.rules().prefix);
    state.synthetic(&group);
    state.join(node, &group);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_keys_are_id_safe() {
        assert_eq!(zone_key("us-east-1a"), "us-east-1a");
        assert_eq!(zone_key("${data.zones.names[0]}"), "data_zones_names_0");
        assert_eq!(zone_key("  "), "");
    }
}
