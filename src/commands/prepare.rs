//! `prepare`: stage the host for cluster bring-up

use tracing::info;

use crate::config::{Config, Node};
use crate::drivers::Context;
use crate::error::Result;
use crate::net::{build_node_cidr, parse_cidr};
use crate::{hosts, kubelet, support};

/// Assign management addresses, rewrite /etc/hosts, install the kubelet
/// drop-in, and bring up the DNS64/NAT64 containers where this host
/// serves those roles.
pub async fn run(cfg: &Config, node: &Node, ctx: &Context) -> Result<()> {
    for mgmt in &cfg.mgmt_net.info {
        let addr = parse_cidr(&build_node_cidr(mgmt, node.id))?;
        ctx.net.add_address(addr, &node.interface).await?;
        info!("assigned {addr} to {}", node.interface);
    }

    hosts::update_hosts(cfg, ctx).await?;

    if cfg.topology.values().any(|n| n.is_dns64_server) {
        kubelet::write_dropin(cfg, ctx).await?;
    }

    if node.is_dns64_server {
        support::prepare_dns64(cfg, ctx).await?;
    }
    if node.is_nat64_server {
        support::prepare_nat64(cfg, ctx).await?;
    }

    info!("node {} prepared", node.name);
    Ok(())
}
