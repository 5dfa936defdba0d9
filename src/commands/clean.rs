//! `clean`: undo `prepare`, best effort

use tracing::info;

use super::demote;
use crate::config::{Config, Node};
use crate::drivers::Context;
use crate::error::Result;
use crate::net::parse_cidr;
use crate::{hosts, kubelet, support};

/// Remove everything `prepare` staged: drop-in, management addresses,
/// hosts entries, DNS64/NAT64 containers and their network. Every step
/// is attempted; failures become warnings.
pub async fn run(cfg: &Config, node: &Node, ctx: &Context) -> Result<()> {
    demote("remove kubelet drop-in", kubelet::remove_dropin(ctx).await);

    // Remove whatever addresses of the management plane actually sit on
    // the interface, not just the one the config computes; re-runs then
    // find nothing and stay quiet.
    for mgmt in &cfg.mgmt_net.info {
        let plane = match parse_cidr(&format!("{}0/{}", mgmt.prefix, mgmt.size)) {
            Ok(p) => p,
            Err(e) => {
                demote("parse management plane", Err(e));
                continue;
            }
        };
        match ctx.net.addr_list(&node.interface, mgmt.mode).await {
            Ok(addrs) => {
                for addr in addrs.into_iter().filter(|a| plane.contains(a.ip())) {
                    demote(
                        "remove management address",
                        ctx.net.remove_address(addr, &node.interface).await,
                    );
                }
            }
            Err(e) => demote("list interface addresses", Err(e)),
        }
    }

    demote("revert /etc/hosts", hosts::revert_hosts(ctx).await);

    if node.is_dns64_server {
        demote("remove DNS64 container", support::remove_dns64(ctx).await);
    }
    if node.is_nat64_server {
        demote("remove NAT64 container", support::remove_nat64(cfg, ctx).await);
    }
    if node.is_dns64_server || node.is_nat64_server {
        demote(
            "remove support network",
            support::remove_support_network(ctx).await,
        );
    }

    info!("node {} cleaned", node.name);
    Ok(())
}
