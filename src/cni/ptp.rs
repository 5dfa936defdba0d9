//! Point-to-point CNI plugin writer
//!
//! Emits an MTU-carrying config whose ipam block holds one range per
//! address family plus the matching default routes, so it covers v4-only,
//! v6-only, and dual-stack pods.

use std::fmt::Write as _;

use super::{RouteOp, do_route_ops_on_nodes};
use crate::config::{AddressMode, Config, Node};
use crate::drivers::Context;
use crate::error::Result;
use crate::net::build_pod_subnet_prefix;

/// Render the ptp CNI config for this node
pub fn config_contents(node: &Node, cfg: &Config) -> String {
    let mut ranges = String::new();
    let mut routes = String::new();
    let last = cfg.pod_net.info.len() - 1;
    for (i, info) in cfg.pod_net.info.iter().enumerate() {
        let (prefix, suffix) =
            build_pod_subnet_prefix(info.mode, &info.prefix, info.size, node.id);
        let comma = if i < last { "," } else { "" };
        let _ = write!(
            ranges,
            r#"      [
        {{
          "subnet": "{prefix}{suffix}/{size}",
          "gateway": "{prefix}1"
        }}
      ]{comma}
"#,
            size = info.size,
        );
        let default_route = match info.mode {
            AddressMode::Ipv4 => "0.0.0.0/0",
            AddressMode::Ipv6 => "::/0",
        };
        let _ = write!(routes, "      {{\"dst\": \"{default_route}\"}}{comma}\n");
    }
    format!(
        r#"{{
  "cniVersion": "0.3.1",
  "name": "dindnet",
  "type": "ptp",
  "mtu": {mtu},
  "ipam": {{
    "type": "host-local",
    "ranges": [
{ranges}    ],
    "routes": [
{routes}    ]
  }}
}}
"#,
        mtu = cfg.pod_net.mtu,
    )
}

/// Install routes to every peer's pod subnet
pub async fn setup(node: &Node, cfg: &Config, ctx: &Context) -> Result<()> {
    do_route_ops_on_nodes(node, cfg, ctx, RouteOp::Add).await
}

/// Remove the peer routes
pub async fn cleanup(node: &Node, cfg: &Config, ctx: &Context) -> Result<()> {
    do_route_ops_on_nodes(node, cfg, ctx, RouteOp::Delete).await
}
