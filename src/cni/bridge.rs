//! Bridge CNI plugin writer
//!
//! Emits a single-range host-local config with the bridge acting as the
//! default gateway, and manages the inter-node pod routes.

use tracing::info;

use super::{RouteOp, do_route_ops_on_nodes};
use crate::config::{Config, Node};
use crate::drivers::Context;
use crate::error::Result;
use crate::net::build_pod_subnet_prefix;

/// Name of the bridge the plugin creates on first pod start
pub const BRIDGE_NAME: &str = "br0";

/// Render the bridge CNI config for this node
pub fn config_contents(node: &Node, cfg: &Config) -> String {
    let info = &cfg.pod_net.info[0];
    let (prefix, suffix) = build_pod_subnet_prefix(info.mode, &info.prefix, info.size, node.id);
    format!(
        r#"{{
    "cniVersion": "0.3.1",
    "name": "dindnet",
    "type": "bridge",
    "bridge": "{BRIDGE_NAME}",
    "isDefaultGateway": true,
    "ipMasq": true,
    "hairpinMode": true,
    "ipam": {{
        "type": "host-local",
        "ranges": [
          [
            {{
              "subnet": "{prefix}{suffix}/{size}",
              "gateway": "{prefix}1"
            }}
          ]
        ]
    }}
}}
"#,
        size = info.size,
    )
}

/// Install routes to every peer's pod subnet and align the bridge MTU
pub async fn setup(node: &Node, cfg: &Config, ctx: &Context) -> Result<()> {
    do_route_ops_on_nodes(node, cfg, ctx, RouteOp::Add).await?;
    // The bridge only exists once the first pod ran; absence is fine here
    match ctx.net.set_link_mtu(BRIDGE_NAME, cfg.pod_net.mtu).await {
        Ok(()) => {}
        Err(e) if e.is_skippable() => {
            info!("skipping MTU update, {BRIDGE_NAME} not created yet");
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

/// Remove the peer routes and tear the bridge down
pub async fn cleanup(node: &Node, cfg: &Config, ctx: &Context) -> Result<()> {
    do_route_ops_on_nodes(node, cfg, ctx, RouteOp::Delete).await?;
    ctx.net.remove_bridge(BRIDGE_NAME).await
}
