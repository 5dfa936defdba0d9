//! CNI plugin config writers and inter-node pod routing
//!
//! Two real writers (`bridge`, `ptp`) share the same surface; `calico`
//! and `none` succeed without doing anything, for operators who wire up
//! pod networking themselves.

pub mod bridge;
pub mod ptp;

use tracing::info;

use crate::config::{Config, Node, Plugin};
use crate::drivers::Context;
use crate::error::{Error, Result};
use crate::net::{build_gateway_ip, build_pod_subnet_prefix, parse_cidr, parse_ip};

/// Direction of an inter-node route pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOp {
    Add,
    Delete,
}

impl Plugin {
    /// File name of the generated CNI config, if this plugin writes one
    pub fn config_file_name(&self) -> Option<&'static str> {
        match self {
            Plugin::Bridge => Some("cni.conf"),
            Plugin::Ptp => Some("dindnet.conf"),
            Plugin::Calico | Plugin::None => None,
        }
    }

    /// Render the CNI config for this node, if the plugin writes one
    pub fn write_config(&self, node: &Node, cfg: &Config) -> Option<String> {
        match self {
            Plugin::Bridge => Some(bridge::config_contents(node, cfg)),
            Plugin::Ptp => Some(ptp::config_contents(node, cfg)),
            Plugin::Calico | Plugin::None => None,
        }
    }

    /// Host-side setup beyond the config file (inter-node routes)
    pub async fn setup(&self, node: &Node, cfg: &Config, ctx: &Context) -> Result<()> {
        match self {
            Plugin::Bridge => bridge::setup(node, cfg, ctx).await,
            Plugin::Ptp => ptp::setup(node, cfg, ctx).await,
            Plugin::Calico | Plugin::None => Ok(()),
        }
    }

    /// Inverse of [`setup`](Self::setup)
    pub async fn cleanup(&self, node: &Node, cfg: &Config, ctx: &Context) -> Result<()> {
        match self {
            Plugin::Bridge => bridge::cleanup(node, cfg, ctx).await,
            Plugin::Ptp => ptp::cleanup(node, cfg, ctx).await,
            Plugin::Calico | Plugin::None => Ok(()),
        }
    }
}

/// Install or remove routes from this host to every peer's pod subnet,
/// via the peer's management address on the matching family.
///
/// AlreadyExists on add and NotFound on delete are reported as skipped;
/// any other failure aborts mid-list (earlier routes stay in place and
/// are idempotent under retry).
pub async fn do_route_ops_on_nodes(
    node: &Node,
    cfg: &Config,
    ctx: &Context,
    op: RouteOp,
) -> Result<()> {
    for peer in cfg.topology.values() {
        if peer.id == node.id || !peer.is_cluster_member() {
            continue;
        }
        for pod_info in &cfg.pod_net.info {
            let mgmt_info = cfg.mgmt_info(pod_info.mode).ok_or_else(|| {
                Error::config(format!(
                    "no {} management plane for the {} pod plane",
                    pod_info.mode, pod_info.mode
                ))
            })?;
            let (prefix, suffix) =
                build_pod_subnet_prefix(pod_info.mode, &pod_info.prefix, pod_info.size, peer.id);
            let dest = parse_cidr(&format!("{prefix}{suffix}/{}", pod_info.size))?;
            let gw = parse_ip(&build_gateway_ip(&mgmt_info.prefix, peer.id))?;
            let result = match op {
                RouteOp::Add => ctx.net.add_route_by_intf(dest, gw, &node.interface).await,
                RouteOp::Delete => {
                    ctx.net
                        .delete_route_by_intf(dest, gw, &node.interface)
                        .await
                }
            };
            match result {
                Ok(()) => {
                    info!("{op:?} route to {dest} via {gw} for node {}", peer.name);
                }
                Err(e) if e.is_skippable() => {
                    info!("skipping route to {dest} for node {}: {e}", peer.name);
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validate::validate;
    use crate::drivers::mock::mock_context;
    use crate::paths::Paths;

    fn dual_stack_cfg() -> Config {
        let yaml = r#"
plugin: ptp
general:
  mode: dual-stack
topology:
  my-master:
    interface: eth0
    id: 10
    opmodes: "master"
  my-minion:
    interface: eth1
    id: 20
    opmodes: "minion"
mgmt_net:
  cidr: "fd00:100::/64"
  cidr2: "10.192.0.0/16"
pod_net:
  prefix: "fd00:40:0:0:"
  size: 80
  cidr2: "10.244.0.0/24"
service_net:
  cidr: "fd00:30::/110"
token: "56cdce.7b18ad347f3de81c"
token-cert-hash: "3f40043b6a6fb5675b84b3fe3ab18fe9e10d6fdeadf5497c12a52dfba4fc0252"
"#;
        let mut cfg = Config::from_yaml(yaml).unwrap();
        validate(&mut cfg, "my-master", true).unwrap();
        cfg
    }

    #[tokio::test]
    async fn test_routes_to_peers_both_families() {
        let cfg = dual_stack_cfg();
        let (ctx, mocks) = mock_context(Paths::new());
        let master = cfg.topology.get("my-master").unwrap();

        do_route_ops_on_nodes(master, &cfg, &ctx, RouteOp::Add)
            .await
            .unwrap();

        let calls = mocks.net.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            "route add fd00:40:0:0:14::/80 via fd00:100::20 dev eth0"
        );
        assert_eq!(calls[1], "route add 10.244.20.0/24 via 10.192.0.20 dev eth0");
    }

    #[tokio::test]
    async fn test_add_absorbs_already_exists() {
        let cfg = dual_stack_cfg();
        let (ctx, mocks) = mock_context(Paths::new());
        mocks.net.seed_route("fd00:40:0:0:14::/80");
        let master = cfg.topology.get("my-master").unwrap();

        do_route_ops_on_nodes(master, &cfg, &ctx, RouteOp::Add)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_absorbs_not_found() {
        let cfg = dual_stack_cfg();
        let (ctx, _mocks) = mock_context(Paths::new());
        let master = cfg.topology.get("my-master").unwrap();

        // Nothing was ever added; every delete reports NotFound and the
        // pass still succeeds.
        do_route_ops_on_nodes(master, &cfg, &ctx, RouteOp::Delete)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_result_independent_of_preexistence() {
        let cfg = dual_stack_cfg();
        let master = cfg.topology.get("my-master").unwrap();

        let (ctx, mocks) = mock_context(Paths::new());
        mocks.net.seed_route("fd00:40:0:0:14::/80");
        mocks.net.seed_route("10.244.20.0/24");
        let with_routes = do_route_ops_on_nodes(master, &cfg, &ctx, RouteOp::Delete).await;

        let (ctx, _mocks) = mock_context(Paths::new());
        let without_routes = do_route_ops_on_nodes(master, &cfg, &ctx, RouteOp::Delete).await;

        assert!(with_routes.is_ok() && without_routes.is_ok());
    }
}
