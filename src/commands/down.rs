//! `down`: undo `up`, best effort

use tracing::info;

use super::demote;
use crate::config::{Config, Node};
use crate::drivers::Context;
use crate::error::Result;

/// Remove the plugin's routes and the CNI config area. Resetting
/// Kubernetes itself (`kubeadm reset`) is left to the operator.
pub async fn run(cfg: &Config, node: &Node, ctx: &Context) -> Result<()> {
    demote("clean up CNI plugin", cfg.plugin.cleanup(node, cfg, ctx).await);

    if let Some(name) = cfg.plugin.config_file_name() {
        demote(
            "remove CNI config file",
            crate::store::remove_file_if_present(ctx.paths.cni_area.join(name)).await,
        );
    }
    if let Err(e) = tokio::fs::remove_dir_all(&ctx.paths.cni_area).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            demote("remove CNI config area", Err(e.into()));
        }
    }

    info!("node {} is down; run 'kubeadm reset' to tear down Kubernetes", node.name);
    Ok(())
}
