//! `up`: write the CNI config and run kubeadm

use tracing::info;

use crate::config::{Config, Node};
use crate::drivers::Context;
use crate::error::Result;
use crate::{kubeadm, store};

/// Bring the node into the cluster: fresh CNI config area, plugin config
/// and routes, then `kubeadm init` on the master or `kubeadm join` on a
/// worker.
pub async fn run(cfg: &Config, node: &Node, ctx: &Context) -> Result<()> {
    store::recreate_dir(&ctx.paths.cni_area, 0o755).await?;
    if let (Some(name), Some(contents)) = (
        cfg.plugin.config_file_name(),
        cfg.plugin.write_config(node, cfg),
    ) {
        store::write_file(ctx.paths.cni_area.join(name), &contents, 0o644).await?;
        info!("wrote CNI config {name}");
    }
    cfg.plugin.setup(node, cfg, ctx).await?;

    let args = if node.is_master {
        let conf = kubeadm::config_contents(cfg, node)?;
        store::write_file(&ctx.paths.kubeadm_conf, &conf, 0o644).await?;
        kubeadm::init_args(&ctx.paths.kubeadm_conf)
    } else if node.is_minion {
        kubeadm::join_args(cfg)?
    } else {
        info!("node {} is not a cluster member, skipping kubeadm", node.name);
        return Ok(());
    };
    let argv: Vec<&str> = args.iter().map(String::as_str).collect();
    let output = ctx.runner.run("kubeadm", &argv).await?;
    info!("kubeadm {} completed:\n{output}", argv[0]);
    info!("node {} is up", node.name);
    Ok(())
}
