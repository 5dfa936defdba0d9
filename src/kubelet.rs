//! Kubelet systemd drop-in
//!
//! Points the kubelet's cluster DNS at the DNS64 resolver so pods get
//! synthesized AAAA answers.

use tracing::info;

use crate::config::Config;
use crate::drivers::Context;
use crate::error::Result;
use crate::store;

pub fn dropin_contents(cfg: &Config) -> String {
    format!(
        "[Service]\nEnvironment=\"KUBELET_DNS_ARGS=--cluster-dns={} --cluster-domain=cluster.local\"\n",
        cfg.dns64.ip
    )
}

/// Install the drop-in under the kubelet service directory
pub async fn write_dropin(cfg: &Config, ctx: &Context) -> Result<()> {
    store::ensure_dir(&ctx.paths.kubelet_dropin_dir, 0o755).await?;
    store::write_file(ctx.paths.kubelet_dropin(), &dropin_contents(cfg), 0o755).await?;
    info!("created kubelet drop-in for DNS64 resolver");
    Ok(())
}

/// Remove the drop-in, tolerating its absence
pub async fn remove_dropin(ctx: &Context) -> Result<()> {
    store::remove_file_if_present(ctx.paths.kubelet_dropin()).await
}
