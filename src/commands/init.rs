//! `init`: produce the shared bootstrap credentials

use std::path::Path;

use tracing::info;

use crate::bootstrap;
use crate::config::{Config, Node};
use crate::drivers::Context;
use crate::error::Result;

/// Run the credential pipeline on the control-plane host. Any other host
/// has nothing to do; the operator copies the rewritten config around.
pub async fn run(cfg: &Config, node: &Node, ctx: &Context, config_path: &Path) -> Result<()> {
    if !node.is_master {
        info!("skipping init on {}, not the control-plane node", node.name);
        return Ok(());
    }
    bootstrap::setup_bootstrap(cfg, node, ctx, config_path).await?;
    info!("node {} initialized", node.name);
    Ok(())
}
