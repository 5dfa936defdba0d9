//! lazyjack library
//!
//! Provisions a per-host slice of an IPv6-first Kubernetes lab cluster:
//! validates a shared topology config, figures out which roles this host
//! plays, and executes the verb-specific side effects (addresses, routes,
//! CNI configs, kubeadm bootstrap, DNS64/NAT64 containers).
//!
//! # Design Principles
//!
//! - **Safety First**: No unsafe code
//! - **Idempotent**: every verb can be re-run after a partial failure
//! - **Best-effort teardown**: `down` and `clean` warn and continue

pub mod bootstrap;
pub mod cni;
pub mod commands;
pub mod config;
pub mod drivers;
pub mod hosts;
pub mod kubeadm;
pub mod kubelet;
pub mod net;
pub mod paths;
pub mod store;
pub mod support;

mod error;

pub use error::{Error, Result};

use std::path::Path;

use tracing::info;

use config::Config;
use drivers::Context;

/// Cluster lifecycle verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Generate bootstrap token and CA hash, fold them into the config
    Init,
    /// Stage the host: addresses, /etc/hosts, kubelet drop-in, DNS64/NAT64
    Prepare,
    /// Write CNI config, install routes, run kubeadm init/join
    Up,
    /// Undo `up`
    Down,
    /// Undo `prepare`
    Clean,
}

impl Verb {
    /// Parse a verb name, case-insensitively
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "init" => Ok(Verb::Init),
            "prepare" => Ok(Verb::Prepare),
            "up" => Ok(Verb::Up),
            "down" => Ok(Verb::Down),
            "clean" => Ok(Verb::Clean),
            other => Err(Error::Unsupported(other.to_string())),
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verb::Init => write!(f, "init"),
            Verb::Prepare => write!(f, "prepare"),
            Verb::Up => write!(f, "up"),
            Verb::Down => write!(f, "down"),
            Verb::Clean => write!(f, "clean"),
        }
    }
}

/// Load and validate the config, then dispatch `verb` for `host`
pub async fn run(verb: Verb, config_path: &Path, host: &str) -> Result<()> {
    let contents = store::read(config_path).await?;
    let mut cfg = Config::from_yaml(&contents)?;
    config::validate::validate(&mut cfg, host, verb != Verb::Init)?;
    info!("{verb} for host {host}");

    let ctx = Context::new_system()?;
    run_with_context(verb, &cfg, host, &ctx, config_path).await
}

/// Same as [`run`] with injected collaborators, for tests
pub async fn run_with_context(
    verb: Verb,
    cfg: &Config,
    host: &str,
    ctx: &Context,
    config_path: &Path,
) -> Result<()> {
    let node = config::validate::node_for_host(cfg, host)?;
    match verb {
        Verb::Init => commands::init::run(cfg, node, ctx, config_path).await,
        Verb::Prepare => commands::prepare::run(cfg, node, ctx).await,
        Verb::Up => commands::up::run(cfg, node, ctx).await,
        Verb::Down => commands::down::run(cfg, node, ctx).await,
        Verb::Clean => commands::clean::run(cfg, node, ctx).await,
    }
}
