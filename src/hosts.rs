//! /etc/hosts transformer
//!
//! Cluster members must resolve each other by their management-network
//! addresses, so existing entries for topology names are commented out
//! with a sentinel and fresh entries appended with another. The two
//! sentinels make the edit invertible without keeping the backup around.

use tracing::info;

use crate::config::Config;
use crate::drivers::Context;
use crate::error::Result;
use crate::store::{self, ADDED_MARKER, DISABLED_MARKER};

/// Annotate hosts-file contents for the cluster topology.
///
/// Lines previously added by the tool are dropped first, so applying the
/// transform twice yields the same file.
pub fn annotate(contents: &str, cfg: &Config) -> Result<String> {
    let mut out = String::with_capacity(contents.len());
    for line in contents.lines() {
        if line.contains(ADDED_MARKER) {
            continue;
        }
        let already_disabled = line.starts_with(DISABLED_MARKER);
        // Only v4 mappings of topology names are superseded; v6 lines
        // (including our own re-applied entries) stay as they are
        let mut tokens = line.split_whitespace();
        let maps_node_to_v4 = tokens
            .next()
            .is_some_and(|addr| addr.parse::<std::net::Ipv4Addr>().is_ok())
            && tokens.any(|tok| cfg.topology.contains_key(tok));
        if maps_node_to_v4 && !already_disabled {
            out.push_str(DISABLED_MARKER);
        }
        out.push_str(line);
        out.push('\n');
    }
    for (name, node) in &cfg.topology {
        if !node.is_cluster_member() {
            continue;
        }
        let address = cfg.management_address(node)?;
        out.push_str(&format!("{address} {name}  {ADDED_MARKER}\n"));
    }
    Ok(out)
}

/// Rewrite the hosts file with annotated cluster entries
pub async fn update_hosts(cfg: &Config, ctx: &Context) -> Result<()> {
    let contents = store::read(&ctx.paths.etc_hosts).await?;
    let annotated = annotate(&contents, cfg)?;
    store::write_with_backup(&annotated, &ctx.paths.etc_hosts, &ctx.paths.etc_hosts_backup())
        .await?;
    info!("updated {}", ctx.paths.etc_hosts.display());
    Ok(())
}

/// Undo the annotated edit in place
pub async fn revert_hosts(ctx: &Context) -> Result<()> {
    let contents = store::read(&ctx.paths.etc_hosts).await?;
    let reverted = store::annotated_revert(&contents);
    store::write_with_backup(&reverted, &ctx.paths.etc_hosts, &ctx.paths.etc_hosts_backup())
        .await?;
    info!("reverted {}", ctx.paths.etc_hosts.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validate::validate;

    fn two_node_cfg() -> Config {
        let yaml = r#"
plugin: bridge
general:
  mode: ipv6
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
pod_net:
  prefix: "fd00:40:0:0:"
  size: 80
service_net:
  cidr: "fd00:30::/110"
token: "56cdce.7b18ad347f3de81c"
token-cert-hash: "3f40043b6a6fb5675b84b3fe3ab18fe9e10d6fdeadf5497c12a52dfba4fc0252"
"#;
        let mut cfg = Config::from_yaml(yaml).unwrap();
        validate(&mut cfg, "my-master", true).unwrap();
        cfg
    }

    const ORIGINAL: &str = concat!(
        "127.0.0.1 localhost\n",
        "10.0.0.5 my-master\n",
        "10.0.0.6 my-minion extra-alias\n",
        "::1 ip6-localhost\n",
    );

    #[test]
    fn test_annotate_disables_and_appends() {
        let cfg = two_node_cfg();
        let annotated = annotate(ORIGINAL, &cfg).unwrap();
        let expected = concat!(
            "127.0.0.1 localhost\n",
            "#[-] 10.0.0.5 my-master\n",
            "#[-] 10.0.0.6 my-minion extra-alias\n",
            "::1 ip6-localhost\n",
            "fd00:100::10 my-master  #[+]\n",
            "fd00:100::20 my-minion  #[+]\n",
        );
        assert_eq!(annotated, expected);
    }

    #[test]
    fn test_annotate_leaves_v6_mappings_alone() {
        let cfg = two_node_cfg();
        let input = concat!(
            "fd00:99::5 my-master\n",
            "10.0.0.5 my-master\n",
            "# 10.0.0.9 my-master in a comment\n",
        );
        let annotated = annotate(input, &cfg).unwrap();
        assert!(annotated.contains("\nfd00:99::5 my-master\n") || annotated.starts_with("fd00:99::5 my-master\n"));
        assert!(annotated.contains("#[-] 10.0.0.5 my-master\n"));
        assert!(annotated.contains("# 10.0.0.9 my-master in a comment\n"));
        assert!(!annotated.contains("#[-] fd00:99::5"));
        assert!(!annotated.contains("#[-] # 10.0.0.9"));
    }

    #[test]
    fn test_annotate_is_idempotent() {
        let cfg = two_node_cfg();
        let once = annotate(ORIGINAL, &cfg).unwrap();
        let twice = annotate(&once, &cfg).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_revert_restores_original() {
        let cfg = two_node_cfg();
        let annotated = annotate(ORIGINAL, &cfg).unwrap();
        assert_eq!(store::annotated_revert(&annotated), ORIGINAL);
    }
}
