//! kubeadm collaboration surface
//!
//! Renders the master's kubeadm config file and synthesizes the argv for
//! `kubeadm init` / `kubeadm join`. The insecure API bindings are
//! reproduced from the legacy behavior and only emitted when the
//! operator opts in.

use std::fmt::Write as _;

use crate::config::{Config, Node};
use crate::error::Result;

/// Render the kubeadm configuration used by `kubeadm init` on the master
pub fn config_contents(cfg: &Config, node: &Node) -> Result<String> {
    let advertise = cfg.management_address(node)?;
    let mut out = String::new();
    out.push_str("apiVersion: kubeadm.k8s.io/v1alpha1\n");
    out.push_str("kind: MasterConfiguration\n");
    if !cfg.general.kubernetes_version.is_empty() {
        let _ = writeln!(out, "kubernetesVersion: {}", cfg.general.kubernetes_version);
    }
    let _ = writeln!(out, "api:");
    let _ = writeln!(out, "  advertiseAddress: \"{advertise}\"");
    let _ = writeln!(out, "networking:");
    let _ = writeln!(out, "  serviceSubnet: \"{}\"", cfg.service_net.cidr);
    let _ = writeln!(out, "nodeName: {}", node.name);
    let _ = writeln!(out, "token: \"{}\"", cfg.token);
    let _ = writeln!(out, "tokenTTL: 0s");
    if cfg.general.insecure {
        out.push_str("apiServerExtraArgs:\n");
        out.push_str("  insecure-bind-address: \"::\"\n");
        out.push_str("  insecure-port: \"8080\"\n");
    }
    Ok(out)
}

/// argv for bringing up the control plane
pub fn init_args(kubeadm_conf: &std::path::Path) -> Vec<String> {
    vec![
        "init".to_string(),
        format!("--config={}", kubeadm_conf.display()),
    ]
}

/// argv for joining a worker to the control plane
pub fn join_args(cfg: &Config) -> Result<Vec<String>> {
    let master = cfg.master()?;
    let address = cfg.management_address(master)?;
    let endpoint = if address.contains(':') {
        format!("[{address}]:6443")
    } else {
        format!("{address}:6443")
    };
    Ok(vec![
        "join".to_string(),
        "--token".to_string(),
        cfg.token.clone(),
        endpoint,
        "--discovery-token-ca-cert-hash".to_string(),
        format!("sha256:{}", cfg.token_cert_hash),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validate::validate;

    fn master_cfg() -> Config {
        let yaml = r#"
plugin: bridge
general:
  mode: ipv6
  kubernetes-version: "v1.11.0"
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

    #[test]
    fn test_master_config_contents() {
        let cfg = master_cfg();
        let node = cfg.topology.get("my-master").unwrap();
        let contents = config_contents(&cfg, node).unwrap();

        assert!(contents.contains("advertiseAddress: \"fd00:100::10\""));
        assert!(contents.contains("serviceSubnet: \"fd00:30::/110\""));
        assert!(contents.contains("nodeName: my-master"));
        assert!(contents.contains("token: \"56cdce.7b18ad347f3de81c\""));
        assert!(contents.contains("tokenTTL: 0s"));
        assert!(contents.contains("kubernetesVersion: v1.11.0"));
        assert!(!contents.contains("insecure-port"));
    }

    #[test]
    fn test_insecure_bindings_opt_in() {
        let mut cfg = master_cfg();
        cfg.general.insecure = true;
        let node = cfg.topology.get("my-master").unwrap();
        let contents = config_contents(&cfg, node).unwrap();
        assert!(contents.contains("insecure-bind-address: \"::\""));
        assert!(contents.contains("insecure-port: \"8080\""));
    }

    #[test]
    fn test_init_args() {
        let args = init_args(std::path::Path::new("/tmp/kubeadm.conf"));
        assert_eq!(args, vec!["init", "--config=/tmp/kubeadm.conf"]);
    }

    #[test]
    fn test_join_args_bracket_v6_endpoint() {
        let cfg = master_cfg();
        let args = join_args(&cfg).unwrap();
        assert_eq!(
            args,
            vec![
                "join",
                "--token",
                "56cdce.7b18ad347f3de81c",
                "[fd00:100::10]:6443",
                "--discovery-token-ca-cert-hash",
                "sha256:3f40043b6a6fb5675b84b3fe3ab18fe9e10d6fdeadf5497c12a52dfba4fc0252",
            ]
        );
    }
}
