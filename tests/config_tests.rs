//! Integration tests for config loading, validation, and the init rewrite

use lazyjack::config::validate::validate;
use lazyjack::config::{AddressMode, ClusterMode, Config, Plugin, rewrite};

const TOKEN: &str = "56cdce.7b18ad347f3de81c";
const HASH: &str = "3f40043b6a6fb5675b84b3fe3ab18fe9e10d6fdeadf5497c12a52dfba4fc0252";

fn full_yaml() -> String {
    format!(
        r#"# lab cluster, one bare-metal box per node
plugin: bridge
general:
  mode: ipv6
  kubernetes-version: "v1.11.0"
topology:
  my-master:
    interface: eth0
    id: 10
    opmodes: "master dns64 nat64"
  my-minion-1:
    interface: eth0
    id: 20
    opmodes: "minion"
  my-minion-2:
    interface: enp0s3
    id: 30
    opmodes: "minion"
support_net:
  cidr: "fd00:10::/64"
  v4_cidr: "172.18.0.0/24"
mgmt_net:
  cidr: "fd00:100::/64"
pod_net:
  prefix: "fd00:40:0:0:"
  size: 80
  mtu: 9000
service_net:
  cidr: "fd00:30::/110"
dns64:
  remote_server: "64.102.6.247"
  prefix: "fd00:10:64:ff9b::"
  prefix_size: 96
  ip: "fd00:10::100"
nat64:
  v4_cidr: "172.18.0.128/25"
  v4_ip: "172.18.0.200"
  ip: "fd00:10::200"
token: "{TOKEN}"
token-cert-hash: "{HASH}"
"#
    )
}

#[test]
fn test_full_config_round_trip() {
    let mut cfg = Config::from_yaml(&full_yaml()).unwrap();
    validate(&mut cfg, "my-minion-2", true).unwrap();

    assert_eq!(cfg.plugin, Plugin::Bridge);
    assert_eq!(cfg.general.mode, ClusterMode::Ipv6);
    assert_eq!(cfg.general.kubernetes_version, "v1.11.0");
    assert_eq!(cfg.pod_net.mtu, 9000);

    let master = cfg.master().unwrap();
    assert_eq!(master.name, "my-master");
    assert!(master.is_dns64_server && master.is_nat64_server);
    assert_eq!(cfg.management_address(master).unwrap(), "fd00:100::10");

    let minion = &cfg.topology["my-minion-2"];
    assert!(minion.is_minion && !minion.is_master);
    assert_eq!(cfg.management_address(minion).unwrap(), "fd00:100::30");

    assert_eq!(cfg.support_net.info.prefix, "fd00:10::");
    assert_eq!(cfg.mgmt_info(AddressMode::Ipv6).unwrap().size, 64);
    assert!(cfg.mgmt_info(AddressMode::Ipv4).is_none());
}

#[test]
fn test_rewrite_replaces_stale_secrets_in_place() {
    let stale = full_yaml().replace(TOKEN, "aaaaaa.bbbbbbbbbbbbbbbb");
    let fresh = rewrite::update_config_contents(&stale, TOKEN, HASH);

    let token_lines: Vec<&str> = fresh
        .lines()
        .filter(|l| l.starts_with("token:"))
        .collect();
    let hash_lines: Vec<&str> = fresh
        .lines()
        .filter(|l| l.starts_with("token-cert-hash:"))
        .collect();
    assert_eq!(token_lines, vec![format!("token: \"{TOKEN}\"").as_str()]);
    assert_eq!(
        hash_lines,
        vec![format!("token-cert-hash: \"{HASH}\"").as_str()]
    );

    // the fresh secrets sit right after the plugin line
    let lines: Vec<&str> = fresh.lines().collect();
    let plugin_at = lines.iter().position(|l| l.starts_with("plugin:")).unwrap();
    assert_eq!(lines[plugin_at + 1], format!("token: \"{TOKEN}\""));
    assert_eq!(lines[plugin_at + 2], format!("token-cert-hash: \"{HASH}\""));

    // comments survive and the result is loadable and valid
    assert!(fresh.starts_with("# lab cluster"));
    let mut cfg = Config::from_yaml(&fresh).unwrap();
    validate(&mut cfg, "my-master", true).unwrap();
    assert_eq!(cfg.token, TOKEN);
    assert_eq!(cfg.token_cert_hash, HASH);
}

#[test]
fn test_rewrite_is_deterministic() {
    let once = rewrite::update_config_contents(&full_yaml(), TOKEN, HASH);
    let twice = rewrite::update_config_contents(&once, TOKEN, HASH);
    assert_eq!(once, twice);
}

#[test]
fn test_validation_rejects_wrong_family_for_mode() {
    let yaml = full_yaml().replace("mode: ipv6", "mode: ipv4");
    let mut cfg = Config::from_yaml(&yaml).unwrap();
    assert!(validate(&mut cfg, "my-master", true).is_err());
}
