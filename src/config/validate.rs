//! Configuration validation and role inference
//!
//! Runs once per invocation, before any side effect. Populates the
//! derived role flags and network planes, then enforces the topology
//! invariants. Order matters: later checks rely on the flags set by
//! earlier ones.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::{AddressMode, ClusterMode, Config, NetworkInfo, Node};
use crate::error::{Error, Result};

/// Bootstrap token shape: 6 + 16 lowercase alphanumerics
const TOKEN_PATTERN: &str = r"^[a-z0-9]{6}\.[a-z0-9]{16}$";

/// CA-cert hash shape: SHA-256 hex digest
const HASH_PATTERN: &str = r"^[a-f0-9]{64}$";

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TOKEN_PATTERN).expect("hard-coded pattern"))
}

fn hash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(HASH_PATTERN).expect("hard-coded pattern"))
}

/// Check a kubeadm bootstrap token for the expected shape
pub fn validate_token(token: &str) -> Result<()> {
    if token_re().is_match(token) {
        Ok(())
    } else {
        Err(Error::config(format!("invalid token {token:?}")))
    }
}

/// Check a CA certificate hash for the expected shape
pub fn validate_token_cert_hash(hash: &str) -> Result<()> {
    if hash_re().is_match(hash) {
        Ok(())
    } else {
        Err(Error::config(format!("invalid CA certificate hash {hash:?}")))
    }
}

/// Validate the parsed configuration for the host and verb at hand.
///
/// `needs_secrets` is false only for `init`, which tolerates a missing
/// token/hash because it is about to produce them.
pub fn validate(cfg: &mut Config, host: &str, needs_secrets: bool) -> Result<()> {
    set_node_names(cfg);
    validate_unique_ids(cfg)?;
    validate_opmodes(cfg)?;
    validate_cluster_roles(cfg)?;
    normalize_networks(cfg)?;
    validate_mode_families(cfg)?;
    validate_secrets(cfg, needs_secrets)?;
    validate_host(cfg, host)?;
    debug!("configuration validated for host {host}");
    Ok(())
}

fn set_node_names(cfg: &mut Config) {
    for (name, node) in cfg.topology.iter_mut() {
        node.name = name.clone();
    }
}

fn validate_unique_ids(cfg: &Config) -> Result<()> {
    let mut seen = HashSet::new();
    for node in cfg.topology.values() {
        if node.id == 0 || node.id > 255 {
            return Err(Error::config(format!(
                "node {:?} ID {} is outside 1..=255",
                node.name, node.id
            )));
        }
        if !seen.insert(node.id) {
            return Err(Error::config(format!(
                "node ID {} is used more than once",
                node.id
            )));
        }
    }
    Ok(())
}

fn validate_opmodes(cfg: &mut Config) -> Result<()> {
    for node in cfg.topology.values_mut() {
        for token in node.opmodes.split_whitespace() {
            match token.to_lowercase().as_str() {
                "master" => node.is_master = true,
                "minion" => node.is_minion = true,
                "dns64" => node.is_dns64_server = true,
                "nat64" => node.is_nat64_server = true,
                other => {
                    return Err(Error::config(format!(
                        "node {:?} has unknown operating mode {other:?}",
                        node.name
                    )));
                }
            }
        }
        if node.is_master && node.is_minion {
            return Err(Error::config(format!(
                "node {:?} cannot be both master and minion",
                node.name
            )));
        }
    }
    Ok(())
}

fn validate_cluster_roles(cfg: &Config) -> Result<()> {
    let masters = cfg.topology.values().filter(|n| n.is_master).count();
    if masters != 1 {
        return Err(Error::config(format!(
            "expected exactly one master node, found {masters}"
        )));
    }
    for node in cfg.topology.values() {
        if node.is_dns64_server != node.is_nat64_server {
            // DNS64 synthesis is useless without the co-located translator
            return Err(Error::config(format!(
                "node {:?} must host both dns64 and nat64 or neither",
                node.name
            )));
        }
    }
    Ok(())
}

fn plane_from_fields(
    what: &str,
    cidr: &Option<String>,
    prefix: &Option<String>,
    size: Option<u32>,
    pod: bool,
) -> Result<NetworkInfo> {
    if let (Some(prefix), Some(size)) = (prefix, size) {
        let mode = if prefix.contains(':') {
            AddressMode::Ipv6
        } else {
            AddressMode::Ipv4
        };
        return Ok(NetworkInfo {
            mode,
            prefix: prefix.clone(),
            size,
        });
    }
    match cidr {
        Some(cidr) if pod => NetworkInfo::pod_plane_from_cidr(cidr),
        Some(cidr) => NetworkInfo::from_cidr(cidr),
        None => Err(Error::config(format!(
            "{what} needs either a cidr or a prefix and size"
        ))),
    }
}

fn normalize_networks(cfg: &mut Config) -> Result<()> {
    let mgmt = &mut cfg.mgmt_net;
    mgmt.info.clear();
    mgmt.info.push(plane_from_fields(
        "mgmt_net",
        &mgmt.cidr,
        &mgmt.prefix,
        mgmt.size,
        false,
    )?);
    if let Some(cidr2) = &mgmt.cidr2 {
        mgmt.info.push(NetworkInfo::from_cidr(cidr2)?);
    }

    let pod = &mut cfg.pod_net;
    pod.info.clear();
    pod.info.push(plane_from_fields(
        "pod_net",
        &pod.cidr,
        &pod.prefix,
        pod.size,
        true,
    )?);
    if let Some(cidr2) = &pod.cidr2 {
        pod.info.push(NetworkInfo::pod_plane_from_cidr(cidr2)?);
    }

    let needs_support = cfg.topology.values().any(|n| n.is_dns64_server);
    if needs_support {
        if cfg.support_net.cidr.is_empty() || cfg.support_net.v4_cidr.is_empty() {
            return Err(Error::config(
                "support_net cidr and v4_cidr are required when a node hosts dns64/nat64",
            ));
        }
        cfg.support_net.info = NetworkInfo::from_cidr(&cfg.support_net.cidr)?;
        if cfg.dns64.ip.is_empty() || cfg.dns64.prefix.is_empty() {
            return Err(Error::config("dns64 settings are incomplete"));
        }
        if cfg.nat64.ip.is_empty() || cfg.nat64.v4_ip.is_empty() || cfg.nat64.v4_cidr.is_empty() {
            return Err(Error::config("nat64 settings are incomplete"));
        }
    }

    if cfg.service_net.cidr.is_empty() {
        return Err(Error::config("service_net cidr is required"));
    }
    Ok(())
}

fn validate_mode_families(cfg: &Config) -> Result<()> {
    let expect_two = cfg.general.mode == ClusterMode::DualStack;
    for (what, info) in [("mgmt_net", &cfg.mgmt_net.info), ("pod_net", &cfg.pod_net.info)] {
        if expect_two {
            if info.len() != 2 || info[0].mode == info[1].mode {
                return Err(Error::config(format!(
                    "dual-stack requires {what} to carry one plane per family"
                )));
            }
        } else {
            if info.len() != 1 {
                return Err(Error::config(format!(
                    "{what} must carry exactly one plane in single-family mode"
                )));
            }
            let expected = match cfg.general.mode {
                ClusterMode::Ipv4 => AddressMode::Ipv4,
                _ => AddressMode::Ipv6,
            };
            if info[0].mode != expected {
                return Err(Error::config(format!(
                    "{what} family does not match mode {:?}",
                    cfg.general.mode
                )));
            }
        }
    }
    Ok(())
}

fn validate_secrets(cfg: &Config, needs_secrets: bool) -> Result<()> {
    if !needs_secrets && cfg.token.is_empty() && cfg.token_cert_hash.is_empty() {
        return Ok(());
    }
    if !cfg.token.is_empty() || needs_secrets {
        validate_token(&cfg.token)?;
    }
    if !cfg.token_cert_hash.is_empty() || needs_secrets {
        validate_token_cert_hash(&cfg.token_cert_hash)?;
    }
    Ok(())
}

fn validate_host(cfg: &Config, host: &str) -> Result<()> {
    if cfg.topology.contains_key(host) {
        Ok(())
    } else {
        Err(Error::config(format!(
            "host {host:?} is not in the topology"
        )))
    }
}

/// Look up the validated node entry for this host
pub fn node_for_host<'a>(cfg: &'a Config, host: &str) -> Result<&'a Node> {
    cfg.topology
        .get(host)
        .ok_or_else(|| Error::config(format!("host {host:?} is not in the topology")))
}
