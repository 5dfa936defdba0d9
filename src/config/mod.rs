//! Cluster configuration model
//!
//! The declarative description of the lab cluster: topology, network
//! planes, DNS64/NAT64 settings, and the generated bootstrap secrets.
//! Parsing is plain serde; role flags and the derived [`NetworkInfo`]
//! planes are populated afterwards by [`validate`](crate::config::validate).

pub mod rewrite;
pub mod validate;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the auxiliary user-defined network for DNS64/NAT64
pub const SUPPORT_NET_NAME: &str = "support_net";

/// Name and image of the DNS64 container
pub const DNS64_NAME: &str = "bind9";
pub const DNS64_IMAGE: &str = "resystit/bind9:latest";

/// Name and image of the NAT64 container
pub const NAT64_NAME: &str = "tayga";
pub const NAT64_IMAGE: &str = "danehans/tayga:latest";

/// Label applied to every container the tool owns
pub const RESOURCE_LABEL: &str = "lazyjack";

/// Address family of one network plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressMode {
    Ipv4,
    #[default]
    Ipv6,
}

impl std::fmt::Display for AddressMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressMode::Ipv4 => write!(f, "ipv4"),
            AddressMode::Ipv6 => write!(f, "ipv6"),
        }
    }
}

/// Cluster-wide address family selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterMode {
    Ipv4,
    #[default]
    Ipv6,
    DualStack,
}

/// CNI plugin selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Plugin {
    #[default]
    Bridge,
    Ptp,
    Calico,
    None,
}

/// One address family plane of a network
///
/// The textual prefix ends at a group or octet boundary so that a node ID
/// can be suffixed to produce a host address (`fd00:20::` + `10`,
/// `10.192.0.` + `10`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkInfo {
    pub mode: AddressMode,
    pub prefix: String,
    pub size: u32,
}

impl NetworkInfo {
    /// Derive a plane from a CIDR string like `fd00:20::/64` or
    /// `10.192.0.0/16`, keeping the operator's textual prefix form.
    pub fn from_cidr(cidr: &str) -> Result<Self> {
        let (addr, size) = split_cidr(cidr)?;
        if addr.contains(':') {
            Ok(Self {
                mode: AddressMode::Ipv6,
                prefix: addr.to_string(),
                size,
            })
        } else {
            let prefix = addr
                .strip_suffix('0')
                .ok_or_else(|| {
                    Error::config(format!("v4 CIDR {cidr:?} must end in .0 to derive a prefix"))
                })?
                .to_string();
            if !prefix.ends_with('.') {
                return Err(Error::config(format!(
                    "v4 CIDR {cidr:?} does not end at an octet boundary"
                )));
            }
            Ok(Self {
                mode: AddressMode::Ipv4,
                prefix,
                size,
            })
        }
    }

    /// Derive a pod-network plane from a CIDR.
    ///
    /// Unlike [`from_cidr`](Self::from_cidr) the v6 prefix is expanded to
    /// full groups ending just before the group that carries the node ID,
    /// so `fd00:40::/80` becomes `fd00:40:0:0:`.
    pub fn pod_plane_from_cidr(cidr: &str) -> Result<Self> {
        let (addr, size) = split_cidr(cidr)?;
        if !addr.contains(':') {
            return Self::from_cidr(cidr);
        }
        let parsed: std::net::Ipv6Addr = addr
            .parse()
            .map_err(|e| Error::config(format!("invalid v6 CIDR {cidr:?}: {e}")))?;
        let groups = if size % 16 == 0 { size / 16 - 1 } else { size / 16 } as usize;
        let mut prefix = String::new();
        for seg in parsed.segments().iter().take(groups) {
            prefix.push_str(&format!("{seg:x}:"));
        }
        Ok(Self {
            mode: AddressMode::Ipv6,
            prefix,
            size,
        })
    }
}

fn split_cidr(cidr: &str) -> Result<(&str, u32)> {
    let (addr, size) = cidr
        .split_once('/')
        .ok_or_else(|| Error::config(format!("{cidr:?} is not a CIDR")))?;
    let size = size
        .parse::<u32>()
        .map_err(|_| Error::config(format!("bad prefix length in {cidr:?}")))?;
    Ok((addr, size))
}

/// One host in the topology
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Node {
    /// Topology key; filled in during validation
    #[serde(skip)]
    pub name: String,
    /// Management interface on this host
    pub interface: String,
    /// Unique small integer, 1..=255
    pub id: u32,
    /// Whitespace-separated subset of {master, minion, dns64, nat64}
    #[serde(default)]
    pub opmodes: String,
    #[serde(skip)]
    pub is_master: bool,
    #[serde(skip)]
    pub is_minion: bool,
    #[serde(skip)]
    pub is_dns64_server: bool,
    #[serde(skip)]
    pub is_nat64_server: bool,
}

impl Node {
    /// Whether this node runs cluster workloads (control plane or worker)
    pub fn is_cluster_member(&self) -> bool {
        self.is_master || self.is_minion
    }
}

/// General cluster-wide settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct General {
    #[serde(default)]
    pub mode: ClusterMode,
    /// Reproduces the legacy insecure API server binding when set
    #[serde(default, rename = "insecure-bind")]
    pub insecure: bool,
    #[serde(default, rename = "kubernetes-version")]
    pub kubernetes_version: String,
}

/// Auxiliary bridge network for the DNS64/NAT64 containers
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SupportNetwork {
    pub cidr: String,
    /// v4 CIDR handed to the container runtime when creating the network
    pub v4_cidr: String,
    #[serde(skip)]
    pub info: NetworkInfo,
}

/// Node-to-node control traffic plane(s)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ManagementNetwork {
    #[serde(default)]
    pub cidr: Option<String>,
    /// Second family for dual-stack
    #[serde(default)]
    pub cidr2: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(skip)]
    pub info: Vec<NetworkInfo>,
}

fn default_mtu() -> u32 {
    1500
}

/// Pod addressing plane(s)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodNetwork {
    #[serde(default)]
    pub cidr: Option<String>,
    /// Second family for dual-stack
    #[serde(default)]
    pub cidr2: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    #[serde(skip)]
    pub info: Vec<NetworkInfo>,
}

impl Default for PodNetwork {
    fn default() -> Self {
        Self {
            cidr: None,
            cidr2: None,
            prefix: None,
            size: None,
            mtu: default_mtu(),
            info: Vec::new(),
        }
    }
}

/// Service CIDR handed to kubeadm
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceNetwork {
    pub cidr: String,
}

/// DNS64 synthesis settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Dns64 {
    /// Upstream v4 resolver the bind9 container forwards to
    pub remote_server: String,
    /// Synthesis prefix, e.g. `64:ff9b::`
    pub prefix: String,
    pub prefix_size: u32,
    /// Listening v6 address of the DNS64 container
    pub ip: String,
    /// When set, existing AAAA records are used instead of synthesizing
    #[serde(default, rename = "allow_ipv6_defaults")]
    pub allow_aaaa_use: bool,
}

/// NAT64 translator settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Nat64 {
    /// v4 pool the translator maps into
    pub v4_cidr: String,
    /// v4 address of the translator inside that pool
    pub v4_ip: String,
    /// v6 address of the translator on the support network
    pub ip: String,
}

/// Root of the cluster description
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub plugin: Plugin,
    #[serde(default)]
    pub general: General,
    pub topology: BTreeMap<String, Node>,
    #[serde(default)]
    pub support_net: SupportNetwork,
    pub mgmt_net: ManagementNetwork,
    pub pod_net: PodNetwork,
    pub service_net: ServiceNetwork,
    #[serde(default)]
    pub nat64: Nat64,
    #[serde(default)]
    pub dns64: Dns64,
    /// kubeadm bootstrap token, injected by `init`
    #[serde(default)]
    pub token: String,
    /// SHA-256 of the CA public key, injected by `init`
    #[serde(default, rename = "token-cert-hash")]
    pub token_cert_hash: String,
}

impl Config {
    /// Parse the YAML description. Role flags and derived network planes
    /// are not populated until validation runs.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// The single control-plane node (validation guarantees exactly one)
    pub fn master(&self) -> Result<&Node> {
        self.topology
            .values()
            .find(|n| n.is_master)
            .ok_or_else(|| Error::config("no control-plane node in topology"))
    }

    /// Management plane matching the given family, if configured
    pub fn mgmt_info(&self, mode: AddressMode) -> Option<&NetworkInfo> {
        self.mgmt_net.info.iter().find(|i| i.mode == mode)
    }

    /// The management address used to reach `node` for cluster traffic.
    /// Prefers the v6 plane when both are present.
    pub fn management_address(&self, node: &Node) -> Result<String> {
        let info = self
            .mgmt_info(AddressMode::Ipv6)
            .or_else(|| self.mgmt_net.info.first())
            .ok_or_else(|| Error::config("management network has no address planes"))?;
        Ok(crate::net::build_gateway_ip(&info.prefix, node.id))
    }
}
