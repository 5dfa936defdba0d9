//! Multi-family address arithmetic
//!
//! Pure helpers that turn a network prefix plus a node ID into the
//! concrete CIDRs, gateway IPs, and pod subnet prefixes used everywhere
//! else. Node IDs are 1..=255 so they always fit one byte of a v6 group
//! or one v4 octet.

use ipnetwork::IpNetwork;

use crate::config::{AddressMode, NetworkInfo};
use crate::error::{Error, Result};

/// Build the node's CIDR on a network plane, e.g. `fd00:100::10/64`.
///
/// The node ID is appended to the textual prefix in decimal for both
/// families; for IPv6 the digits form the next hextet group.
pub fn build_node_cidr(info: &NetworkInfo, node_id: u32) -> String {
    format!("{}{}/{}", info.prefix, node_id, info.size)
}

/// Build a host/gateway IP by appending `int_part` to the prefix.
pub fn build_gateway_ip(prefix: &str, int_part: u32) -> String {
    format!("{}{}", prefix, int_part)
}

/// Compute the per-node pod subnet prefix and suffix.
///
/// For IPv4 the pod network is assumed /24 and the node ID replaces the
/// third octet: `("10.244.", 24, 10)` yields `("10.244.10.", "0")`, so the
/// subnet is `10.244.10.0/24` and the gateway `10.244.10.1`.
///
/// For IPv6 the node ID becomes (part of) the last network group, in hex.
/// When the network size is not group-aligned the ID sits in the upper
/// byte of the group; when it is aligned and the prefix ends mid-group, a
/// single-digit ID is zero-padded so the group stays well-formed.
pub fn build_pod_subnet_prefix(
    mode: AddressMode,
    prefix: &str,
    net_size: u32,
    node_id: u32,
) -> (String, String) {
    match mode {
        AddressMode::Ipv4 => {
            let mut parts = prefix.split('.');
            let first = parts.next().unwrap_or_default();
            let second = parts.next().unwrap_or_default();
            (format!("{first}.{second}.{node_id}."), "0".to_string())
        }
        AddressMode::Ipv6 => {
            let mut prefix = prefix.to_string();
            let mut id = node_id;
            if net_size % 16 != 0 {
                // ID occupies the upper byte of the trailing group
                id <<= 8;
            } else if !prefix.ends_with(':') && id < 0x10 {
                prefix.push('0');
            }
            (format!("{prefix}{id:x}::"), String::new())
        }
    }
}

/// Parse a textual CIDR, mapping failures to a translation error.
///
/// Used on strings the tool computed itself, so a failure means the
/// arithmetic above produced something the parser rejects.
pub fn parse_cidr(cidr: &str) -> Result<IpNetwork> {
    cidr.parse::<IpNetwork>()
        .map_err(|e| Error::Translation(format!("invalid CIDR {cidr:?}: {e}")))
}

/// Parse a textual IP address
pub fn parse_ip(ip: &str) -> Result<std::net::IpAddr> {
    ip.parse()
        .map_err(|e| Error::Translation(format!("invalid IP {ip:?}: {e}")))
}
