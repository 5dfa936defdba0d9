//! Kernel networking driver over rtnetlink
//!
//! One persistent netlink connection per process. Kernel idempotence
//! signals are normalized here: "File exists" on add becomes
//! [`Error::AlreadyExists`], "No such process"/"No such device" on
//! delete becomes [`Error::NotFound`]. String matching on the kernel
//! error text happens only in this module.

use std::net::IpAddr;

use async_trait::async_trait;
use futures::TryStreamExt;
use ipnetwork::IpNetwork;
use netlink_packet_route::address::nlas::Nla as AddressNla;
use rtnetlink::IpVersion;
use tracing::debug;

use super::NetworkDriver;
use crate::config::AddressMode;
use crate::error::{Error, Result};

/// rtnetlink-backed implementation of [`NetworkDriver`]
pub struct NetlinkDriver {
    handle: rtnetlink::Handle,
    // Keeps the connection task alive for the process lifetime
    _conn_task: tokio::task::JoinHandle<()>,
}

impl NetlinkDriver {
    /// Open a persistent netlink connection
    pub fn new() -> Result<Self> {
        let (conn, handle, _) = rtnetlink::new_connection()?;
        let conn_task = tokio::spawn(conn);
        Ok(Self {
            handle,
            _conn_task: conn_task,
        })
    }

    /// Resolve an interface name to its index
    async fn link_index(&self, name: &str) -> Result<u32> {
        let mut links = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute();
        match links.try_next().await {
            Ok(Some(msg)) => Ok(msg.header.index),
            Ok(None) => Err(Error::NotFound(format!("link {name}"))),
            Err(e) if e.to_string().contains("No such device") => {
                Err(Error::NotFound(format!("link {name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find the link carrying a v4 address inside `covering`
    async fn link_index_for_cidr(&self, covering: IpNetwork) -> Result<u32> {
        let mut addrs = self.handle.address().get().execute();
        while let Some(msg) = addrs.try_next().await? {
            if let Some(ip) = address_of(&msg) {
                if ip.is_ipv4() && covering.contains(ip) {
                    return Ok(msg.header.index);
                }
            }
        }
        Err(Error::NotFound(format!(
            "link with v4 address in {covering}"
        )))
    }

    async fn route_add(&self, dest: IpNetwork, gw: IpAddr, link_index: u32) -> Result<()> {
        let result = match (dest, gw) {
            (IpNetwork::V4(net), IpAddr::V4(gw)) => {
                self.handle
                    .route()
                    .add()
                    .v4()
                    .destination_prefix(net.ip(), net.prefix())
                    .gateway(gw)
                    .output_interface(link_index)
                    .execute()
                    .await
            }
            (IpNetwork::V6(net), IpAddr::V6(gw)) => {
                self.handle
                    .route()
                    .add()
                    .v6()
                    .destination_prefix(net.ip(), net.prefix())
                    .gateway(gw)
                    .output_interface(link_index)
                    .execute()
                    .await
            }
            _ => {
                return Err(Error::config(format!(
                    "route {dest} and gateway {gw} families differ"
                )));
            }
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("File exists") => {
                Err(Error::AlreadyExists(format!("route to {dest}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn route_del(&self, dest: IpNetwork, link_index: Option<u32>) -> Result<()> {
        let version = match dest {
            IpNetwork::V4(_) => IpVersion::V4,
            IpNetwork::V6(_) => IpVersion::V6,
        };
        let mut routes = self.handle.route().get(version).execute();
        while let Some(route) = routes.try_next().await? {
            let matches_dest =
                route.destination_prefix() == Some((dest.ip(), dest.prefix()));
            let matches_link = match link_index {
                Some(idx) => route.output_interface() == Some(idx),
                None => true,
            };
            if matches_dest && matches_link {
                return match self.handle.route().del(route).execute().await {
                    Ok(()) => Ok(()),
                    Err(e) if e.to_string().contains("No such process") => {
                        Err(Error::NotFound(format!("route to {dest}")))
                    }
                    Err(e) => Err(e.into()),
                };
            }
        }
        Err(Error::NotFound(format!("route to {dest}")))
    }
}

/// Extract the IP carried by an address message, if any
fn address_of(msg: &netlink_packet_route::AddressMessage) -> Option<IpAddr> {
    msg.nlas.iter().find_map(|nla| match nla {
        AddressNla::Address(bytes) => bytes_to_ip(bytes),
        _ => None,
    })
}

fn bytes_to_ip(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        _ => None,
    }
}

#[async_trait]
impl NetworkDriver for NetlinkDriver {
    async fn add_address(&self, addr: IpNetwork, intf: &str) -> Result<()> {
        let index = self.link_index(intf).await?;
        debug!("assigning {addr} to {intf}");
        let result = self
            .handle
            .address()
            .add(index, addr.ip(), addr.prefix())
            .replace()
            .execute()
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("File exists") => {
                Err(Error::AlreadyExists(format!("address {addr} on {intf}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_address(&self, addr: IpNetwork, intf: &str) -> Result<()> {
        let index = self.link_index(intf).await?;
        let mut addrs = self
            .handle
            .address()
            .get()
            .set_link_index_filter(index)
            .execute();
        while let Some(msg) = addrs.try_next().await? {
            if address_of(&msg) == Some(addr.ip()) && msg.header.prefix_len == addr.prefix() {
                self.handle.address().del(msg).execute().await?;
                return Ok(());
            }
        }
        Err(Error::NotFound(format!("address {addr} on {intf}")))
    }

    async fn addr_list(&self, intf: &str, family: AddressMode) -> Result<Vec<IpNetwork>> {
        let index = self.link_index(intf).await?;
        let mut addrs = self
            .handle
            .address()
            .get()
            .set_link_index_filter(index)
            .execute();
        let mut out = Vec::new();
        while let Some(msg) = addrs.try_next().await? {
            if let Some(ip) = address_of(&msg) {
                let wanted = match family {
                    AddressMode::Ipv4 => ip.is_ipv4(),
                    AddressMode::Ipv6 => ip.is_ipv6(),
                };
                if wanted {
                    if let Ok(net) = IpNetwork::new(ip, msg.header.prefix_len) {
                        out.push(net);
                    }
                }
            }
        }
        Ok(out)
    }

    async fn add_route_by_cidr(
        &self,
        dest: IpNetwork,
        gw: IpAddr,
        covering: IpNetwork,
    ) -> Result<()> {
        let index = self.link_index_for_cidr(covering).await?;
        self.route_add(dest, gw, index).await
    }

    async fn delete_route_by_cidr(
        &self,
        dest: IpNetwork,
        _gw: IpAddr,
        covering: IpNetwork,
    ) -> Result<()> {
        let index = self.link_index_for_cidr(covering).await?;
        self.route_del(dest, Some(index)).await
    }

    async fn add_route_by_intf(&self, dest: IpNetwork, gw: IpAddr, intf: &str) -> Result<()> {
        let index = self.link_index(intf).await?;
        self.route_add(dest, gw, index).await
    }

    async fn delete_route_by_intf(&self, dest: IpNetwork, _gw: IpAddr, intf: &str) -> Result<()> {
        let index = self.link_index(intf).await?;
        self.route_del(dest, Some(index)).await
    }

    async fn link_down(&self, name: &str) -> Result<()> {
        let index = self.link_index(name).await?;
        self.handle.link().set(index).down().execute().await?;
        Ok(())
    }

    async fn link_del(&self, name: &str) -> Result<()> {
        let index = self.link_index(name).await?;
        match self.handle.link().del(index).execute().await {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("No such device") => {
                Err(Error::NotFound(format!("link {name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_link_mtu(&self, name: &str, mtu: u32) -> Result<()> {
        let index = self.link_index(name).await?;
        self.handle.link().set(index).mtu(mtu).execute().await?;
        Ok(())
    }
}
