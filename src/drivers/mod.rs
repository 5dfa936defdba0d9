//! Capability surfaces over the outside world
//!
//! Three narrow traits cover everything the tool touches beyond the
//! filesystem: kernel networking, the container runtime, and external
//! binaries. The orchestrator carries trait objects chosen at startup so
//! tests can swap in the recording fakes from [`mock`].

pub mod docker;
pub mod exec;
pub mod mock;
pub mod netlink;

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use ipnetwork::IpNetwork;

use crate::config::AddressMode;
use crate::error::{Error, Result};
use crate::paths::Paths;

/// Presence/liveness of a named runtime resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    NotPresent,
    Exists,
    Running,
}

/// Kernel networking operations (addresses, routes, links)
///
/// Implementations normalize kernel idempotence signals to typed errors:
/// "already exists" on add becomes [`Error::AlreadyExists`], "no such
/// process/device" on delete becomes [`Error::NotFound`]. Callers decide
/// whether either is fatal.
#[async_trait]
pub trait NetworkDriver: Send + Sync {
    /// Assign an address (CIDR form) to an interface, replacing any
    /// existing assignment of the same address
    async fn add_address(&self, addr: IpNetwork, intf: &str) -> Result<()>;

    /// Remove an address from an interface; absent address is `NotFound`
    async fn remove_address(&self, addr: IpNetwork, intf: &str) -> Result<()>;

    /// List the addresses of one family on an interface
    async fn addr_list(&self, intf: &str, family: AddressMode) -> Result<Vec<IpNetwork>>;

    /// Add a route out of the link whose v4 addresses contain `covering`
    async fn add_route_by_cidr(
        &self,
        dest: IpNetwork,
        gw: IpAddr,
        covering: IpNetwork,
    ) -> Result<()>;

    /// Delete a route selected the same way as [`add_route_by_cidr`](Self::add_route_by_cidr)
    async fn delete_route_by_cidr(
        &self,
        dest: IpNetwork,
        gw: IpAddr,
        covering: IpNetwork,
    ) -> Result<()>;

    /// Add a route out of a named interface
    async fn add_route_by_intf(&self, dest: IpNetwork, gw: IpAddr, intf: &str) -> Result<()>;

    /// Delete a route out of a named interface
    async fn delete_route_by_intf(&self, dest: IpNetwork, gw: IpAddr, intf: &str) -> Result<()>;

    /// Bring a link administratively down
    async fn link_down(&self, name: &str) -> Result<()>;

    /// Delete a link
    async fn link_del(&self, name: &str) -> Result<()>;

    /// Set a link's MTU
    async fn set_link_mtu(&self, name: &str, mtu: u32) -> Result<()>;

    /// Tear down a bridge: link down, then delete. Succeeds when either
    /// step succeeds; only a double failure is surfaced, as a composite.
    async fn remove_bridge(&self, name: &str) -> Result<()> {
        let down = self.link_down(name).await;
        let del = self.link_del(name).await;
        match (down, del) {
            (Err(down_err), Err(del_err)) => Err(Error::composite(
                format!("unable to bring down bridge {name}: {down_err}"),
                format!("unable to delete bridge {name}: {del_err}"),
            )),
            _ => Ok(()),
        }
    }
}

/// Container runtime operations (Docker-compatible CLI surface)
#[async_trait]
pub trait RuntimeDriver: Send + Sync {
    /// Inspect a named container or network
    async fn resource_state(&self, name: &str) -> ResourceState;

    /// Create a user-defined bridge network with IPv6 enabled
    async fn create_network(
        &self,
        name: &str,
        v6_cidr: &str,
        v4_cidr: &str,
        gateway: &str,
    ) -> Result<()>;

    /// Delete a user-defined network
    async fn delete_network(&self, name: &str) -> Result<()>;

    /// Run a container; `args` is everything after `run`
    async fn run_container(&self, name: &str, args: &[String]) -> Result<()>;

    /// Force-remove a container, tolerating its absence
    async fn delete_container(&self, name: &str) -> Result<()>;

    /// `ip addr list <ifname>` output from inside a container
    async fn get_interface_config(&self, container: &str, ifname: &str) -> Result<String>;

    /// Drop a v4 address from a container's eth0
    async fn delete_v4_address(&self, container: &str, addr: &str) -> Result<()>;

    /// Install a v6 route inside a container
    async fn add_v6_route(&self, container: &str, dest: &str, via: &str) -> Result<()>;
}

/// External binary invocation (kubeadm, openssl), capturing stdout
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cmd: &str, args: &[&str]) -> Result<String>;
}

/// Resolved collaborators plus host paths, threaded through every action
#[derive(Clone)]
pub struct Context {
    pub net: Arc<dyn NetworkDriver>,
    pub runtime: Arc<dyn RuntimeDriver>,
    pub runner: Arc<dyn CommandRunner>,
    pub paths: Paths,
}

impl Context {
    /// Wire up the real system drivers
    pub fn new_system() -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(exec::OsCommandRunner::new());
        Ok(Self {
            net: Arc::new(netlink::NetlinkDriver::new()?),
            runtime: Arc::new(docker::DockerDriver::new(Arc::clone(&runner))),
            runner,
            paths: Paths::new(),
        })
    }
}
