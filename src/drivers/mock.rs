//! Recording fakes for the driver surfaces
//!
//! Used by unit and integration tests: every call is appended to a
//! shared log as a flat string, and a small amount of state (routes,
//! addresses, resource states) makes the idempotence signals testable.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ipnetwork::IpNetwork;

use super::{CommandRunner, NetworkDriver, ResourceState, RuntimeDriver};
use crate::config::AddressMode;
use crate::error::{Error, Result};

fn push(log: &Mutex<Vec<String>>, entry: String) {
    log.lock().expect("mock log poisoned").push(entry);
}

/// Fake [`NetworkDriver`] with just enough state for idempotence checks
#[derive(Default)]
pub struct MockNetwork {
    pub calls: Mutex<Vec<String>>,
    routes: Mutex<HashSet<String>>,
    addresses: Mutex<Vec<(IpNetwork, String)>>,
    links: Mutex<HashSet<String>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a route so the next add reports AlreadyExists
    pub fn seed_route(&self, dest: &str) {
        self.routes.lock().expect("mock state").insert(dest.to_string());
    }

    /// Pre-seed a link so link operations on it succeed
    pub fn seed_link(&self, name: &str) {
        self.links.lock().expect("mock state").insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock log poisoned").clone()
    }
}

#[async_trait]
impl NetworkDriver for MockNetwork {
    async fn add_address(&self, addr: IpNetwork, intf: &str) -> Result<()> {
        push(&self.calls, format!("addr add {addr} dev {intf}"));
        let mut addrs = self.addresses.lock().expect("mock state");
        if !addrs.iter().any(|(a, i)| *a == addr && i == intf) {
            addrs.push((addr, intf.to_string()));
        }
        Ok(())
    }

    async fn remove_address(&self, addr: IpNetwork, intf: &str) -> Result<()> {
        push(&self.calls, format!("addr del {addr} dev {intf}"));
        let mut addrs = self.addresses.lock().expect("mock state");
        let before = addrs.len();
        addrs.retain(|(a, i)| !(*a == addr && i == intf));
        if addrs.len() < before {
            Ok(())
        } else {
            Err(Error::NotFound(format!("address {addr} on {intf}")))
        }
    }

    async fn addr_list(&self, intf: &str, family: AddressMode) -> Result<Vec<IpNetwork>> {
        let addrs = self.addresses.lock().expect("mock state");
        Ok(addrs
            .iter()
            .filter(|(a, i)| {
                i == intf
                    && match family {
                        AddressMode::Ipv4 => a.is_ipv4(),
                        AddressMode::Ipv6 => a.is_ipv6(),
                    }
            })
            .map(|(a, _)| *a)
            .collect())
    }

    async fn add_route_by_cidr(
        &self,
        dest: IpNetwork,
        gw: IpAddr,
        covering: IpNetwork,
    ) -> Result<()> {
        push(
            &self.calls,
            format!("route add {dest} via {gw} covering {covering}"),
        );
        if self.routes.lock().expect("mock state").insert(dest.to_string()) {
            Ok(())
        } else {
            Err(Error::AlreadyExists(format!("route to {dest}")))
        }
    }

    async fn delete_route_by_cidr(
        &self,
        dest: IpNetwork,
        gw: IpAddr,
        covering: IpNetwork,
    ) -> Result<()> {
        push(
            &self.calls,
            format!("route del {dest} via {gw} covering {covering}"),
        );
        if self.routes.lock().expect("mock state").remove(&dest.to_string()) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("route to {dest}")))
        }
    }

    async fn add_route_by_intf(&self, dest: IpNetwork, gw: IpAddr, intf: &str) -> Result<()> {
        push(&self.calls, format!("route add {dest} via {gw} dev {intf}"));
        if self.routes.lock().expect("mock state").insert(dest.to_string()) {
            Ok(())
        } else {
            Err(Error::AlreadyExists(format!("route to {dest}")))
        }
    }

    async fn delete_route_by_intf(&self, dest: IpNetwork, gw: IpAddr, intf: &str) -> Result<()> {
        push(&self.calls, format!("route del {dest} via {gw} dev {intf}"));
        if self.routes.lock().expect("mock state").remove(&dest.to_string()) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("route to {dest}")))
        }
    }

    async fn link_down(&self, name: &str) -> Result<()> {
        push(&self.calls, format!("link down {name}"));
        if self.links.lock().expect("mock state").contains(name) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("link {name}")))
        }
    }

    async fn link_del(&self, name: &str) -> Result<()> {
        push(&self.calls, format!("link del {name}"));
        if self.links.lock().expect("mock state").remove(name) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("link {name}")))
        }
    }

    async fn set_link_mtu(&self, name: &str, mtu: u32) -> Result<()> {
        push(&self.calls, format!("link mtu {name} {mtu}"));
        if self.links.lock().expect("mock state").contains(name) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("link {name}")))
        }
    }
}

/// Fake [`RuntimeDriver`] with per-resource state
#[derive(Default)]
pub struct MockRuntime {
    pub calls: Mutex<Vec<String>>,
    states: Mutex<HashMap<String, ResourceState>>,
    interface_output: Mutex<HashMap<String, String>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, name: &str, state: ResourceState) {
        self.states
            .lock()
            .expect("mock state")
            .insert(name.to_string(), state);
    }

    /// Canned `ip addr list` output for a container
    pub fn set_interface_output(&self, container: &str, output: &str) {
        self.interface_output
            .lock()
            .expect("mock state")
            .insert(container.to_string(), output.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock log poisoned").clone()
    }
}

#[async_trait]
impl RuntimeDriver for MockRuntime {
    async fn resource_state(&self, name: &str) -> ResourceState {
        *self
            .states
            .lock()
            .expect("mock state")
            .get(name)
            .unwrap_or(&ResourceState::NotPresent)
    }

    async fn create_network(
        &self,
        name: &str,
        v6_cidr: &str,
        v4_cidr: &str,
        gateway: &str,
    ) -> Result<()> {
        push(
            &self.calls,
            format!("network create {name} {v6_cidr} {v4_cidr} gw {gateway}"),
        );
        self.set_state(name, ResourceState::Exists);
        Ok(())
    }

    async fn delete_network(&self, name: &str) -> Result<()> {
        push(&self.calls, format!("network rm {name}"));
        match self.states.lock().expect("mock state").remove(name) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("network {name}"))),
        }
    }

    async fn run_container(&self, name: &str, args: &[String]) -> Result<()> {
        push(&self.calls, format!("run {}", args.join(" ")));
        self.set_state(name, ResourceState::Running);
        Ok(())
    }

    async fn delete_container(&self, name: &str) -> Result<()> {
        push(&self.calls, format!("rm {name}"));
        self.states.lock().expect("mock state").remove(name);
        Ok(())
    }

    async fn get_interface_config(&self, container: &str, ifname: &str) -> Result<String> {
        push(&self.calls, format!("exec {container} ip addr list {ifname}"));
        self.interface_output
            .lock()
            .expect("mock state")
            .get(container)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("container {container}")))
    }

    async fn delete_v4_address(&self, container: &str, addr: &str) -> Result<()> {
        push(&self.calls, format!("exec {container} ip addr del {addr}"));
        Ok(())
    }

    async fn add_v6_route(&self, container: &str, dest: &str, via: &str) -> Result<()> {
        push(
            &self.calls,
            format!("exec {container} ip -6 route add {dest} via {via}"),
        );
        Ok(())
    }
}

/// Fake [`CommandRunner`] with prefix-matched canned responses
#[derive(Default)]
pub struct MockRunner {
    pub calls: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, String)>>,
    failures: Mutex<Vec<(String, String)>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `output` for any invocation whose flattened command line
    /// starts with `prefix`
    pub fn respond_to(&self, prefix: &str, output: &str) {
        self.responses
            .lock()
            .expect("mock state")
            .push((prefix.to_string(), output.to_string()));
    }

    /// Fail any invocation whose flattened command line starts with `prefix`
    pub fn fail_on(&self, prefix: &str, message: &str) {
        self.failures
            .lock()
            .expect("mock state")
            .push((prefix.to_string(), message.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock log poisoned").clone()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let flat = if args.is_empty() {
            cmd.to_string()
        } else {
            format!("{cmd} {}", args.join(" "))
        };
        push(&self.calls, flat.clone());
        for (prefix, message) in self.failures.lock().expect("mock state").iter() {
            if flat.starts_with(prefix.as_str()) {
                return Err(Error::Command(message.clone()));
            }
        }
        for (prefix, output) in self.responses.lock().expect("mock state").iter() {
            if flat.starts_with(prefix.as_str()) {
                return Ok(output.clone());
            }
        }
        Ok(String::new())
    }
}

/// Build a [`super::Context`] wired entirely with mocks
pub fn mock_context(paths: crate::paths::Paths) -> (super::Context, MockHandles) {
    let net = Arc::new(MockNetwork::new());
    let runtime = Arc::new(MockRuntime::new());
    let runner = Arc::new(MockRunner::new());
    let ctx = super::Context {
        net: net.clone(),
        runtime: runtime.clone(),
        runner: runner.clone(),
        paths,
    };
    (ctx, MockHandles { net, runtime, runner })
}

/// Typed handles to the mocks inside a [`super::Context`]
pub struct MockHandles {
    pub net: Arc<MockNetwork>,
    pub runtime: Arc<MockRuntime>,
    pub runner: Arc<MockRunner>,
}
