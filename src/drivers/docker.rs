//! Docker-compatible container runtime driver
//!
//! Shells out to the `docker` CLI through a [`CommandRunner`], so tests
//! can observe the exact argv the runtime would receive.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{CommandRunner, ResourceState, RuntimeDriver};
use crate::error::{Error, Result};

/// Driver over the `docker` binary
pub struct DockerDriver {
    runner: Arc<dyn CommandRunner>,
}

impl DockerDriver {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn docker(&self, args: &[&str]) -> Result<String> {
        self.runner.run("docker", args).await
    }
}

#[async_trait]
impl RuntimeDriver for DockerDriver {
    async fn resource_state(&self, name: &str) -> ResourceState {
        // Plain inspect works for both containers and networks; a
        // `-f {{.State.Running}}` template would error on networks,
        // which carry no State block.
        let out = match self.docker(&["inspect", name]).await {
            Ok(out) => out,
            Err(e) => {
                debug!("inspect of {name} failed ({e}), treating as not present");
                return ResourceState::NotPresent;
            }
        };
        match serde_json::from_str::<serde_json::Value>(&out) {
            Ok(v) if v[0]["State"]["Running"].as_bool() == Some(true) => ResourceState::Running,
            _ => ResourceState::Exists,
        }
    }

    async fn create_network(
        &self,
        name: &str,
        v6_cidr: &str,
        v4_cidr: &str,
        gateway: &str,
    ) -> Result<()> {
        self.docker(&[
            "network",
            "create",
            "--ipv6",
            "--subnet",
            v6_cidr,
            "--subnet",
            v4_cidr,
            "--gateway",
            gateway,
            name,
        ])
        .await
        .map(|_| ())
        .map_err(|e| translate_exists(e, name))
    }

    async fn delete_network(&self, name: &str) -> Result<()> {
        self.docker(&["network", "rm", name])
            .await
            .map(|_| ())
            .map_err(|e| translate_missing(e, name))
    }

    async fn run_container(&self, name: &str, args: &[String]) -> Result<()> {
        let mut argv: Vec<&str> = vec!["run"];
        argv.extend(args.iter().map(String::as_str));
        debug!("starting container {name}");
        self.docker(&argv).await.map(|_| ())
    }

    async fn delete_container(&self, name: &str) -> Result<()> {
        match self.docker(&["rm", "-f", "-v", name]).await {
            Ok(_) => Ok(()),
            Err(e) => match translate_missing(e, name) {
                Error::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn get_interface_config(&self, container: &str, ifname: &str) -> Result<String> {
        self.docker(&["exec", container, "ip", "addr", "list", ifname])
            .await
    }

    async fn delete_v4_address(&self, container: &str, addr: &str) -> Result<()> {
        self.docker(&["exec", container, "ip", "addr", "del", addr, "dev", "eth0"])
            .await
            .map(|_| ())
    }

    async fn add_v6_route(&self, container: &str, dest: &str, via: &str) -> Result<()> {
        self.docker(&["exec", container, "ip", "-6", "route", "add", dest, "via", via])
            .await
            .map(|_| ())
            .map_err(|e| translate_exists(e, dest))
    }
}

fn translate_exists(e: Error, what: &str) -> Error {
    let msg = e.to_string();
    if msg.contains("already exists") || msg.contains("File exists") {
        Error::AlreadyExists(what.to_string())
    } else {
        e
    }
}

fn translate_missing(e: Error, what: &str) -> Error {
    let msg = e.to_string();
    if msg.contains("No such") || msg.contains("not found") {
        Error::NotFound(what.to_string())
    } else {
        e
    }
}
