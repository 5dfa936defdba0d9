//! Well-known host paths
//!
//! Everything lazyjack writes on a host lives at one of these locations.
//! Tests redirect the whole set under a temporary root.

use std::path::{Path, PathBuf};

/// Scratch area for generated artifacts (certs, named.conf)
pub const WORK_AREA: &str = "/tmp/lazyjack";

/// Directory the kubelet/runtime reads CNI configs from
pub const CNI_AREA: &str = "/etc/cni/net.d";

/// Systemd drop-in directory for the kubelet service
pub const KUBELET_DROPIN_DIR: &str = "/etc/systemd/system/kubelet.service.d";

/// Drop-in file that injects the DNS64 resolver into kubelet args
pub const KUBELET_DROPIN_FILE: &str = "20-extra-dns-args.conf";

/// Host paths touched by the tool
#[derive(Debug, Clone)]
pub struct Paths {
    /// Scratch area (default: /tmp/lazyjack)
    pub work_area: PathBuf,
    /// CNI config directory (default: /etc/cni/net.d)
    pub cni_area: PathBuf,
    /// Hosts file (default: /etc/hosts)
    pub etc_hosts: PathBuf,
    /// Kubelet drop-in directory (default: /etc/systemd/system/kubelet.service.d)
    pub kubelet_dropin_dir: PathBuf,
    /// kubeadm config rendered on the master during `up`
    pub kubeadm_conf: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    /// Create with the standard host paths
    pub fn new() -> Self {
        Self {
            work_area: PathBuf::from(WORK_AREA),
            cni_area: PathBuf::from(CNI_AREA),
            etc_hosts: PathBuf::from("/etc/hosts"),
            kubelet_dropin_dir: PathBuf::from(KUBELET_DROPIN_DIR),
            kubeadm_conf: PathBuf::from("/tmp/kubeadm.conf"),
        }
    }

    /// Relocate every path under `root` (useful for testing)
    pub fn with_base(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            work_area: root.join("tmp/lazyjack"),
            cni_area: root.join("etc/cni/net.d"),
            etc_hosts: root.join("etc/hosts"),
            kubelet_dropin_dir: root.join("etc/systemd/system/kubelet.service.d"),
            kubeadm_conf: root.join("tmp/kubeadm.conf"),
        }
    }

    /// Certificate staging area under the work area
    pub fn cert_area(&self) -> PathBuf {
        self.work_area.join("certs")
    }

    /// Directory holding the generated bind9 named.conf
    pub fn dns64_conf_area(&self) -> PathBuf {
        self.work_area.join("bind9")
    }

    /// Full path of the generated named.conf
    pub fn dns64_conf(&self) -> PathBuf {
        self.dns64_conf_area().join("named.conf")
    }

    /// Backup sibling of the hosts file
    pub fn etc_hosts_backup(&self) -> PathBuf {
        let mut p = self.etc_hosts.clone().into_os_string();
        p.push(".bak");
        PathBuf::from(p)
    }

    /// Full path of the kubelet drop-in file
    pub fn kubelet_dropin(&self) -> PathBuf {
        self.kubelet_dropin_dir.join(KUBELET_DROPIN_FILE)
    }
}
