//! Verb-level integration tests against the recording drivers

use lazyjack::Verb;
use lazyjack::config::validate::validate;
use lazyjack::config::Config;
use lazyjack::drivers::mock::{MockHandles, mock_context};
use lazyjack::drivers::{Context, ResourceState, RuntimeDriver};
use lazyjack::paths::Paths;
use lazyjack::run_with_context;
use tempfile::TempDir;

const TOKEN: &str = "56cdce.7b18ad347f3de81c";
const HASH: &str = "3f40043b6a6fb5675b84b3fe3ab18fe9e10d6fdeadf5497c12a52dfba4fc0252";

const HOSTS: &str = concat!(
    "127.0.0.1 localhost\n",
    "10.0.0.5 my-master\n",
    "::1 ip6-localhost\n",
);

const BIND9_ETH0: &str = concat!(
    "4: eth0@if5: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500\n",
    "    inet 172.18.0.2/24 brd 172.18.0.255 scope global eth0\n",
    "    inet6 fd00:10::100/64 scope global nodad\n",
);

fn cluster_yaml() -> String {
    format!(
        r#"plugin: bridge
general:
  mode: ipv6
topology:
  my-master:
    interface: eth0
    id: 10
    opmodes: "master dns64 nat64"
  my-minion:
    interface: eth1
    id: 20
    opmodes: "minion"
support_net:
  cidr: "fd00:10::/64"
  v4_cidr: "172.18.0.0/24"
mgmt_net:
  cidr: "fd00:100::/64"
pod_net:
  prefix: "fd00:40:0:0:"
  size: 80
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

struct Lab {
    temp: TempDir,
    cfg: Config,
    ctx: Context,
    mocks: MockHandles,
}

impl Lab {
    async fn new(host: &str) -> Self {
        let temp = TempDir::new().unwrap();
        tokio::fs::create_dir_all(temp.path().join("etc")).await.unwrap();
        tokio::fs::create_dir_all(temp.path().join("tmp")).await.unwrap();
        tokio::fs::write(temp.path().join("etc/hosts"), HOSTS).await.unwrap();

        let mut cfg = Config::from_yaml(&cluster_yaml()).unwrap();
        validate(&mut cfg, host, true).unwrap();
        let (ctx, mocks) = mock_context(Paths::with_base(temp.path()));
        Self { temp, cfg, ctx, mocks }
    }

    fn config_path(&self) -> std::path::PathBuf {
        self.temp.path().join("config.yaml")
    }

    async fn dispatch(&self, verb: Verb, host: &str) -> lazyjack::Result<()> {
        run_with_context(verb, &self.cfg, host, &self.ctx, &self.config_path()).await
    }
}

#[tokio::test]
async fn test_prepare_master_with_dns64() {
    let lab = Lab::new("my-master").await;
    lab.mocks.runtime.set_interface_output("bind9", BIND9_ETH0);

    lab.dispatch(Verb::Prepare, "my-master").await.unwrap();

    // management address on the node's interface
    let net_calls = lab.mocks.net.calls();
    assert_eq!(net_calls[0], "addr add fd00:100::10/64 dev eth0");
    // host route for the NAT64 mapped pool
    assert!(net_calls.contains(
        &"route add 172.18.0.128/25 via 172.18.0.200 covering 172.18.0.0/24".to_string()
    ));

    // hosts file annotated and backed up
    let hosts = tokio::fs::read_to_string(&lab.ctx.paths.etc_hosts).await.unwrap();
    assert!(hosts.contains("#[-] 10.0.0.5 my-master"));
    assert!(hosts.contains("fd00:100::10 my-master  #[+]"));
    assert!(hosts.contains("fd00:100::20 my-minion  #[+]"));
    let backup = tokio::fs::read_to_string(lab.ctx.paths.etc_hosts_backup()).await.unwrap();
    assert_eq!(backup, HOSTS);

    // kubelet drop-in points at the DNS64 resolver
    let dropin = tokio::fs::read_to_string(lab.ctx.paths.kubelet_dropin()).await.unwrap();
    assert!(dropin.contains("--cluster-dns=fd00:10::100"));

    // both containers came up on the support network, DNS64 first
    let runtime_calls = lab.mocks.runtime.calls();
    assert!(runtime_calls.iter().any(|c| c.starts_with("network create support_net")));
    let bind9_at = runtime_calls
        .iter()
        .position(|c| c.contains("--name bind9"))
        .unwrap();
    let tayga_at = runtime_calls
        .iter()
        .position(|c| c.contains("--name tayga"))
        .unwrap();
    assert!(bind9_at < tayga_at);
    assert!(runtime_calls.contains(&"exec bind9 ip addr del 172.18.0.2/24".to_string()));
}

#[tokio::test]
async fn test_prepare_is_rerunnable() {
    let lab = Lab::new("my-master").await;
    lab.mocks.runtime.set_interface_output("bind9", BIND9_ETH0);

    lab.dispatch(Verb::Prepare, "my-master").await.unwrap();
    let after_first = tokio::fs::read_to_string(&lab.ctx.paths.etc_hosts).await.unwrap();

    // second run: containers report running, route already present
    lab.dispatch(Verb::Prepare, "my-master").await.unwrap();
    let after_second = tokio::fs::read_to_string(&lab.ctx.paths.etc_hosts).await.unwrap();
    assert_eq!(after_first, after_second);
    assert_eq!(
        lab.mocks.runtime.resource_state("bind9").await,
        ResourceState::Running
    );
}

#[tokio::test]
async fn test_prepare_minion_skips_support_services() {
    let lab = Lab::new("my-minion").await;
    lab.dispatch(Verb::Prepare, "my-minion").await.unwrap();

    assert_eq!(lab.mocks.net.calls(), vec!["addr add fd00:100::20/64 dev eth1"]);
    assert!(lab.mocks.runtime.calls().is_empty());
    // the drop-in is still written: pods on this node resolve via DNS64
    assert!(lab.ctx.paths.kubelet_dropin().exists());
}

#[tokio::test]
async fn test_up_master_runs_kubeadm_init() {
    let lab = Lab::new("my-master").await;
    lab.dispatch(Verb::Up, "my-master").await.unwrap();

    let cni_conf = tokio::fs::read_to_string(lab.ctx.paths.cni_area.join("cni.conf"))
        .await
        .unwrap();
    assert!(cni_conf.contains("\"subnet\": \"fd00:40:0:0:a::/80\""));

    let kubeadm_conf = tokio::fs::read_to_string(&lab.ctx.paths.kubeadm_conf).await.unwrap();
    assert!(kubeadm_conf.contains("advertiseAddress: \"fd00:100::10\""));

    // route to the peer's pod subnet, then kubeadm init
    assert_eq!(
        lab.mocks.net.calls()[0],
        "route add fd00:40:0:0:14::/80 via fd00:100::20 dev eth0"
    );
    let runner_calls = lab.mocks.runner.calls();
    assert_eq!(
        runner_calls[0],
        format!("kubeadm init --config={}", lab.ctx.paths.kubeadm_conf.display())
    );
}

#[tokio::test]
async fn test_up_minion_runs_kubeadm_join() {
    let lab = Lab::new("my-minion").await;
    lab.dispatch(Verb::Up, "my-minion").await.unwrap();

    let runner_calls = lab.mocks.runner.calls();
    assert_eq!(
        runner_calls[0],
        format!(
            "kubeadm join --token {TOKEN} [fd00:100::10]:6443 \
             --discovery-token-ca-cert-hash sha256:{HASH}"
        )
    );
}

#[tokio::test]
async fn test_down_removes_cni_area() {
    let lab = Lab::new("my-master").await;
    lab.dispatch(Verb::Up, "my-master").await.unwrap();
    assert!(lab.ctx.paths.cni_area.join("cni.conf").exists());

    lab.dispatch(Verb::Down, "my-master").await.unwrap();
    assert!(!lab.ctx.paths.cni_area.exists());

    // the routes added by up were deleted again
    let net_calls = lab.mocks.net.calls();
    assert!(net_calls.contains(
        &"route del fd00:40:0:0:14::/80 via fd00:100::20 dev eth0".to_string()
    ));
}

#[tokio::test]
async fn test_down_without_up_is_harmless() {
    let lab = Lab::new("my-master").await;
    lab.dispatch(Verb::Down, "my-master").await.unwrap();
}

#[tokio::test]
async fn test_clean_reverts_prepare() {
    let lab = Lab::new("my-master").await;
    lab.mocks.runtime.set_interface_output("bind9", BIND9_ETH0);

    lab.dispatch(Verb::Prepare, "my-master").await.unwrap();
    lab.dispatch(Verb::Clean, "my-master").await.unwrap();

    // hosts file restored to its pre-prepare content
    let hosts = tokio::fs::read_to_string(&lab.ctx.paths.etc_hosts).await.unwrap();
    assert_eq!(hosts, HOSTS);

    assert!(!lab.ctx.paths.kubelet_dropin().exists());

    // address removed, containers and network gone
    let net_calls = lab.mocks.net.calls();
    assert!(net_calls.contains(&"addr del fd00:100::10/64 dev eth0".to_string()));
    let runtime_calls = lab.mocks.runtime.calls();
    assert!(runtime_calls.contains(&"rm bind9".to_string()));
    assert!(runtime_calls.contains(&"rm tayga".to_string()));
    assert!(runtime_calls.contains(&"network rm support_net".to_string()));
    assert_eq!(
        lab.mocks.runtime.resource_state("support_net").await,
        ResourceState::NotPresent
    );
}

#[tokio::test]
async fn test_clean_on_unprepared_host_warns_and_succeeds() {
    let lab = Lab::new("my-minion").await;
    lab.dispatch(Verb::Clean, "my-minion").await.unwrap();
}

#[tokio::test]
async fn test_init_rewrites_config_on_master_only() {
    let lab = Lab::new("my-master").await;
    tokio::fs::write(lab.config_path(), cluster_yaml()).await.unwrap();
    lab.mocks.runner.respond_to("kubeadm token generate", &format!("{TOKEN}\n"));
    lab.mocks
        .runner
        .respond_to("openssl dgst -sha256", &format!("SHA256(ca.rsa)= {HASH}\n"));
    lab.mocks.runner.respond_to("openssl x509 -pubkey", "-----BEGIN PUBLIC KEY-----\n");

    lab.dispatch(Verb::Init, "my-master").await.unwrap();
    let rewritten = tokio::fs::read_to_string(lab.config_path()).await.unwrap();
    assert!(rewritten.contains(&format!("token: \"{TOKEN}\"")));

    // a worker has nothing to do for init
    let minion_lab = Lab::new("my-minion").await;
    minion_lab.dispatch(Verb::Init, "my-minion").await.unwrap();
    assert!(minion_lab.mocks.runner.calls().is_empty());
}
