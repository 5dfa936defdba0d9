//! Support network and DNS64/NAT64 container lifecycle
//!
//! A DNS64/NAT64 host runs two auxiliary containers on a dedicated
//! user-defined bridge network: bind9 synthesizing AAAA records and
//! TAYGA translating the synthesized traffic back to v4. All of the
//! creation paths are idempotent so `prepare` can be re-run after a
//! partial failure.

use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::config::{
    Config, DNS64_IMAGE, DNS64_NAME, Dns64, NAT64_IMAGE, NAT64_NAME, RESOURCE_LABEL,
    SUPPORT_NET_NAME,
};
use crate::drivers::{Context, ResourceState};
use crate::error::{Error, Result};
use crate::net::{build_gateway_ip, parse_cidr, parse_ip};
use crate::store;

/// Render the bind9 configuration for the DNS64 container.
///
/// The upstream v4 resolver is reached through the synthesis prefix, so
/// the forwarder address embeds it. Unless the operator allows real AAAA
/// records, every v6 answer is synthesized.
pub fn named_conf_contents(dns64: &Dns64) -> String {
    let exclude = if dns64.allow_aaaa_use {
        ""
    } else {
        "\n        exclude { any; };"
    };
    format!(
        r#"options {{
    directory "/var/bind";
    allow-query {{ any; }};
    forwarders {{
        {prefix}{remote};
    }};
    auth-nxdomain no;    # conform to RFC1035
    listen-on-v6 {{ any; }};
    dns64 {prefix}/{size} {{{exclude}
    }};
}};
"#,
        prefix = dns64.prefix,
        remote = dns64.remote_server,
        size = dns64.prefix_size,
    )
}

/// argv (after `run`) for the DNS64 container
fn dns64_run_args(cfg: &Config, conf_path: &str) -> Vec<String> {
    vec![
        "-d".into(),
        "--name".into(),
        DNS64_NAME.into(),
        "--hostname".into(),
        DNS64_NAME.into(),
        "--label".into(),
        RESOURCE_LABEL.into(),
        "--privileged=true".into(),
        "--ip6".into(),
        cfg.dns64.ip.clone(),
        "--dns".into(),
        cfg.dns64.ip.clone(),
        "--sysctl".into(),
        "net.ipv6.conf.all.disable_ipv6=0".into(),
        "--sysctl".into(),
        "net.ipv6.conf.all.forwarding=1".into(),
        "-v".into(),
        format!("{conf_path}:/etc/bind/named.conf"),
        "--net".into(),
        SUPPORT_NET_NAME.into(),
        DNS64_IMAGE.into(),
    ]
}

/// argv (after `run`) for the NAT64 container
fn nat64_run_args(cfg: &Config) -> Vec<String> {
    vec![
        "-d".into(),
        "--name".into(),
        NAT64_NAME.into(),
        "--hostname".into(),
        NAT64_NAME.into(),
        "--label".into(),
        RESOURCE_LABEL.into(),
        "--privileged=true".into(),
        "--ip6".into(),
        cfg.nat64.ip.clone(),
        "--sysctl".into(),
        "net.ipv6.conf.all.disable_ipv6=0".into(),
        "--sysctl".into(),
        "net.ipv6.conf.all.forwarding=1".into(),
        "-e".into(),
        format!(
            "TAYGA_CONF_PREFIX={}/{}",
            cfg.dns64.prefix, cfg.dns64.prefix_size
        ),
        "-e".into(),
        format!("TAYGA_CONF_IPV4_ADDR={}", cfg.nat64.v4_ip),
        "--net".into(),
        SUPPORT_NET_NAME.into(),
        NAT64_IMAGE.into(),
    ]
}

/// Create the auxiliary network unless it is already there
pub async fn ensure_support_network(cfg: &Config, ctx: &Context) -> Result<()> {
    match ctx.runtime.resource_state(SUPPORT_NET_NAME).await {
        ResourceState::Exists | ResourceState::Running => {
            info!("skipping {SUPPORT_NET_NAME} creation, already exists");
            Ok(())
        }
        ResourceState::NotPresent => {
            let gateway = build_gateway_ip(&cfg.support_net.info.prefix, 1);
            match ctx
                .runtime
                .create_network(
                    SUPPORT_NET_NAME,
                    &cfg.support_net.cidr,
                    &cfg.support_net.v4_cidr,
                    &gateway,
                )
                .await
            {
                Err(e) if e.is_skippable() => {
                    info!("skipping {SUPPORT_NET_NAME} creation: {e}");
                    Ok(())
                }
                other => other,
            }
        }
    }
}

/// Delete the auxiliary network, tolerating its absence
pub async fn remove_support_network(ctx: &Context) -> Result<()> {
    match ctx.runtime.delete_network(SUPPORT_NET_NAME).await {
        Err(e) if e.is_skippable() => {
            info!("skipping {SUPPORT_NET_NAME} removal: {e}");
            Ok(())
        }
        other => other,
    }
}

fn v4_addr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"inet\s+(\d+\.\d+\.\d+\.\d+/\d+)").expect("hard-coded pattern")
    })
}

/// Pull the first v4 address (CIDR form) out of `ip addr list` output
pub fn parse_v4_address(output: &str) -> Result<String> {
    v4_addr_re()
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::Translation(format!("no v4 address in {output:?}")))
}

/// Bring up and wire the DNS64 container
pub async fn prepare_dns64(cfg: &Config, ctx: &Context) -> Result<()> {
    ensure_support_network(cfg, ctx).await?;

    if ctx.runtime.resource_state(DNS64_NAME).await == ResourceState::Running {
        info!("skipping {DNS64_NAME} container, already running");
        return Ok(());
    }
    ctx.runtime.delete_container(DNS64_NAME).await?;

    store::ensure_dir(ctx.paths.dns64_conf_area(), 0o755).await?;
    let conf = ctx.paths.dns64_conf();
    store::write_file(&conf, &named_conf_contents(&cfg.dns64), 0o644).await?;
    ctx.runtime
        .run_container(DNS64_NAME, &dns64_run_args(cfg, &conf.to_string_lossy()))
        .await?;

    // The runtime hands the container a v4 address on the support net;
    // the DNS64 side must be v6-only, with synthesized traffic routed to
    // the translator.
    let output = ctx.runtime.get_interface_config(DNS64_NAME, "eth0").await?;
    let v4 = parse_v4_address(&output)?;
    ctx.runtime.delete_v4_address(DNS64_NAME, &v4).await?;
    let synthesis = format!("{}/{}", cfg.dns64.prefix, cfg.dns64.prefix_size);
    ctx.runtime
        .add_v6_route(DNS64_NAME, &synthesis, &cfg.nat64.ip)
        .await?;
    info!("started and configured {DNS64_NAME} container");
    Ok(())
}

/// Bring up the NAT64 container and route the mapped v4 pool to it
pub async fn prepare_nat64(cfg: &Config, ctx: &Context) -> Result<()> {
    ensure_support_network(cfg, ctx).await?;

    if ctx.runtime.resource_state(NAT64_NAME).await == ResourceState::Running {
        info!("skipping {NAT64_NAME} container, already running");
    } else {
        ctx.runtime.delete_container(NAT64_NAME).await?;
        ctx.runtime
            .run_container(NAT64_NAME, &nat64_run_args(cfg))
            .await?;
    }

    let dest = parse_cidr(&cfg.nat64.v4_cidr)?;
    let gw = parse_ip(&cfg.nat64.v4_ip)?;
    let covering = parse_cidr(&cfg.support_net.v4_cidr)?;
    match ctx.net.add_route_by_cidr(dest, gw, covering).await {
        Err(e) if e.is_skippable() => {
            info!("skipping host route to {dest}: {e}");
            Ok(())
        }
        other => other,
    }
}

/// Stop the DNS64 container
pub async fn remove_dns64(ctx: &Context) -> Result<()> {
    ctx.runtime.delete_container(DNS64_NAME).await
}

/// Stop the NAT64 container and withdraw the host route to its v4 pool
pub async fn remove_nat64(cfg: &Config, ctx: &Context) -> Result<()> {
    ctx.runtime.delete_container(NAT64_NAME).await?;
    let dest = parse_cidr(&cfg.nat64.v4_cidr)?;
    let gw = parse_ip(&cfg.nat64.v4_ip)?;
    let covering = parse_cidr(&cfg.support_net.v4_cidr)?;
    match ctx.net.delete_route_by_cidr(dest, gw, covering).await {
        Err(e) if e.is_skippable() => {
            info!("skipping host route removal for {dest}: {e}");
            Ok(())
        }
        other => other,
    }
}
