//! Bootstrap credential pipeline
//!
//! Runs on the control-plane host during `init`: stage a throwaway CA,
//! derive the CA-cert hash from its DER public key, obtain a bootstrap
//! token from kubeadm, and fold both back into the operator's config
//! file. A failed step aborts; re-running recreates the staging area
//! from scratch.

use std::path::Path;

use tracing::info;

use crate::config::validate::{validate_token, validate_token_cert_hash};
use crate::config::{Config, Node};
use crate::drivers::Context;
use crate::error::{Error, Result};
use crate::store;

const CA_KEY_BITS: &str = "2048";
const CA_VALID_DAYS: &str = "10000";

/// Create the CA staging area and derive the CA-cert hash
pub async fn create_certificates(cfg: &Config, node: &Node, ctx: &Context) -> Result<String> {
    let area = ctx.paths.cert_area();
    store::recreate_dir(&area, 0o700).await?;

    let key = area.join("ca.key");
    let crt = area.join("ca.crt");
    let x509 = area.join("ca.x509");
    let der = area.join("ca.rsa");

    let subject = format!("/CN={}", cfg.management_address(node)?);

    ctx.runner
        .run(
            "openssl",
            &["genrsa", "-out", &path_str(&key), CA_KEY_BITS],
        )
        .await?;
    ctx.runner
        .run(
            "openssl",
            &[
                "req",
                "-x509",
                "-new",
                "-nodes",
                "-key",
                &path_str(&key),
                "-subj",
                &subject,
                "-days",
                CA_VALID_DAYS,
                "-out",
                &path_str(&crt),
            ],
        )
        .await?;
    let pubkey = ctx
        .runner
        .run(
            "openssl",
            &["x509", "-pubkey", "-noout", "-in", &path_str(&crt)],
        )
        .await?;
    store::write_file(&x509, &pubkey, 0o600).await?;
    ctx.runner
        .run(
            "openssl",
            &[
                "rsa",
                "-pubin",
                "-in",
                &path_str(&x509),
                "-outform",
                "der",
                "-out",
                &path_str(&der),
            ],
        )
        .await?;
    let digest = ctx
        .runner
        .run("openssl", &["dgst", "-sha256", &path_str(&der)])
        .await?;

    let hash = parse_digest(&digest)?;
    validate_token_cert_hash(&hash)?;
    info!("created CA certificate and hash");
    Ok(hash)
}

/// Obtain a fresh bootstrap token from kubeadm
pub async fn create_token(ctx: &Context) -> Result<String> {
    let out = ctx.runner.run("kubeadm", &["token", "generate"]).await?;
    let token = out.trim().to_string();
    validate_token(&token)?;
    Ok(token)
}

/// Full `init` pipeline: certificates, token, then config file rewrite
pub async fn setup_bootstrap(
    cfg: &Config,
    node: &Node,
    ctx: &Context,
    config_path: &Path,
) -> Result<()> {
    let hash = create_certificates(cfg, node, ctx).await?;
    let token = create_token(ctx).await?;

    let contents = store::read(config_path).await?;
    let updated = crate::config::rewrite::update_config_contents(&contents, &token, &hash);
    let backup = backup_path(config_path);
    store::write_with_backup(&updated, config_path, &backup).await?;
    store::chmod_open(config_path).await?;
    if tokio::fs::try_exists(&backup).await.unwrap_or(false) {
        store::chmod_open(&backup).await?;
    }
    info!("saved token and CA certificate hash to {}", config_path.display());
    Ok(())
}

fn backup_path(path: &Path) -> std::path::PathBuf {
    let mut p = path.to_path_buf().into_os_string();
    p.push(".bak");
    std::path::PathBuf::from(p)
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Pull the hex digest out of `openssl dgst` output, which looks like
/// `SHA256(/tmp/lazyjack/certs/ca.rsa)= 3f4004...`
fn parse_digest(output: &str) -> Result<String> {
    output
        .split_whitespace()
        .last()
        .map(|s| s.to_lowercase())
        .ok_or_else(|| Error::Translation(format!("unparsable digest output {output:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validate::validate;
    use crate::drivers::mock::mock_context;
    use crate::paths::Paths;
    use tempfile::TempDir;

    const TOKEN: &str = "56cdce.7b18ad347f3de81c";
    const HASH: &str = "3f40043b6a6fb5675b84b3fe3ab18fe9e10d6fdeadf5497c12a52dfba4fc0252";

    fn config_yaml() -> String {
        r#"plugin: bridge
general:
  mode: ipv6
topology:
  my-master:
    interface: eth0
    id: 10
    opmodes: "master"
mgmt_net:
  cidr: "fd00:100::/64"
pod_net:
  prefix: "fd00:40:0:0:"
  size: 80
service_net:
  cidr: "fd00:30::/110"
"#
        .to_string()
    }

    #[test]
    fn test_parse_digest() {
        let hash = parse_digest("SHA256(ca.rsa)= 3F40043B6A6FB5675B84B3FE3AB18FE9E10D6FDEADF5497C12A52DFBA4FC0252\n").unwrap();
        assert_eq!(hash, HASH);
    }

    #[tokio::test]
    async fn test_setup_bootstrap_rewrites_config() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.yaml");
        tokio::fs::write(&config_path, config_yaml()).await.unwrap();

        let (ctx, mocks) = mock_context(Paths::with_base(temp.path()));
        mocks.runner.respond_to("kubeadm token generate", &format!("{TOKEN}\n"));
        mocks
            .runner
            .respond_to("openssl dgst -sha256", &format!("SHA256(ca.rsa)= {HASH}\n"));
        mocks.runner.respond_to(
            "openssl x509 -pubkey",
            "-----BEGIN PUBLIC KEY-----\nabc\n-----END PUBLIC KEY-----\n",
        );

        let mut cfg = Config::from_yaml(&config_yaml()).unwrap();
        validate(&mut cfg, "my-master", false).unwrap();
        let node = cfg.topology.get("my-master").unwrap();

        setup_bootstrap(&cfg, node, &ctx, &config_path).await.unwrap();

        let updated = tokio::fs::read_to_string(&config_path).await.unwrap();
        assert!(updated.contains(&format!("token: \"{TOKEN}\"")));
        assert!(updated.contains(&format!("token-cert-hash: \"{HASH}\"")));
        let backup = tokio::fs::read_to_string(temp.path().join("config.yaml.bak"))
            .await
            .unwrap();
        assert_eq!(backup, config_yaml());

        // Re-parse to confirm the rewrite kept the file loadable
        let mut cfg = Config::from_yaml(&updated).unwrap();
        validate(&mut cfg, "my-master", true).unwrap();

        // The openssl pipeline ran in order
        let calls = mocks.runner.calls();
        assert!(calls[0].starts_with("openssl genrsa"));
        assert!(calls[1].starts_with("openssl req -x509"));
        assert!(calls[2].starts_with("openssl x509 -pubkey"));
        assert!(calls[3].starts_with("openssl rsa -pubin"));
        assert!(calls[4].starts_with("openssl dgst -sha256"));
        assert_eq!(calls[5], "kubeadm token generate");
    }

    #[tokio::test]
    async fn test_bad_token_aborts() {
        let temp = TempDir::new().unwrap();
        let (ctx, mocks) = mock_context(Paths::with_base(temp.path()));
        mocks.runner.respond_to("kubeadm token generate", "not-a-token\n");
        assert!(create_token(&ctx).await.is_err());
    }
}
