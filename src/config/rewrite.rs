//! Line-level config file rewrite
//!
//! `init` injects the generated bootstrap token and CA-cert hash back
//! into the operator's YAML file. This is deliberately a line edit, not
//! a load-modify-dump round trip: comments and the operator's formatting
//! survive untouched.

/// Produce a new config file body with exactly one `token:` and one
/// `token-cert-hash:` line, placed immediately after the first `plugin:`
/// line. Stale copies anywhere in the file are dropped first, so the
/// transform is idempotent.
pub fn update_config_contents(contents: &str, token: &str, hash: &str) -> String {
    let mut out = String::with_capacity(contents.len() + 96);
    let mut inserted = false;
    for line in contents.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("token:") || trimmed.starts_with("token-cert-hash:") {
            continue;
        }
        out.push_str(line);
        out.push('\n');
        if !inserted && trimmed.starts_with("plugin:") {
            out.push_str(&format!("token: \"{token}\"\n"));
            out.push_str(&format!("token-cert-hash: \"{hash}\"\n"));
            inserted = true;
        }
    }
    out
}
