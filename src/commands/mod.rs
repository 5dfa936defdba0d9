//! Verb orchestration
//!
//! One module per verb. `init`, `prepare`, and `up` abort on the first
//! fatal error and rely on idempotent steps for replay; `down` and
//! `clean` are best-effort reversals that demote failures to warnings.

pub mod clean;
pub mod down;
pub mod init;
pub mod prepare;
pub mod up;

use tracing::warn;

use crate::error::Result;

/// Log a failed teardown step and keep going
fn demote(step: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("unable to {step}: {e}");
    }
}
