//! Command handlers for the cadence CLI.

use anyhow::{bail, Result};
use std::path::PathBuf;

use cadence::paths;

pub mod cache;
pub mod cancel;
pub mod init;
pub mod list;
pub mod logs;
pub mod run;
pub mod status;
pub mod util;
pub mod validate;

/// Check that the current directory has been initialized and return the
/// workflows directory.
pub fn ensure_initialized() -> Result<PathBuf> {
    let workflows_dir = PathBuf::from(paths::WORKFLOWS_DIR);
    if !workflows_dir.exists() {
        bail!("Cadence not initialized. Run `cadence init` first.");
    }
    Ok(workflows_dir)
}
