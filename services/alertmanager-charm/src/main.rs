//! Hook entry point for the Alertmanager charm.
//!
//! The platform runs this binary once per event, either as `dispatch` or
//! through a per-hook symlink such as `hooks/config-changed`.

use std::path::PathBuf;

use anyhow::Result;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let exec_path = std::env::args_os()
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("dispatch"));

    alertmanager_charm::run(&exec_path).await
}
