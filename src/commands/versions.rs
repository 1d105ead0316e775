use anyhow::{Context, Result};
use tracing::info;

use crate::cli::VersionsArgs;
use crate::commands::connect;

pub fn run(args: VersionsArgs) -> Result<()> {
    let client = connect(&args.api)?;

    let core_versions = client
        .list_core_versions()
        .context("failed to list core dataset versions")?;
    for (id, name) in &core_versions {
        info!(id = %id, name = %name.as_deref().unwrap_or_default(), "core dataset version");
    }

    let metadata_versions = client
        .list_metadata_versions()
        .context("failed to list metadata versions")?;
    for version in &metadata_versions {
        info!(version = %version, "metadata version");
    }

    info!(
        core = core_versions.len(),
        metadata = metadata_versions.len(),
        latest_core = %core_versions.last().map(|(id, _)| id.as_str()).unwrap_or_default(),
        latest_metadata = %metadata_versions.last().map(String::as_str).unwrap_or_default(),
        "listed dataset versions"
    );
    Ok(())
}
