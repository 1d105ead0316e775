use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::api::Catalog;
use crate::model::ManifestoRecord;

pub(super) fn fetch_metadata<C: Catalog + ?Sized>(
    catalog: &C,
    parties: &[u32],
) -> Result<Vec<ManifestoRecord>> {
    let mut requested: Vec<u32> = Vec::with_capacity(parties.len());
    for party in parties {
        if !requested.contains(party) {
            requested.push(*party);
        }
    }

    if requested.is_empty() {
        bail!("no party identifiers requested");
    }

    info!(parties = ?requested, "fetching manifesto metadata");
    let records = catalog
        .metadata(&requested)
        .context("failed to fetch manifesto metadata")?;

    let unkeyed = records.iter().filter(|record| record.id().is_none()).count();
    if unkeyed > 0 {
        warn!(count = unkeyed, "metadata records without manifesto_id");
    }
    info!(count = records.len(), "metadata fetched");

    Ok(records)
}
