// ABOUTME: Finds the containers carrying the provenance label.
// ABOUTME: Used to pick a default upgrade target.

use super::traits::{ContainerError, ContainerFilters, ContainerOps, ContainerSummary};
use crate::types::Provenance;

/// Running containers labelled with `provenance`.
pub async fn find_managed_containers<R: ContainerOps + ?Sized>(
    runtime: &R,
    provenance: &Provenance,
) -> Result<Vec<ContainerSummary>, ContainerError> {
    let filters = ContainerFilters::with_label(&provenance.key, &provenance.value);
    let containers = runtime.list_containers(&filters).await?;
    tracing::debug!(count = containers.len(), label = %provenance, "found managed containers");
    Ok(containers)
}
