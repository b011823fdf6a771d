use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cluster::metadata::ClusterMetadata;
use crate::error::{ClusterError, Result};
use crate::registry::MetadataStore;

/// Stamps snapshots with `(term, generation)` and hands them to the registry.
///
/// Delivery to the other nodes is the registry's job; from here publication is fire-and-forget.
pub struct MetadataDistributor {
    store: Arc<dyn MetadataStore>,
    generation: AtomicU64,
}

impl MetadataDistributor {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            generation: AtomicU64::new(0),
        }
    }

    pub async fn distribute(
        &self,
        mut metadata: ClusterMetadata,
        term: u64,
        cancel: &CancellationToken,
    ) -> Result<Arc<ClusterMetadata>> {
        if cancel.is_cancelled() {
            return Err(ClusterError::LeadershipLost);
        }

        metadata.term = term;
        metadata.generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let metadata = Arc::new(metadata);
        self.store.publish_metadata(metadata.clone()).await?;

        tracing::info!(
            term,
            generation = metadata.generation,
            copy_sets = metadata.copy_sets.len(),
            "Cluster metadata published"
        );
        Ok(metadata)
    }
}
