use std::sync::Arc;
use std::time::Duration;

use crate::registry::MembershipService;

/// Holds startup back until enough nodes are running.
pub struct MembershipGate {
    membership: Arc<dyn MembershipService>,
    poll_interval: Duration,
}

impl MembershipGate {
    pub fn new(membership: Arc<dyn MembershipService>, poll_interval: Duration) -> Self {
        Self {
            membership,
            poll_interval,
        }
    }

    /// Poll the running-node count until it reaches `min_count`. Never times out.
    ///
    /// Returns the count observed on the successful poll.
    pub async fn await_quorum(&self, min_count: usize) -> usize {
        loop {
            match self.membership.running_node_count().await {
                Ok(count) if count >= min_count => {
                    tracing::info!(running = count, required = min_count, "Quorum reached");
                    return count;
                }
                Ok(count) => {
                    tracing::debug!(running = count, required = min_count, "Waiting for quorum");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read running node count");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
