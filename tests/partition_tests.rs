
use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use jobmesh::catalog::InMemoryJobCatalog;
use jobmesh::cluster::{
    ClusterPartitioner, CopySet, DataInterval, LeaderSelector, MetadataDistributor, NodeId,
    RoundRobinLeaderSelector,
};
use jobmesh::registry::{InMemoryRegistry, MetadataStore};
use jobmesh::{ClusterError, Result};
use test_harness::{node_name, test_config, RecordingCatalog};

async fn registry_with_nodes(n: usize) -> Arc<InMemoryRegistry> {
    let registry = Arc::new(InMemoryRegistry::new());
    for i in 1..=n {
        registry.join(node_name(i)).await;
    }
    registry
}

fn partitioner(
    registry: Arc<InMemoryRegistry>,
    catalog: Arc<dyn jobmesh::catalog::JobCatalog>,
    replicas: usize,
    scatter_width: usize,
) -> ClusterPartitioner {
    ClusterPartitioner::new(
        &test_config("node-1", replicas, scatter_width),
        registry,
        catalog,
        Arc::new(RoundRobinLeaderSelector),
    )
}

/// Returns a node that is never part of the copy set
struct OutsiderSelector;

impl LeaderSelector for OutsiderSelector {
    fn select_leader(&self, _copy_set: &CopySet) -> Result<NodeId> {
        Ok("outsider".to_string())
    }
}

#[tokio::test]
async fn test_hundred_jobs_over_four_slots() {
    let registry = registry_with_nodes(4).await;
    let catalog = Arc::new(RecordingCatalog::with_ids(1000..1100));
    let partitioner = partitioner(registry, catalog.clone(), 2, 2);

    let metadata = partitioner
        .partition(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(catalog.requested_ranks(), vec![0, 25, 50, 75]);
    assert_eq!(metadata.interval_boundaries, vec![1000, 1025, 1050, 1075]);
    let intervals: Vec<DataInterval> = metadata
        .copy_sets
        .iter()
        .map(|cs| cs.data_interval.unwrap())
        .collect();
    assert_eq!(
        intervals,
        vec![
            DataInterval::new(1000, 1025),
            DataInterval::new(1025, 1050),
            DataInterval::new(1050, 1075),
            DataInterval::unbounded(1075),
        ]
    );
    assert!(metadata.covers_id_space());
}

#[tokio::test]
async fn test_slot_count_is_max_of_groups_and_nodes() {
    // 4 nodes, r=2, s=2 builds 2 groups; every node still gets a slot
    let registry = registry_with_nodes(4).await;
    let catalog = Arc::new(InMemoryJobCatalog::with_ids(0..40));
    let metadata = partitioner(registry, catalog, 2, 2)
        .partition(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(metadata.copy_sets.len(), 4);
    let ids: Vec<usize> = metadata.copy_sets.iter().map(|cs| cs.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    // Round robin over the two groups
    assert_eq!(metadata.copy_sets[0].servers, metadata.copy_sets[2].servers);
    assert_eq!(metadata.copy_sets[1].servers, metadata.copy_sets[3].servers);
    assert_ne!(metadata.copy_sets[0].servers, metadata.copy_sets[1].servers);
    assert_eq!(metadata.nodes, (1..=4).map(node_name).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_intervals_tile_id_space() {
    for n in 2..=9 {
        for job_count in [0u64, 1, 3, 7, 100, 1001] {
            let registry = registry_with_nodes(n).await;
            let catalog = Arc::new(InMemoryJobCatalog::with_ids((0..job_count).map(|i| i * 3 + 5)));
            let metadata = partitioner(registry, catalog, 2, 3)
                .partition(&CancellationToken::new())
                .await
                .unwrap();

            assert!(
                metadata.covers_id_space(),
                "n={} jobs={} boundaries={:?}",
                n,
                job_count,
                metadata.interval_boundaries
            );
            assert!(metadata.copy_sets.len() >= n);
            assert_eq!(metadata.copy_sets.len(), metadata.interval_boundaries.len());
        }
    }
}

#[tokio::test]
async fn test_every_job_has_exactly_one_owner() {
    let registry = registry_with_nodes(5).await;
    let catalog = Arc::new(InMemoryJobCatalog::with_ids(0..57));
    let metadata = partitioner(registry, catalog, 2, 2)
        .partition(&CancellationToken::new())
        .await
        .unwrap();

    for job_id in 0..57 {
        let owners = metadata
            .copy_sets
            .iter()
            .filter(|cs| cs.data_interval.unwrap().contains(job_id))
            .count();
        assert_eq!(owners, 1, "job {}", job_id);
    }
}

#[tokio::test]
async fn test_leaders_are_members() {
    let registry = registry_with_nodes(6).await;
    let catalog = Arc::new(InMemoryJobCatalog::with_ids(0..10));
    let metadata = partitioner(registry, catalog, 3, 5)
        .partition(&CancellationToken::new())
        .await
        .unwrap();

    for cs in &metadata.copy_sets {
        let leader = cs.leader.as_ref().expect("leader assigned");
        assert!(cs.servers.contains(leader));
    }
}

#[tokio::test]
async fn test_reused_groups_hand_each_slot_to_another_member() {
    // Disjoint pairs serve two slots each, so both members of every pair lead once
    for n in [2, 4, 6, 8, 10] {
        for seed in [0, 7, 42] {
            let registry = registry_with_nodes(n).await;
            let catalog = Arc::new(InMemoryJobCatalog::with_ids(0..100));
            let partitioner = ClusterPartitioner::new(
                &test_config("node-1", 2, 2).with_seed(seed),
                registry,
                catalog,
                Arc::new(RoundRobinLeaderSelector),
            );
            let metadata = partitioner.partition(&CancellationToken::new()).await.unwrap();

            let mut led: HashMap<NodeId, usize> = HashMap::new();
            for cs in &metadata.copy_sets {
                *led.entry(cs.leader.clone().unwrap()).or_default() += 1;
            }
            assert_eq!(led.len(), n, "n={} seed={} leaders={:?}", n, seed, led);
            assert!(led.values().all(|&count| count == 1));
        }
    }
}

#[tokio::test]
async fn test_no_running_nodes() {
    let registry = Arc::new(InMemoryRegistry::new());
    let catalog = Arc::new(InMemoryJobCatalog::with_ids(0..10));
    let result = partitioner(registry, catalog, 2, 2)
        .partition(&CancellationToken::new())
        .await;
    assert!(matches!(result, Err(ClusterError::NoRunningNodes)));
}

#[tokio::test]
async fn test_fewer_nodes_than_replicas() {
    let registry = registry_with_nodes(2).await;
    let catalog = Arc::new(RecordingCatalog::with_ids(0..10));
    let result = partitioner(registry, catalog.clone(), 3, 2)
        .partition(&CancellationToken::new())
        .await;
    assert!(matches!(result, Err(ClusterError::InsufficientNodes { .. })));
    assert!(catalog.requested_ranks().is_empty());
}

#[tokio::test]
async fn test_leader_outside_copy_set_aborts() {
    let registry = registry_with_nodes(4).await;
    let catalog = Arc::new(InMemoryJobCatalog::with_ids(0..10));
    let partitioner = ClusterPartitioner::new(
        &test_config("node-1", 2, 2),
        registry,
        catalog,
        Arc::new(OutsiderSelector),
    );
    let result = partitioner.partition(&CancellationToken::new()).await;
    assert!(matches!(result, Err(ClusterError::InvalidLeader { .. })));
}

#[tokio::test]
async fn test_cancelled_term_is_abandoned() {
    let registry = registry_with_nodes(4).await;
    let catalog = Arc::new(RecordingCatalog::with_ids(0..100));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = partitioner(registry, catalog.clone(), 2, 2)
        .partition(&cancel)
        .await;
    assert!(matches!(result, Err(ClusterError::LeadershipLost)));
    assert!(catalog.requested_ranks().is_empty());
}

#[tokio::test]
async fn test_distributor_refuses_after_cancellation() {
    let registry = registry_with_nodes(4).await;
    let catalog = Arc::new(InMemoryJobCatalog::with_ids(0..100));
    let cancel = CancellationToken::new();
    let metadata = partitioner(registry.clone(), catalog, 2, 2)
        .partition(&cancel)
        .await
        .unwrap();

    let distributor = MetadataDistributor::new(registry.clone());
    cancel.cancel();
    let result = distributor.distribute(metadata, 1, &cancel).await;

    assert!(matches!(result, Err(ClusterError::LeadershipLost)));
    assert_eq!(registry.publication_count().await, 0);
    assert!(registry.latest_metadata().await.unwrap().is_none());
}

#[tokio::test]
async fn test_distributor_stamps_term_and_generation() {
    let registry = registry_with_nodes(3).await;
    let catalog = Arc::new(InMemoryJobCatalog::with_ids(0..30));
    let partitioner = partitioner(registry.clone(), catalog, 2, 2);
    let distributor = MetadataDistributor::new(registry.clone());
    let cancel = CancellationToken::new();

    let first = partitioner.partition(&cancel).await.unwrap();
    let first = distributor.distribute(first, 4, &cancel).await.unwrap();
    let second = partitioner.partition(&cancel).await.unwrap();
    let second = distributor.distribute(second, 4, &cancel).await.unwrap();

    assert_eq!(first.version(), (4, 1));
    assert_eq!(second.version(), (4, 2));
    assert_eq!(registry.publication_count().await, 2);
    let latest = registry.latest_metadata().await.unwrap().unwrap();
    assert_eq!(latest.version(), (4, 2));
    // Same inputs, same layout
    assert_eq!(first.copy_sets, second.copy_sets);
}
