use std::collections::{BTreeSet, HashMap, HashSet};

use jobmesh::cluster::{CopySet, CopySetBuilder, NodeId};
use jobmesh::ClusterError;

fn nodes(n: usize) -> Vec<NodeId> {
    (1..=n).map(|i| format!("n{}", i)).collect()
}

fn peers_per_node(copy_sets: &[CopySet]) -> HashMap<NodeId, BTreeSet<NodeId>> {
    let mut peers: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();
    for cs in copy_sets {
        for member in &cs.servers {
            peers
                .entry(member.clone())
                .or_default()
                .extend(cs.servers.iter().cloned());
        }
    }
    peers
}

#[test]
fn test_four_nodes_pair_up_once() {
    let copy_sets = CopySetBuilder::new(7).build(&nodes(4), 2, 2).unwrap();

    assert_eq!(copy_sets.len(), 2);
    let mut appearances: HashMap<&str, usize> = HashMap::new();
    for cs in &copy_sets {
        assert_eq!(cs.servers.len(), 2);
        for member in &cs.servers {
            *appearances.entry(member.as_str()).or_default() += 1;
        }
    }
    assert_eq!(appearances.len(), 4);
    assert!(appearances.values().all(|&count| count == 1));
}

#[test]
fn test_groups_have_distinct_members_and_cover_every_node() {
    for replicas in 1..=4 {
        for scatter_width in 1..=6 {
            for n in replicas..=16 {
                for seed in [0, 1, 42] {
                    let input = nodes(n);
                    let copy_sets = CopySetBuilder::new(seed)
                        .build(&input, replicas, scatter_width)
                        .unwrap();

                    let mut covered = HashSet::new();
                    for cs in &copy_sets {
                        let distinct: HashSet<&NodeId> = cs.servers.iter().collect();
                        assert_eq!(
                            distinct.len(),
                            replicas,
                            "n={} r={} s={} group {:?}",
                            n,
                            replicas,
                            scatter_width,
                            cs.servers
                        );
                        assert!(cs.servers.iter().all(|m| input.contains(m)));
                        covered.extend(cs.servers.iter().cloned());
                    }
                    assert_eq!(covered.len(), n, "n={} r={} s={}", n, replicas, scatter_width);
                }
            }
        }
    }
}

#[test]
fn test_build_is_deterministic() {
    let builder = CopySetBuilder::new(99);
    let first = builder.build(&nodes(11), 3, 5).unwrap();
    let second = builder.build(&nodes(11), 3, 5).unwrap();
    assert_eq!(first, second);

    // Input order does not matter, only the node set
    let mut shuffled = nodes(11);
    shuffled.reverse();
    assert_eq!(first, builder.build(&shuffled, 3, 5).unwrap());
}

#[test]
fn test_ids_are_sequential_and_groups_unique() {
    let copy_sets = CopySetBuilder::new(3).build(&nodes(9), 3, 7).unwrap();
    let ids: Vec<usize> = copy_sets.iter().map(|cs| cs.id).collect();
    assert_eq!(ids, (0..copy_sets.len()).collect::<Vec<_>>());

    let unique: HashSet<Vec<NodeId>> = copy_sets.iter().map(|cs| cs.servers.clone()).collect();
    assert_eq!(unique.len(), copy_sets.len());
    assert!(copy_sets.iter().all(|cs| cs.leader.is_none() && cs.data_interval.is_none()));
}

#[test]
fn test_scatter_width_bounds_peers_when_nodes_divide_evenly() {
    for (replicas, scatter_width) in [(2, 2), (2, 4), (3, 3), (3, 5), (3, 7)] {
        let n = replicas * 4;
        let copy_sets = CopySetBuilder::new(5)
            .build(&nodes(n), replicas, scatter_width)
            .unwrap();
        let bound = scatter_width.max(replicas);
        for (node, peers) in peers_per_node(&copy_sets) {
            assert!(
                peers.len() <= bound,
                "{} has {} peers, bound {} (r={} s={})",
                node,
                peers.len(),
                bound,
                replicas,
                scatter_width
            );
        }
    }
}

#[test]
fn test_wider_scatter_produces_more_groups() {
    let narrow = CopySetBuilder::new(11).build(&nodes(12), 3, 3).unwrap();
    let wide = CopySetBuilder::new(11).build(&nodes(12), 3, 9).unwrap();
    assert_eq!(narrow.len(), 4);
    assert!(wide.len() > narrow.len());
}

#[test]
fn test_fewer_nodes_than_replicas_is_rejected() {
    let result = CopySetBuilder::new(0).build(&nodes(2), 3, 2);
    assert!(matches!(
        result,
        Err(ClusterError::InsufficientNodes {
            available: 2,
            required: 3
        })
    ));
}

#[test]
fn test_zero_parameters_are_invalid() {
    let builder = CopySetBuilder::new(0);
    assert!(matches!(
        builder.build(&nodes(4), 0, 2),
        Err(ClusterError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        builder.build(&nodes(4), 2, 0),
        Err(ClusterError::InvalidConfiguration(_))
    ));
    // Configuration is checked before the node count
    assert!(matches!(
        builder.build(&[], 0, 0),
        Err(ClusterError::InvalidConfiguration(_))
    ));
}
