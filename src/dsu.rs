//! # Disjoint Set Union
//!
//! Union-Find with path halving and union by rank, used to build the
//! transitive-closure clusters of ground-truth match pairs.

use rustc_hash::FxHashMap;

/// Union-Find over dense u32 node ids.
#[derive(Debug, Clone, Default)]
pub struct Dsu {
    parent: FxHashMap<u32, u32>,
    rank: FxHashMap<u32, u32>,
    cluster_count: usize,
}

impl Dsu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node as its own singleton cluster.
    pub fn add(&mut self, node: u32) {
        if self.parent.contains_key(&node) {
            return;
        }
        self.parent.insert(node, node);
        self.rank.insert(node, 0);
        self.cluster_count += 1;
    }

    pub fn contains(&self, node: u32) -> bool {
        self.parent.contains_key(&node)
    }

    /// Find the root of a node, compressing the path by halving.
    /// Untracked nodes are treated as self-roots.
    pub fn find(&mut self, node: u32) -> u32 {
        let Some(&initial_parent) = self.parent.get(&node) else {
            return node;
        };
        if initial_parent == node {
            return node;
        }

        // Path halving: point every other node to its grandparent while
        // walking up, compressing in a single pass.
        let mut current = node;
        let mut parent = initial_parent;
        loop {
            let grandparent = self.parent.get(&parent).copied().unwrap_or(parent);
            if grandparent == parent {
                break;
            }
            self.parent.insert(current, grandparent);
            current = grandparent;
            parent = self.parent.get(&current).copied().unwrap_or(current);
            if parent == current {
                break;
            }
        }
        parent
    }

    /// Union the clusters containing the two nodes.
    /// Returns true if two distinct clusters were merged.
    pub fn union(&mut self, a: u32, b: u32) -> bool {
        self.add(a);
        self.add(b);

        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return false;
        }

        let rank_a = self.rank.get(&root_a).copied().unwrap_or(0);
        let rank_b = self.rank.get(&root_b).copied().unwrap_or(0);
        if rank_a < rank_b {
            self.parent.insert(root_a, root_b);
        } else if rank_a > rank_b {
            self.parent.insert(root_b, root_a);
        } else {
            self.parent.insert(root_a, root_b);
            self.rank.insert(root_b, rank_b + 1);
        }
        self.cluster_count = self.cluster_count.saturating_sub(1);
        true
    }

    pub fn same_set(&mut self, a: u32, b: u32) -> bool {
        self.find(a) == self.find(b)
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Group all tracked nodes into clusters.
    ///
    /// Members are sorted within each cluster and clusters are ordered by
    /// their smallest member, so the output is deterministic.
    pub fn clusters(&mut self) -> Vec<Vec<u32>> {
        let nodes: Vec<u32> = self.parent.keys().copied().collect();
        let mut by_root: FxHashMap<u32, Vec<u32>> = FxHashMap::default();
        for node in nodes {
            let root = self.find(node);
            by_root.entry(root).or_default().push(node);
        }

        let mut clusters: Vec<Vec<u32>> = by_root.into_values().collect();
        for cluster in &mut clusters {
            cluster.sort_unstable();
        }
        clusters.sort_by_key(|cluster| cluster[0]);
        clusters
    }
}
