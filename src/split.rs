//! # Cluster-Aware Dataset Splitting
//!
//! Partitions ground truth into train/test/validation at the granularity of
//! transitive-closure clusters, so that two records known to co-refer never
//! end up on opposite sides of the train/evaluation boundary. Also assembles
//! the leakage-safe training similarity matrix.

use crate::compare::FeatureTable;
use crate::config::SplitFractions;
use crate::dsu::Dsu;
use crate::error::LinkageError;
use crate::model::{CandidatePair, RecordUid, Table, UidPair, ValueInterner};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{info, warn};

/// Record-id partitions produced by the cluster split.
#[derive(Debug, Clone, Default)]
pub struct SplitIds {
    pub train: FxHashSet<RecordUid>,
    pub test: FxHashSet<RecordUid>,
    pub validation: FxHashSet<RecordUid>,
}

impl SplitIds {
    /// True when the uid was assigned to a held-out partition.
    pub fn is_held_out(&self, uid: &RecordUid) -> bool {
        self.test.contains(uid) || self.validation.contains(uid)
    }
}

/// Labeled training rows with an aligned label vector.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    /// Canonical candidate pairs, one per matrix row.
    pub pairs: Vec<CandidatePair>,
    pub matrix: Vec<Vec<f64>>,
    /// Aligned labels: true for a ground-truth match row.
    pub labels: Vec<bool>,
    /// The canonical true-match pairs retained in the matrix.
    pub true_matches: Vec<CandidatePair>,
}

/// Connected components of the ground-truth match graph.
///
/// Every id appearing in at least one pair belongs to exactly one cluster;
/// ids never mentioned in ground truth belong to none.
pub fn transitive_clusters(gold: &[UidPair]) -> Vec<Vec<RecordUid>> {
    let mut interner = ValueInterner::new();
    let mut dsu = Dsu::new();
    for pair in gold {
        let left = interner.intern(&pair.left.0);
        let right = interner.intern(&pair.right.0);
        dsu.union(left.0, right.0);
    }

    dsu.clusters()
        .into_iter()
        .map(|members| {
            members
                .into_iter()
                .filter_map(|id| {
                    interner
                        .resolve(crate::model::ValueId(id))
                        .map(|uid| RecordUid(uid.to_string()))
                })
                .collect()
        })
        .collect()
}

/// Splits clusters into partitions and builds the training matrix.
#[derive(Debug, Clone)]
pub struct ClusterSplitter {
    pub fractions: SplitFractions,
    pub seed: u64,
    /// Share of eligible non-match rows kept as negative examples.
    pub non_match_keep_ratio: f64,
}

impl Default for ClusterSplitter {
    fn default() -> Self {
        Self {
            fractions: SplitFractions::default(),
            seed: 42,
            non_match_keep_ratio: 0.7,
        }
    }
}

impl ClusterSplitter {
    /// Partition the ground-truth clusters into train/test/validation id sets.
    ///
    /// Whole clusters are assigned to a partition, never individual ids, so
    /// transitively linked records always share a partition.
    pub fn split(&self, gold: &[UidPair]) -> Result<SplitIds, LinkageError> {
        self.fractions.validate()?;

        let mut clusters = transitive_clusters(gold);
        let mut rng = StdRng::seed_from_u64(self.seed);
        clusters.shuffle(&mut rng);

        let total = clusters.len();
        let train_count = ((total as f64) * self.fractions.train).round() as usize;
        let train_count = train_count.min(total);
        let test_count =
            (((total as f64) * self.fractions.test).round() as usize).min(total - train_count);

        let mut split = SplitIds::default();
        for (idx, cluster) in clusters.into_iter().enumerate() {
            let target = if idx < train_count {
                &mut split.train
            } else if idx < train_count + test_count {
                &mut split.test
            } else {
                &mut split.validation
            };
            target.extend(cluster);
        }

        info!(
            clusters = total,
            train = split.train.len(),
            test = split.test.len(),
            validation = split.validation.len(),
            "cluster split complete"
        );
        Ok(split)
    }

    /// Assemble the training similarity matrix: ground-truth match rows fully
    /// contained in the train partition, plus a sampled share of non-match
    /// rows, shuffled with labels aligned by pair.
    ///
    /// Every pair is canonicalized before set operations because the feature
    /// table and the ground truth may store the two members in either order.
    pub fn build_training_matrix(
        &self,
        features: &FeatureTable,
        table: &Table,
        split: &SplitIds,
        gold: &[UidPair],
    ) -> Result<TrainingSet, LinkageError> {
        let gold_canonical: FxHashSet<UidPair> =
            gold.iter().map(UidPair::canonical).collect();

        // Ground-truth pairs restricted to the train partition, translated
        // into canonical row-position pairs.
        let mut train_true: FxHashSet<CandidatePair> = FxHashSet::default();
        let mut unresolved = 0usize;
        for pair in &gold_canonical {
            if !(split.train.contains(&pair.left) && split.train.contains(&pair.right)) {
                continue;
            }
            match (table.position_of(&pair.left), table.position_of(&pair.right)) {
                (Some(left), Some(right)) => {
                    train_true.insert(CandidatePair::canonical(left, right));
                }
                _ => unresolved += 1,
            }
        }
        if unresolved > 0 {
            warn!(
                table = table.name(),
                unresolved, "ground-truth uids not present in table"
            );
        }

        let mut positives: Vec<(CandidatePair, Vec<f64>)> = Vec::new();
        let mut negatives: Vec<(CandidatePair, Vec<f64>)> = Vec::new();
        for (pair, row) in features.iter() {
            let canonical = pair.canonicalized();
            if train_true.contains(&canonical) {
                positives.push((canonical, row.to_vec()));
                continue;
            }

            let left_uid = table.uid_at(canonical.left);
            let right_uid = table.uid_at(canonical.right);
            if let (Some(left), Some(right)) = (&left_uid, &right_uid) {
                // A true match whose partner fell outside the train partition
                // is excluded entirely, never kept with a missing partner.
                if gold_canonical.contains(&UidPair::new(left.clone(), right.clone())) {
                    continue;
                }
                // Rows touching held-out ids would leak identity information.
                if split.is_held_out(left) || split.is_held_out(right) {
                    continue;
                }
            }
            negatives.push((canonical, row.to_vec()));
        }

        // Keep only a share of the non-match majority class.
        let mut rng = StdRng::seed_from_u64(self.seed);
        negatives.shuffle(&mut rng);
        let keep = ((negatives.len() as f64) * self.non_match_keep_ratio).floor() as usize;
        negatives.truncate(keep);

        let true_matches: Vec<CandidatePair> = positives.iter().map(|(pair, _)| *pair).collect();

        let mut labeled: Vec<(CandidatePair, Vec<f64>, bool)> = positives
            .into_iter()
            .map(|(pair, row)| (pair, row, true))
            .chain(negatives.into_iter().map(|(pair, row)| (pair, row, false)))
            .collect();
        // No fixed ordering may leak labels through row adjacency.
        labeled.shuffle(&mut rng);

        let mut training = TrainingSet {
            pairs: Vec::with_capacity(labeled.len()),
            matrix: Vec::with_capacity(labeled.len()),
            labels: Vec::with_capacity(labeled.len()),
            true_matches,
        };
        for (pair, row, label) in labeled {
            training.pairs.push(pair);
            training.matrix.push(row);
            training.labels.push(label);
        }

        info!(
            table = table.name(),
            rows = training.matrix.len(),
            true_matches = training.true_matches.len(),
            "training matrix assembled"
        );
        Ok(training)
    }
}
