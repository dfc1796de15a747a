//! # Similarity Scoring
//!
//! Computes per-pair, per-column similarity vectors with type-appropriate
//! measures, then collapses each vector to a match decision via a summed
//! score threshold. Measures are pluggable named functions; unknown names
//! degrade to exact matching rather than aborting the comparison.

use crate::config::MeasureTuning;
use crate::error::LinkageError;
use crate::index::CandidateSet;
use crate::model::{CandidatePair, Cell, ColumnKind, Table, UidPair};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A named similarity measure over two cells, scoring into the measure's
/// native range (exact measures {0,1}; continuous measures [0,1]).
pub type MeasureFn = dyn Fn(&Cell, &Cell) -> f64 + Send + Sync;

/// Registry of named measure functions.
pub struct MeasureRegistry {
    measures: FxHashMap<String, Arc<MeasureFn>>,
}

impl MeasureRegistry {
    /// Build the default registry, with string-collapse and numeric-scale
    /// behavior taken from the tuning.
    pub fn with_defaults(tuning: &MeasureTuning) -> Self {
        let mut registry = Self {
            measures: FxHashMap::default(),
        };

        registry.register("exact", Arc::new(exact_measure));

        let threshold = tuning.string_threshold;
        registry.register(
            "levenshtein",
            Arc::new(move |a: &Cell, b: &Cell| {
                string_measure(a, b, threshold, strsim::normalized_levenshtein)
            }),
        );
        registry.register(
            "jarowinkler",
            Arc::new(move |a: &Cell, b: &Cell| {
                string_measure(a, b, threshold, strsim::jaro_winkler)
            }),
        );

        let scale = tuning.numeric_scale;
        registry.register(
            "linear",
            Arc::new(move |a: &Cell, b: &Cell| match (a, b) {
                (Cell::Number(x), Cell::Number(y)) => {
                    (1.0 - (x - y).abs() / scale).clamp(0.0, 1.0)
                }
                _ => 0.0,
            }),
        );
        registry.register(
            "step",
            Arc::new(|a: &Cell, b: &Cell| match (a, b) {
                (Cell::Number(x), Cell::Number(y)) => {
                    if x == y {
                        1.0
                    } else {
                        0.0
                    }
                }
                _ => 0.0,
            }),
        );

        registry.register(
            "date",
            Arc::new(|a: &Cell, b: &Cell| match (a, b) {
                (Cell::Timestamp(x), Cell::Timestamp(y)) => {
                    if x == y {
                        1.0
                    } else {
                        0.0
                    }
                }
                _ => 0.0,
            }),
        );

        registry
    }

    pub fn register(&mut self, name: &str, measure: Arc<MeasureFn>) {
        self.measures.insert(name.to_string(), measure);
    }

    pub fn get(&self, name: &str) -> Option<Arc<MeasureFn>> {
        self.measures.get(name).cloned()
    }
}

/// Exact equality on canonical text; missing cells never match.
fn exact_measure(a: &Cell, b: &Cell) -> f64 {
    match (a.canonical_text(), b.canonical_text()) {
        (Some(x), Some(y)) if x == y => 1.0,
        _ => 0.0,
    }
}

fn string_measure(
    a: &Cell,
    b: &Cell,
    threshold: f64,
    similarity: impl Fn(&str, &str) -> f64,
) -> f64 {
    let (Some(x), Some(y)) = (a.canonical_text(), b.canonical_text()) else {
        return 0.0;
    };
    let score = similarity(&x, &y);
    if threshold > 0.0 {
        if score >= threshold {
            1.0
        } else {
            0.0
        }
    } else {
        score
    }
}

/// Similarity feature vectors keyed by candidate pair.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    columns: Vec<String>,
    pairs: Vec<CandidatePair>,
    rows: Vec<Vec<f64>>,
    index: FxHashMap<CandidatePair, usize>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            pairs: Vec::new(),
            rows: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn push(&mut self, pair: CandidatePair, row: Vec<f64>) {
        self.index.insert(pair, self.rows.len());
        self.pairs.push(pair);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn pairs(&self) -> &[CandidatePair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.rows[idx]
    }

    pub fn row_sum(&self, idx: usize) -> f64 {
        self.rows[idx].iter().sum()
    }

    /// Look up a pair's row, tolerating asymmetric storage order: the exact
    /// pair is tried first, then its swapped form.
    pub fn position(&self, pair: &CandidatePair) -> Option<usize> {
        self.index
            .get(pair)
            .or_else(|| self.index.get(&pair.swapped()))
            .copied()
    }

    pub fn get(&self, pair: &CandidatePair) -> Option<&[f64]> {
        self.position(pair).map(|idx| self.rows[idx].as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CandidatePair, &[f64])> {
        self.pairs
            .iter()
            .zip(self.rows.iter().map(Vec::as_slice))
    }
}

/// Result of comparing a candidate set.
#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub features: FeatureTable,
    /// Summed-score acceptance threshold used for the match decision.
    pub threshold: f64,
    /// Pairs whose score sum strictly exceeds the threshold.
    pub matches: Vec<CandidatePair>,
    /// Matched pairs mapped back to record uids through the `id` column.
    pub matched_uids: Vec<UidPair>,
}

/// Column-type-aware similarity comparer.
pub struct Comparer {
    tuning: MeasureTuning,
    registry: MeasureRegistry,
    threshold_factor: f64,
    fallback: Arc<MeasureFn>,
}

impl Comparer {
    pub fn new(tuning: MeasureTuning, threshold_factor: f64) -> Self {
        let registry = MeasureRegistry::with_defaults(&tuning);
        Self {
            tuning,
            registry,
            threshold_factor,
            fallback: Arc::new(exact_measure),
        }
    }

    /// Register or replace a named measure.
    pub fn register_measure(&mut self, name: &str, measure: Arc<MeasureFn>) {
        self.registry.register(name, measure);
    }

    /// Score every candidate pair over the columns shared by both tables
    /// (all columns in single-table mode) and decide matches.
    pub fn compare(
        &self,
        pairs: &CandidateSet,
        a: &Table,
        b: Option<&Table>,
    ) -> Result<ComparisonOutcome, LinkageError> {
        let right_table = b.unwrap_or(a);
        let compared: Vec<String> = match b {
            Some(b) => a.common_columns(b),
            None => a.column_names().map(str::to_string).collect(),
        };
        if compared.is_empty() {
            return Err(LinkageError::NoCommonColumn);
        }

        // Resolve one measure per column up front; the kind tag was decided
        // at column construction and is never re-inferred here.
        let mut measures: Vec<(String, Arc<MeasureFn>)> = Vec::with_capacity(compared.len());
        for name in &compared {
            let column = a
                .column(name)
                .ok_or_else(|| LinkageError::NoCommonColumn)?;
            let method = self.method_for_kind(column.kind);
            let measure = match self.registry.get(method) {
                Some(measure) => measure,
                None => {
                    warn!(
                        column = %name,
                        method,
                        "unknown similarity measure, falling back to exact"
                    );
                    Arc::clone(&self.fallback)
                }
            };
            measures.push((name.clone(), measure));
        }

        // Deterministic row order regardless of hash-set iteration.
        let mut ordered: Vec<CandidatePair> = pairs.iter().copied().collect();
        ordered.sort_by_key(|p| (p.left, p.right));

        let rows: Vec<Vec<f64>> = ordered
            .par_iter()
            .map(|pair| {
                measures
                    .iter()
                    .map(|(name, measure)| {
                        let left = match a.column(name) {
                            Some(column) => column.cell(pair.left),
                            None => &Cell::Missing,
                        };
                        let right = match right_table.column(name) {
                            Some(column) => column.cell(pair.right),
                            None => &Cell::Missing,
                        };
                        measure(left, right)
                    })
                    .collect()
            })
            .collect();

        let mut features = FeatureTable::new(compared.clone());
        for (pair, row) in ordered.iter().zip(rows) {
            features.push(*pair, row);
        }

        let threshold = (self.threshold_factor * compared.len() as f64).floor();
        let mut matches = Vec::new();
        let mut matched_uids = Vec::new();
        for idx in 0..features.len() {
            if features.row_sum(idx) > threshold {
                let pair = features.pairs()[idx];
                matches.push(pair);
                if let (Some(left), Some(right)) =
                    (a.uid_at(pair.left), right_table.uid_at(pair.right))
                {
                    matched_uids.push(UidPair { left, right });
                }
            }
        }

        info!(
            table = a.name(),
            columns = compared.len(),
            threshold,
            pairs = features.len(),
            matches = matches.len(),
            "comparison complete"
        );

        Ok(ComparisonOutcome {
            features,
            threshold,
            matches,
            matched_uids,
        })
    }

    fn method_for_kind(&self, kind: ColumnKind) -> &str {
        match kind {
            ColumnKind::Text => &self.tuning.string_method,
            ColumnKind::Numeric => &self.tuning.numeric_method,
            ColumnKind::Datetime => "date",
            ColumnKind::Unknown => "exact",
        }
    }
}
