//! # Reclink
//!
//! A record-linkage and deduplication pipeline.
//!
//! This library selects blocking keys by value entropy, generates candidate
//! pairs with pluggable blocking strategies, scores pairs with type-aware
//! similarity measures, and trains a match classifier on ground truth split
//! at the granularity of transitive-closure clusters so that co-referring
//! records never leak across the train/evaluation boundary.

pub mod compare;
pub mod config;
pub mod dsu;
pub mod entropy;
pub mod error;
pub mod index;
pub mod model;
pub mod pipeline;
pub mod split;
pub mod trainer;

// Re-export main types for convenience
pub use compare::{Comparer, ComparisonOutcome, FeatureTable, MeasureRegistry};
pub use config::{LinkageTuning, MeasureTuning, SplitFractions};
pub use entropy::{column_entropy, rank_columns, select_key, select_keys};
pub use error::LinkageError;
pub use index::{Blocker, CandidateSet, CandidateSource, PairMethod};
pub use model::{
    CandidatePair, Cell, Column, ColumnKind, RecordUid, RowPos, Table, UidPair, ID_COLUMN,
};
pub use pipeline::{DatasetInput, DatasetOutcome, DatasetOverrides, LinkageEngine};
pub use split::{transitive_clusters, ClusterSplitter, SplitIds, TrainingSet};
pub use trainer::{Classifier, LinearClassifier, ModelTrainer};
