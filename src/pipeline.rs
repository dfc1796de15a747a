//! # Linkage Pipeline
//!
//! Orchestrates the end-to-end run for one or more datasets: key selection,
//! candidate generation, similarity comparison, cluster-aware splitting and
//! model training. Datasets are independent and run in parallel.

use crate::compare::{Comparer, ComparisonOutcome};
use crate::config::{LinkageTuning, MeasureTuning};
use crate::entropy::{rank_columns, select_keys};
use crate::error::LinkageError;
use crate::index::{Blocker, CandidateSet, CandidateSource, PairMethod};
use crate::model::{Table, UidPair};
use crate::split::{ClusterSplitter, SplitIds, TrainingSet};
use crate::trainer::{LinearClassifier, ModelTrainer};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{error, info, warn};

/// Per-dataset overrides applied on top of the pipeline-wide tuning.
#[derive(Debug, Clone, Default)]
pub struct DatasetOverrides {
    pub pair_method: Option<PairMethod>,
    pub num_keys: Option<usize>,
    pub string_method: Option<String>,
    pub numeric_method: Option<String>,
}

/// One dataset: a table to deduplicate, or two tables to link, with optional
/// ground truth and an optional externally supplied candidate-pair table.
#[derive(Debug, Clone)]
pub struct DatasetInput {
    pub id: String,
    pub tables: Vec<Table>,
    /// Ground-truth match pairs keyed by record uid.
    pub gold: Vec<UidPair>,
    /// When present, blocking is bypassed and these pairs are used verbatim.
    pub candidate_set: Option<Table>,
    pub overrides: DatasetOverrides,
}

impl DatasetInput {
    pub fn new(id: impl Into<String>, tables: Vec<Table>) -> Self {
        Self {
            id: id.into(),
            tables,
            gold: Vec::new(),
            candidate_set: None,
            overrides: DatasetOverrides::default(),
        }
    }

    pub fn with_gold(mut self, gold: Vec<UidPair>) -> Self {
        self.gold = gold;
        self
    }

    pub fn with_candidate_set(mut self, candidates: Table) -> Self {
        self.candidate_set = Some(candidates);
        self
    }

    pub fn with_overrides(mut self, overrides: DatasetOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// Everything a dataset run produced.
#[derive(Debug, Clone)]
pub struct DatasetOutcome {
    /// Blocking keys chosen by entropy ranking; empty for keyless strategies
    /// and supplied candidate sets.
    pub keys: Vec<String>,
    pub candidates: CandidateSet,
    pub comparison: ComparisonOutcome,
    /// Train/test/validation uid partitions; present when ground truth was
    /// given for a single-table dataset.
    pub split: Option<SplitIds>,
    pub training: Option<TrainingSet>,
    /// Fitted classifier; absent when the dataset yielded too little
    /// training data.
    pub model: Option<LinearClassifier>,
}

/// The top-level engine. Construct once, run any number of datasets.
#[derive(Debug, Clone)]
pub struct LinkageEngine {
    tuning: LinkageTuning,
}

impl LinkageEngine {
    pub fn new(tuning: LinkageTuning) -> Result<Self, LinkageError> {
        tuning.validate()?;
        Ok(Self { tuning })
    }

    pub fn tuning(&self) -> &LinkageTuning {
        &self.tuning
    }

    /// Run the full pipeline on one dataset.
    pub fn run_dataset(&self, input: &DatasetInput) -> Result<DatasetOutcome, LinkageError> {
        let (a, b) = match input.tables.as_slice() {
            [a] => (a, None),
            [a, b] => (a, Some(b)),
            other => {
                return Err(LinkageError::Configuration(format!(
                    "dataset `{}` has {} tables, expected 1 or 2",
                    input.id,
                    other.len()
                )));
            }
        };

        let method = input
            .overrides
            .pair_method
            .unwrap_or(self.tuning.pair_method);
        let num_keys = input.overrides.num_keys.unwrap_or(self.tuning.num_keys);

        let blocker = Blocker {
            window: self.tuning.window,
            random_seed: self.tuning.random_seed,
            random_pairs: self.tuning.random_pairs,
        };

        let source = match &input.candidate_set {
            Some(supplied) => {
                info!(dataset = %input.id, "using supplied candidate set");
                CandidateSource::Supplied(supplied)
            }
            None => CandidateSource::Blocked(method),
        };
        let keys = match source {
            CandidateSource::Blocked(PairMethod::Block)
            | CandidateSource::Blocked(PairMethod::SortedNeighbourhood) => {
                self.select_blocking_keys(a, b, num_keys)?
            }
            _ => Vec::new(),
        };
        let candidates = blocker.candidates(source, a, b, &keys)?;

        let measures = self.effective_measures(&input.overrides);
        let comparer = Comparer::new(measures, self.tuning.match_threshold_factor);
        let comparison = comparer.compare(&candidates, a, b)?;

        // Training needs a single table and ground truth: two-table linkage
        // has no shared uid space to split over.
        let (split, training, model) = if b.is_none() && !input.gold.is_empty() {
            self.train(input, a, &comparison)?
        } else {
            (None, None, None)
        };

        info!(
            dataset = %input.id,
            candidates = candidates.len(),
            matches = comparison.matches.len(),
            trained = model.is_some(),
            "dataset run complete"
        );
        Ok(DatasetOutcome {
            keys,
            candidates,
            comparison,
            split,
            training,
            model,
        })
    }

    /// Run every dataset, in parallel, collecting per-dataset results.
    ///
    /// A failing dataset never aborts its siblings; its error is logged and
    /// returned in place of an outcome.
    pub fn run_all(
        &self,
        inputs: &[DatasetInput],
    ) -> FxHashMap<String, Result<DatasetOutcome, LinkageError>> {
        inputs
            .par_iter()
            .map(|input| {
                let result = self.run_dataset(input);
                if let Err(err) = &result {
                    error!(dataset = %input.id, %err, "dataset run failed");
                }
                (input.id.clone(), result)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    }

    fn select_blocking_keys(
        &self,
        a: &Table,
        b: Option<&Table>,
        num_keys: usize,
    ) -> Result<Vec<String>, LinkageError> {
        match b {
            Some(b) => select_keys(a, b, num_keys),
            None => {
                let keys: Vec<String> = rank_columns(a)
                    .into_iter()
                    .take(num_keys.max(1))
                    .map(|(name, _)| name)
                    .collect();
                if keys.is_empty() {
                    return Err(LinkageError::NoIndexingKey);
                }
                Ok(keys)
            }
        }
    }

    fn effective_measures(&self, overrides: &DatasetOverrides) -> MeasureTuning {
        let mut measures = self.tuning.measures.clone();
        if let Some(method) = &overrides.string_method {
            measures.string_method = method.clone();
        }
        if let Some(method) = &overrides.numeric_method {
            measures.numeric_method = method.clone();
        }
        measures
    }

    #[allow(clippy::type_complexity)]
    fn train(
        &self,
        input: &DatasetInput,
        table: &Table,
        comparison: &ComparisonOutcome,
    ) -> Result<(Option<SplitIds>, Option<TrainingSet>, Option<LinearClassifier>), LinkageError>
    {
        let splitter = ClusterSplitter {
            fractions: self.tuning.split,
            seed: self.tuning.random_seed,
            non_match_keep_ratio: self.tuning.non_match_keep_ratio,
        };
        let split = splitter.split(&input.gold)?;
        let training =
            splitter.build_training_matrix(&comparison.features, table, &split, &input.gold)?;

        // Too little data fails training only; the split and the feature
        // artifacts are still returned.
        let model = match ModelTrainer::default().fit(&training) {
            Ok(model) => Some(model),
            Err(LinkageError::InsufficientTrainingData(reason)) => {
                warn!(dataset = %input.id, reason, "skipping model training");
                None
            }
            Err(err) => return Err(err),
        };
        Ok((Some(split), Some(training), model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{LEFT_FK_COLUMN, RIGHT_FK_COLUMN};
    use crate::model::Column;

    fn dedup_table() -> Table {
        // Rows 0/1 and 2/3 are near-duplicates sharing an age block. The
        // name column is all-unique with few distinct lengths, so the
        // identifier heuristic keeps it out of the key ranking.
        Table::new(
            "people",
            vec![
                Column::text(
                    "id",
                    &[Some("1"), Some("2"), Some("3"), Some("4"), Some("5"), Some("6")],
                ),
                Column::text(
                    "name",
                    &[
                        Some("johnathan"),
                        Some("jonathan"),
                        Some("marianna"),
                        Some("marianne"),
                        Some("pierre"),
                        Some("ingrid"),
                    ],
                ),
                Column::text(
                    "city",
                    &[
                        Some("oslo"),
                        Some("oslo"),
                        Some("rome"),
                        Some("rome"),
                        Some("oslo"),
                        Some("rome"),
                    ],
                ),
                Column::numeric(
                    "age",
                    &[
                        Some(30.0),
                        Some(30.0),
                        Some(44.0),
                        Some(44.0),
                        Some(25.0),
                        Some(61.0),
                    ],
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_single_table_dedup_finds_near_duplicates() {
        let engine = LinkageEngine::new(LinkageTuning::default()).unwrap();
        let input = DatasetInput::new("dedup", vec![dedup_table()]);
        let outcome = engine.run_dataset(&input).unwrap();

        assert_eq!(outcome.keys, vec!["age".to_string()]);
        let matched: Vec<(String, String)> = outcome
            .comparison
            .matched_uids
            .iter()
            .map(|p| {
                let c = p.canonical();
                (c.left.0.clone(), c.right.0.clone())
            })
            .collect();
        assert!(matched.contains(&("1".to_string(), "2".to_string())));
        assert!(matched.contains(&("3".to_string(), "4".to_string())));
        // No ground truth, so nothing to split or train on.
        assert!(outcome.split.is_none());
        assert!(outcome.model.is_none());
    }

    #[test]
    fn test_three_tables_rejected() {
        let engine = LinkageEngine::new(LinkageTuning::default()).unwrap();
        let t = dedup_table();
        let input = DatasetInput::new("bad", vec![t.clone(), t.clone(), t]);
        assert!(matches!(
            engine.run_dataset(&input),
            Err(LinkageError::Configuration(_))
        ));
    }

    #[test]
    fn test_supplied_candidate_set_bypasses_blocking() {
        let engine = LinkageEngine::new(LinkageTuning::default()).unwrap();
        let supplied = Table::new(
            "cand",
            vec![
                Column::text(LEFT_FK_COLUMN, &[Some("1"), Some("5")]),
                Column::text(RIGHT_FK_COLUMN, &[Some("2"), Some("6")]),
            ],
        )
        .unwrap();
        let input =
            DatasetInput::new("supplied", vec![dedup_table()]).with_candidate_set(supplied);
        let outcome = engine.run_dataset(&input).unwrap();

        assert!(outcome.keys.is_empty());
        assert_eq!(outcome.candidates.len(), 2);
    }

    #[test]
    fn test_overrides_change_method_and_measures() {
        let engine = LinkageEngine::new(LinkageTuning::default()).unwrap();
        let input = DatasetInput::new("full", vec![dedup_table()]).with_overrides(
            DatasetOverrides {
                pair_method: Some(PairMethod::Full),
                ..DatasetOverrides::default()
            },
        );
        let outcome = engine.run_dataset(&input).unwrap();
        // Full ignores keys and pairs every row combination: C(6, 2).
        assert!(outcome.keys.is_empty());
        assert_eq!(outcome.candidates.len(), 15);
    }

    #[test]
    fn test_two_table_linkage_skips_training() {
        let engine = LinkageEngine::new(LinkageTuning::exhaustive()).unwrap();
        let a = dedup_table();
        let b = Table::new(
            "people_b",
            vec![
                Column::text("id", &[Some("10"), Some("11")]),
                Column::text("name", &[Some("jonathan"), Some("ida")]),
                Column::text("city", &[Some("oslo"), Some("bern")]),
                Column::numeric("age", &[Some(30.0), Some(52.0)]),
            ],
        )
        .unwrap();
        let input = DatasetInput::new("link", vec![a, b])
            .with_gold(vec![UidPair::new("1", "10")]);
        let outcome = engine.run_dataset(&input).unwrap();

        assert!(outcome.split.is_none());
        assert!(outcome.training.is_none());
        assert!(outcome.model.is_none());
        assert!(outcome
            .comparison
            .matched_uids
            .contains(&UidPair::new("1", "10")));
    }

    #[test]
    fn test_training_runs_end_to_end_with_gold() {
        let tuning = LinkageTuning {
            pair_method: PairMethod::Full,
            // Keep every negative so the tiny example trains deterministically.
            non_match_keep_ratio: 1.0,
            ..LinkageTuning::default()
        };
        let engine = LinkageEngine::new(tuning).unwrap();
        let gold = vec![UidPair::new("1", "2"), UidPair::new("3", "4")];
        let input = DatasetInput::new("train", vec![dedup_table()]).with_gold(gold);
        let outcome = engine.run_dataset(&input).unwrap();

        let split = outcome.split.expect("split present");
        let training = outcome.training.expect("training present");
        assert!(!training.matrix.is_empty());
        // With two clusters the 0.7 fraction rounds to one train cluster.
        assert_eq!(split.train.len(), 2);
        let model = outcome.model.expect("model fitted");
        use crate::trainer::Classifier;
        assert!(model.predict_score(&[1.0, 1.0, 1.0, 1.0]) > 0.0);
    }

    #[test]
    fn test_run_all_isolates_failures() {
        let engine = LinkageEngine::new(LinkageTuning::default()).unwrap();
        let good = DatasetInput::new("good", vec![dedup_table()]);
        let t = dedup_table();
        let bad = DatasetInput::new("bad", vec![t.clone(), t.clone(), t]);

        let results = engine.run_all(&[good, bad]);
        assert_eq!(results.len(), 2);
        assert!(results["good"].is_ok());
        assert!(matches!(
            results["bad"],
            Err(LinkageError::Configuration(_))
        ));
    }
}
