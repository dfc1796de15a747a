//! # Blocking and Candidate Generation
//!
//! Reduces the cartesian space of record pairs to a candidate set likely to
//! contain true matches. Four strategies are available behind one interface,
//! plus a bypass for externally supplied candidate sets keyed by record uid.

use crate::error::LinkageError;
use crate::model::{CandidatePair, RecordUid, RowPos, Table, ValueId, ValueInterner};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// Expected foreign-key column names of a supplied candidate set.
pub const LEFT_FK_COLUMN: &str = "ltable.id";
pub const RIGHT_FK_COLUMN: &str = "rtable.id";

/// A deduplicated set of candidate pairs.
pub type CandidateSet = FxHashSet<CandidatePair>;

/// Closed set of pairing strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairMethod {
    /// Cartesian product of row positions. O(n*m), small tables only.
    Full,
    /// Exact-match grouping on the key column, O(n+m) via hash grouping.
    Block,
    /// Window over distinct sorted key values, tolerating near-duplicate
    /// keys. Equal-keyed records always pair.
    SortedNeighbourhood,
    /// Seeded uniform sample of pairs; a baseline, not production blocking.
    Random,
}

impl FromStr for PairMethod {
    type Err = LinkageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(PairMethod::Full),
            "block" => Ok(PairMethod::Block),
            "sortedneighbourhood" => Ok(PairMethod::SortedNeighbourhood),
            "random" => Ok(PairMethod::Random),
            other => Err(LinkageError::InvalidPairMethod(other.to_string())),
        }
    }
}

impl fmt::Display for PairMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PairMethod::Full => "full",
            PairMethod::Block => "block",
            PairMethod::SortedNeighbourhood => "sortedneighbourhood",
            PairMethod::Random => "random",
        };
        write!(f, "{name}")
    }
}

/// How a dataset obtains its candidate pairs: blocked locally with one of
/// the `PairMethod` strategies, or translated from an externally supplied
/// pair table.
#[derive(Debug, Clone, Copy)]
pub enum CandidateSource<'a> {
    Blocked(PairMethod),
    Supplied(&'a Table),
}

/// Candidate-pair generator.
#[derive(Debug, Clone)]
pub struct Blocker {
    /// Window width for sorted-neighbourhood blocking.
    pub window: usize,
    /// Seed for the random baseline strategy.
    pub random_seed: u64,
    /// Sample size for the random strategy; 0 derives it from table size.
    pub random_pairs: usize,
}

impl Default for Blocker {
    fn default() -> Self {
        Self {
            window: 3,
            random_seed: 42,
            random_pairs: 0,
        }
    }
}

impl Blocker {
    /// Generate candidate pairs from the configured source. Keys are only
    /// consulted by the key-driven blocking strategies.
    pub fn candidates(
        &self,
        source: CandidateSource<'_>,
        a: &Table,
        b: Option<&Table>,
        keys: &[String],
    ) -> Result<CandidateSet, LinkageError> {
        match source {
            CandidateSource::Blocked(method) => self.build_candidates(a, b, keys, method),
            CandidateSource::Supplied(supplied) => self.from_supplied(supplied, a, b),
        }
    }

    /// Generate candidate pairs with the chosen strategy.
    ///
    /// `Block` and `SortedNeighbourhood` run once per key and union the
    /// results, so adding a key can only grow the candidate set.
    /// `Full` and `Random` ignore keys.
    pub fn build_candidates(
        &self,
        a: &Table,
        b: Option<&Table>,
        keys: &[String],
        method: PairMethod,
    ) -> Result<CandidateSet, LinkageError> {
        let pairs = match method {
            PairMethod::Full => self.full_pairs(a, b),
            PairMethod::Random => self.random_sample(a, b),
            PairMethod::Block => self.keyed_union(keys, |key| self.block_pairs(a, b, key))?,
            PairMethod::SortedNeighbourhood => {
                self.keyed_union(keys, |key| self.sorted_neighbourhood_pairs(a, b, key))?
            }
        };
        info!(
            table = a.name(),
            method = %method,
            keys = keys.len(),
            candidates = pairs.len(),
            "candidate generation complete"
        );
        Ok(pairs)
    }

    /// Translate a supplied candidate set of uid pairs into row positions.
    ///
    /// The supplied table must carry `ltable.id` and `rtable.id` columns;
    /// anything else fails fast rather than silently mis-joining. Uids absent
    /// from the target tables are skipped with a warning.
    pub fn from_supplied(
        &self,
        supplied: &Table,
        a: &Table,
        b: Option<&Table>,
    ) -> Result<CandidateSet, LinkageError> {
        let (Some(left_fk), Some(right_fk)) = (
            supplied.column(LEFT_FK_COLUMN),
            supplied.column(RIGHT_FK_COLUMN),
        ) else {
            return Err(LinkageError::MalformedCandidateSet {
                expected_left: LEFT_FK_COLUMN,
                expected_right: RIGHT_FK_COLUMN,
                found: supplied.column_names().map(str::to_string).collect(),
            });
        };

        let right_table = b.unwrap_or(a);
        let mut pairs = CandidateSet::default();
        let mut skipped = 0usize;
        for pos in supplied.row_positions() {
            let left_uid = left_fk.cell(pos).canonical_text().map(RecordUid);
            let right_uid = right_fk.cell(pos).canonical_text().map(RecordUid);
            let resolved = left_uid
                .as_ref()
                .and_then(|uid| a.position_of(uid))
                .zip(right_uid.as_ref().and_then(|uid| right_table.position_of(uid)));
            match resolved {
                Some((left, right)) => {
                    let pair = if b.is_some() {
                        CandidatePair::new(left, right)
                    } else {
                        CandidatePair::canonical(left, right)
                    };
                    pairs.insert(pair);
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(
                table = supplied.name(),
                skipped, "candidate uids not found in target tables"
            );
        }
        Ok(pairs)
    }

    /// Run a key-driven strategy once per key and union the results.
    fn keyed_union<F>(&self, keys: &[String], mut per_key: F) -> Result<CandidateSet, LinkageError>
    where
        F: FnMut(&str) -> Result<CandidateSet, LinkageError>,
    {
        if keys.is_empty() {
            return Err(LinkageError::NoIndexingKey);
        }
        let mut pairs = CandidateSet::default();
        for key in keys {
            pairs.extend(per_key(key.as_str())?);
        }
        Ok(pairs)
    }

    fn full_pairs(&self, a: &Table, b: Option<&Table>) -> CandidateSet {
        let mut pairs = CandidateSet::default();
        match b {
            Some(b) => {
                for i in a.row_positions() {
                    for j in b.row_positions() {
                        pairs.insert(CandidatePair::new(i, j));
                    }
                }
            }
            None => {
                let n = a.len() as u32;
                for i in 0..n {
                    for j in (i + 1)..n {
                        pairs.insert(CandidatePair::new(RowPos(i), RowPos(j)));
                    }
                }
            }
        }
        pairs
    }

    fn block_pairs(
        &self,
        a: &Table,
        b: Option<&Table>,
        key: &str,
    ) -> Result<CandidateSet, LinkageError> {
        let mut interner = ValueInterner::new();
        let groups_a = group_by_key(a, key, &mut interner)?;
        let mut pairs = CandidateSet::default();

        match b {
            Some(b) => {
                let groups_b = group_by_key(b, key, &mut interner)?;
                for (value, left_rows) in &groups_a {
                    let Some(right_rows) = groups_b.get(value) else {
                        continue;
                    };
                    for &left in left_rows {
                        for &right in right_rows {
                            pairs.insert(CandidatePair::new(left, right));
                        }
                    }
                }
            }
            None => {
                for rows in groups_a.values() {
                    for (i, &left) in rows.iter().enumerate() {
                        for &right in &rows[i + 1..] {
                            pairs.insert(CandidatePair::canonical(left, right));
                        }
                    }
                }
            }
        }
        Ok(pairs)
    }

    fn sorted_neighbourhood_pairs(
        &self,
        a: &Table,
        b: Option<&Table>,
        key: &str,
    ) -> Result<CandidateSet, LinkageError> {
        // Combined sorted order over both tables' key cells. The window
        // counts distinct key values, not rows: a run of equal keys shares
        // one rank, so equal-keyed records always pair no matter how many
        // there are, and the output is a superset of exact blocking.
        let mut entries = sorted_entries(a, key, Side::Left)?;
        if let Some(b) = b {
            entries.extend(sorted_entries(b, key, Side::Right)?);
        }
        entries.sort_by(|x, y| x.0.cmp_for_sort(&y.0).then(x.2.cmp(&y.2)));

        let mut ranks: Vec<usize> = Vec::with_capacity(entries.len());
        let mut rank = 0usize;
        for (i, (cell, _, _)) in entries.iter().enumerate() {
            if i > 0 && entries[i - 1].0.cmp_for_sort(cell) != Ordering::Equal {
                rank += 1;
            }
            ranks.push(rank);
        }

        let mut pairs = CandidateSet::default();
        for (i, (_, side_i, pos_i)) in entries.iter().enumerate() {
            for (j, (_, side_j, pos_j)) in entries.iter().enumerate().skip(i + 1) {
                if ranks[j] - ranks[i] >= self.window {
                    break;
                }
                match (b.is_some(), side_i, side_j) {
                    (false, _, _) => {
                        if pos_i != pos_j {
                            pairs.insert(CandidatePair::canonical(*pos_i, *pos_j));
                        }
                    }
                    (true, Side::Left, Side::Right) => {
                        pairs.insert(CandidatePair::new(*pos_i, *pos_j));
                    }
                    (true, Side::Right, Side::Left) => {
                        pairs.insert(CandidatePair::new(*pos_j, *pos_i));
                    }
                    _ => {}
                }
            }
        }
        Ok(pairs)
    }

    fn random_sample(&self, a: &Table, b: Option<&Table>) -> CandidateSet {
        let space = match b {
            Some(b) => a.len() * b.len(),
            None => a.len() * a.len().saturating_sub(1) / 2,
        };
        let target = if self.random_pairs > 0 {
            self.random_pairs
        } else {
            a.len().max(b.map(Table::len).unwrap_or(0))
        };
        if target >= space {
            return self.full_pairs(a, b);
        }

        let mut rng = StdRng::seed_from_u64(self.random_seed);
        let mut pairs = CandidateSet::default();
        while pairs.len() < target {
            match b {
                Some(b) => {
                    let i = RowPos(rng.random_range(0..a.len() as u32));
                    let j = RowPos(rng.random_range(0..b.len() as u32));
                    pairs.insert(CandidatePair::new(i, j));
                }
                None => {
                    let i = rng.random_range(0..a.len() as u32);
                    let j = rng.random_range(0..a.len() as u32);
                    if i == j {
                        continue;
                    }
                    pairs.insert(CandidatePair::canonical(RowPos(i), RowPos(j)));
                }
            }
        }
        pairs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

fn sorted_entries<'t>(
    table: &'t Table,
    key: &str,
    side: Side,
) -> Result<Vec<(&'t crate::model::Cell, Side, RowPos)>, LinkageError> {
    let column = table.column(key).ok_or_else(|| {
        LinkageError::Configuration(format!(
            "key column `{key}` missing from table `{}`",
            table.name()
        ))
    })?;
    Ok(table
        .row_positions()
        .map(|pos| (column.cell(pos), side, pos))
        .filter(|(cell, _, _)| !cell.is_missing())
        .collect())
}

fn group_by_key(
    table: &Table,
    key: &str,
    interner: &mut ValueInterner,
) -> Result<FxHashMap<ValueId, Vec<RowPos>>, LinkageError> {
    let column = table.column(key).ok_or_else(|| {
        LinkageError::Configuration(format!(
            "key column `{key}` missing from table `{}`",
            table.name()
        ))
    })?;
    let mut groups: FxHashMap<ValueId, Vec<RowPos>> = FxHashMap::default();
    for pos in table.row_positions() {
        // Missing keys never block: a null joins nothing.
        let Some(value) = column.cell(pos).canonical_text() else {
            continue;
        };
        let id = interner.intern(&value);
        groups.entry(id).or_default().push(pos);
    }
    Ok(groups)
}
