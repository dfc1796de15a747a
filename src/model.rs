//! # Data Model
//!
//! Tabular structures for record linkage: typed columns, row positions,
//! candidate pairs, and value interning for efficient grouping.

use crate::error::LinkageError;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Conventional name of the dataset-assigned identifier column.
pub const ID_COLUMN: &str = "id";

/// Compact identifier for row positions within a table.
///
/// All candidate pairs are indexed by row position; the `id` column is used
/// only for joining against ground truth and supplied candidate sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowPos(pub u32);

impl fmt::Display for RowPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Dataset-assigned unique identifier of a record (the `id` column value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordUid(pub String);

impl fmt::Display for RecordUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordUid {
    fn from(value: &str) -> Self {
        RecordUid(value.to_string())
    }
}

impl From<String> for RecordUid {
    fn from(value: String) -> Self {
        RecordUid(value)
    }
}

/// Compact identifier for interned cell values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.0)
    }
}

/// A pair of row positions proposed for comparison.
///
/// In single-table deduplication both positions index the same table and the
/// pair is stored canonical (`left < right`). In two-table linkage `left`
/// indexes the first table and `right` the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidatePair {
    pub left: RowPos,
    pub right: RowPos,
}

impl CandidatePair {
    /// Create a pair preserving the given order (two-table linkage).
    pub fn new(left: RowPos, right: RowPos) -> Self {
        Self { left, right }
    }

    /// Create a pair in canonical ascending order (single-table dedup).
    pub fn canonical(a: RowPos, b: RowPos) -> Self {
        if a <= b {
            Self { left: a, right: b }
        } else {
            Self { left: b, right: a }
        }
    }

    /// Return the canonical form of this pair. Idempotent.
    pub fn canonicalized(self) -> Self {
        Self::canonical(self.left, self.right)
    }

    /// The same pair with sides swapped.
    pub fn swapped(self) -> Self {
        Self {
            left: self.right,
            right: self.left,
        }
    }
}

impl fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.left, self.right)
    }
}

/// A pair of record identifiers, as found in ground truth.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UidPair {
    pub left: RecordUid,
    pub right: RecordUid,
}

impl UidPair {
    pub fn new(left: impl Into<RecordUid>, right: impl Into<RecordUid>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Return the canonical ascending form of this pair. Idempotent.
    pub fn canonical(&self) -> Self {
        if self.left <= self.right {
            self.clone()
        } else {
            Self {
                left: self.right.clone(),
                right: self.left.clone(),
            }
        }
    }
}

impl fmt::Display for UidPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.left, self.right)
    }
}

/// Semantic column classification, decided once at column construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Text,
    Numeric,
    Datetime,
    Unknown,
}

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Text(String),
    Number(f64),
    Timestamp(i64),
    Missing,
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Canonical string form used for grouping, interning, and uid joins.
    /// Missing cells have no canonical form.
    pub fn canonical_text(&self) -> Option<String> {
        match self {
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) => Some(format!("{n}")),
            Cell::Timestamp(t) => Some(format!("{t}")),
            Cell::Missing => None,
        }
    }

    fn sort_rank(&self) -> u8 {
        match self {
            Cell::Number(_) => 0,
            Cell::Timestamp(_) => 1,
            Cell::Text(_) => 2,
            Cell::Missing => 3,
        }
    }

    /// Total ordering used by sorted-neighbourhood blocking.
    /// Missing cells sort last; mixed variants order by variant.
    pub fn cmp_for_sort(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Number(a), Cell::Number(b)) => a.total_cmp(b),
            (Cell::Timestamp(a), Cell::Timestamp(b)) => a.cmp(b),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            _ => self.sort_rank().cmp(&other.sort_rank()),
        }
    }
}

/// A named, typed column of cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            kind,
            cells,
        }
    }

    /// Build a text column from optional string values.
    pub fn text(name: &str, values: &[Option<&str>]) -> Self {
        let cells = values
            .iter()
            .map(|v| match v {
                Some(s) => Cell::Text((*s).to_string()),
                None => Cell::Missing,
            })
            .collect();
        Self::new(name, ColumnKind::Text, cells)
    }

    /// Build a numeric column from optional values.
    pub fn numeric(name: &str, values: &[Option<f64>]) -> Self {
        let cells = values
            .iter()
            .map(|v| match v {
                Some(n) => Cell::Number(*n),
                None => Cell::Missing,
            })
            .collect();
        Self::new(name, ColumnKind::Numeric, cells)
    }

    /// Build a datetime column from optional epoch timestamps.
    pub fn datetime(name: &str, values: &[Option<i64>]) -> Self {
        let cells = values
            .iter()
            .map(|v| match v {
                Some(t) => Cell::Timestamp(*t),
                None => Cell::Missing,
            })
            .collect();
        Self::new(name, ColumnKind::Datetime, cells)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, pos: RowPos) -> &Cell {
        &self.cells[pos.0 as usize]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Heuristic identifier detection: near-uniform value length combined
    /// with a uniqueness ratio above 0.9. The designated `id` column is
    /// always identifier-like.
    pub fn is_identifier_like(&self) -> bool {
        if self.name == ID_COLUMN {
            return true;
        }
        let values: Vec<String> = self.cells.iter().filter_map(Cell::canonical_text).collect();
        if values.is_empty() {
            return false;
        }
        let mut lengths = rustc_hash::FxHashSet::default();
        let mut distinct = rustc_hash::FxHashSet::default();
        for value in &values {
            lengths.insert(value.len());
            distinct.insert(value.as_str());
        }
        let unique_ratio = distinct.len() as f64 / values.len() as f64;
        lengths.len() <= 3 && unique_ratio > 0.9
    }
}

/// An ordered table of named columns with stable row positions.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    num_rows: usize,
    uid_index: FxHashMap<RecordUid, RowPos>,
}

impl Table {
    /// Create a table, validating that all columns have the same length and
    /// indexing the `id` column (when present) for uid joins.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self, LinkageError> {
        let name = name.into();
        let num_rows = columns.first().map(Column::len).unwrap_or(0);
        for column in &columns {
            if column.len() != num_rows {
                return Err(LinkageError::Configuration(format!(
                    "table `{}`: column `{}` has {} rows, expected {}",
                    name,
                    column.name,
                    column.len(),
                    num_rows
                )));
            }
        }

        let mut uid_index = FxHashMap::default();
        if let Some(id_column) = columns.iter().find(|c| c.name == ID_COLUMN) {
            for (pos, cell) in id_column.cells().iter().enumerate() {
                let Some(uid) = cell.canonical_text() else {
                    continue;
                };
                let uid = RecordUid(uid);
                if uid_index.insert(uid.clone(), RowPos(pos as u32)).is_some() {
                    tracing::warn!(table = %name, uid = %uid, "duplicate uid, keeping last occurrence");
                }
            }
        }

        Ok(Self {
            name,
            columns,
            num_rows,
            uid_index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Column names present in both tables, in this table's declaration order.
    pub fn common_columns(&self, other: &Table) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| other.has_column(&c.name))
            .map(|c| c.name.clone())
            .collect()
    }

    /// The uid of the record at a row position, through the `id` column.
    pub fn uid_at(&self, pos: RowPos) -> Option<RecordUid> {
        let id_column = self.column(ID_COLUMN)?;
        id_column.cell(pos).canonical_text().map(RecordUid)
    }

    /// The row position holding a uid, through the `id` column.
    pub fn position_of(&self, uid: &RecordUid) -> Option<RowPos> {
        self.uid_index.get(uid).copied()
    }

    pub fn row_positions(&self) -> impl Iterator<Item = RowPos> {
        (0..self.num_rows as u32).map(RowPos)
    }
}

/// Interner mapping cell values to compact ids for fast hash grouping.
#[derive(Debug, Clone, Default)]
pub struct ValueInterner {
    value_to_id: FxHashMap<String, ValueId>,
    id_to_value: Vec<String>,
}

impl ValueInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a value string and return its id.
    pub fn intern(&mut self, value: &str) -> ValueId {
        if let Some(&id) = self.value_to_id.get(value) {
            return id;
        }
        let id = ValueId(self.id_to_value.len() as u32);
        self.value_to_id.insert(value.to_string(), id);
        self.id_to_value.push(value.to_string());
        id
    }

    /// Look up an already interned value.
    pub fn get(&self, value: &str) -> Option<ValueId> {
        self.value_to_id.get(value).copied()
    }

    /// Resolve an id back to its value string.
    pub fn resolve(&self, id: ValueId) -> Option<&str> {
        self.id_to_value.get(id.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.id_to_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_value.is_empty()
    }
}
