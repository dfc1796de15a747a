//! # Entropy-Guided Key Selection
//!
//! Ranks table columns by Shannon entropy of their value distributions and
//! selects the most discriminative common columns as blocking keys.
//! Identifier-like columns carry no grouping signal and are excluded.

use crate::error::LinkageError;
use crate::model::{Column, Table};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Shannon entropy (natural log) of the normalized value-frequency
/// distribution over a column's non-missing cells.
///
/// Empty or all-missing columns score 0.0 and therefore rank last.
pub fn column_entropy(column: &Column) -> f64 {
    let mut counts: FxHashMap<String, usize> = FxHashMap::default();
    let mut total = 0usize;
    for cell in column.cells() {
        let Some(value) = cell.canonical_text() else {
            continue;
        };
        *counts.entry(value).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.ln()
        })
        .sum()
}

/// Rank non-identifier columns by descending entropy.
///
/// The sort is stable, so equal-entropy columns keep declaration order and
/// the ranking is deterministic.
pub fn rank_columns(table: &Table) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = table
        .columns()
        .iter()
        .filter(|column| !column.is_identifier_like())
        .map(|column| (column.name.clone(), column_entropy(column)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

/// Select the single maximum-entropy column of a table (single-table dedup).
pub fn select_key(table: &Table) -> Result<String, LinkageError> {
    rank_columns(table)
        .into_iter()
        .next()
        .map(|(name, _)| name)
        .ok_or(LinkageError::NoIndexingKey)
}

/// Select up to `k` blocking keys shared by both tables, walking table a's
/// entropy ranking in descending order.
pub fn select_keys(a: &Table, b: &Table, k: usize) -> Result<Vec<String>, LinkageError> {
    let keys: Vec<String> = rank_columns(a)
        .into_iter()
        .filter(|(name, _)| b.has_column(name))
        .take(k.max(1))
        .map(|(name, entropy)| {
            debug!(key = %name, entropy, "selected indexing key");
            name
        })
        .collect();
    if keys.is_empty() {
        return Err(LinkageError::NoIndexingKey);
    }
    Ok(keys)
}

/// The lowest-entropy common column. Not used for blocking; useful as a
/// contrast diagnostic when inspecting key selection on a new dataset.
pub fn select_lowest_entropy_key(a: &Table, b: &Table) -> Result<String, LinkageError> {
    rank_columns(a)
        .into_iter()
        .rev()
        .find(|(name, _)| b.has_column(name))
        .map(|(name, _)| name)
        .ok_or(LinkageError::NoIndexingKey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, Table, ID_COLUMN};

    fn table(name: &str, columns: Vec<Column>) -> Table {
        Table::new(name, columns).unwrap()
    }

    #[test]
    fn test_constant_column_has_zero_entropy() {
        let constant = Column::text("city", &[Some("berlin"); 6]);
        assert_eq!(column_entropy(&constant), 0.0);

        let varied = Column::text("name", &[Some("a"), Some("bb"), Some("ccc"), Some("a")]);
        assert!(column_entropy(&varied) > 0.0);
    }

    #[test]
    fn test_empty_and_missing_columns_rank_last() {
        let t = table(
            "t",
            vec![
                Column::text("empty", &[None, None, None]),
                Column::text("name", &[Some("ann"), Some("robert"), Some("ann")]),
            ],
        );
        let ranking = rank_columns(&t);
        assert_eq!(ranking.last().unwrap().0, "empty");
        assert_eq!(ranking.last().unwrap().1, 0.0);
    }

    #[test]
    fn test_ranking_is_deterministic_and_excludes_identifiers() {
        let columns = vec![
            Column::text(ID_COLUMN, &[Some("1"), Some("2"), Some("3"), Some("4")]),
            Column::text(
                "name",
                &[Some("ann"), Some("robert"), Some("christina"), Some("ann")],
            ),
            Column::text("city", &[Some("rome"); 4]),
        ];
        let t = table("t", columns);

        let first = rank_columns(&t);
        let second = rank_columns(&t);
        assert_eq!(first, second);
        assert!(first.iter().all(|(name, _)| name != ID_COLUMN));
        assert_eq!(first[0].0, "name");
        assert_eq!(first[1].0, "city");
    }

    #[test]
    fn test_select_keys_walks_common_columns() {
        let a = table(
            "a",
            vec![
                Column::text(
                    "surname",
                    &[Some("nagel"), Some("ott"), Some("mayer"), Some("ott")],
                ),
                Column::text("city", &[Some("ulm"), Some("ulm"), Some("bonn"), Some("ulm")]),
                Column::text("only_in_a", &[Some("w"), Some("x"), Some("y"), Some("z")]),
            ],
        );
        let b = table(
            "b",
            vec![
                Column::text("surname", &[Some("nagel"), Some("ott")]),
                Column::text("city", &[Some("ulm"), Some("bonn")]),
            ],
        );

        let keys = select_keys(&a, &b, 2).unwrap();
        assert_eq!(keys, vec!["surname".to_string(), "city".to_string()]);

        let lowest = select_lowest_entropy_key(&a, &b).unwrap();
        assert_eq!(lowest, "city");
    }

    #[test]
    fn test_no_common_column_fails() {
        let a = table(
            "a",
            vec![Column::text("x", &[Some("p"), Some("q"), Some("q")])],
        );
        let b = table(
            "b",
            vec![Column::text("y", &[Some("p"), Some("q"), Some("q")])],
        );
        assert!(matches!(
            select_keys(&a, &b, 1),
            Err(LinkageError::NoIndexingKey)
        ));
    }

    #[test]
    fn test_single_table_key_is_max_entropy() {
        let t = table(
            "t",
            vec![
                Column::text("city", &[Some("rome"), Some("rome"), Some("oslo")]),
                Column::text("name", &[Some("a"), Some("bb"), Some("ccc")]),
            ],
        );
        // "name" has three distinct values but uniform lengths 1..3 and a
        // uniqueness ratio of 1.0, so it is identifier-like and skipped.
        assert_eq!(select_key(&t).unwrap(), "city");
    }
}
