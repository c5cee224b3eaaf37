//! Sparse row-major count matrix shared by the label accumulators.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Counts indexed by a `(row, column)` label pair.
///
/// Only pairs that occur are stored, so label values may be arbitrary
/// integers. Iteration is row-major in ascending label order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SparseCounts {
    rows: BTreeMap<i64, BTreeMap<i64, u64>>,
    total: u64,
}

impl SparseCounts {
    /// Empty matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one to `(row, column)`.
    pub fn increment(&mut self, row: i64, column: i64) {
        self.add(row, column, 1);
    }

    /// Add `count` to `(row, column)`.
    pub fn add(&mut self, row: i64, column: i64, count: u64) {
        if count == 0 {
            return;
        }
        *self.rows.entry(row).or_default().entry(column).or_insert(0) += count;
        self.total += count;
    }

    /// Fold `other` into this matrix.
    pub fn merge(&mut self, other: SparseCounts) {
        for (row, columns) in other.rows {
            for (column, count) in columns {
                self.add(row, column, count);
            }
        }
    }

    /// Count at `(row, column)`.
    pub fn get(&self, row: i64, column: i64) -> u64 {
        self.rows
            .get(&row)
            .and_then(|columns| columns.get(&column))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of every count.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Whether nothing was counted.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Labels appearing as rows.
    pub fn row_labels(&self) -> BTreeSet<i64> {
        self.rows.keys().copied().collect()
    }

    /// Labels appearing as columns.
    pub fn column_labels(&self) -> BTreeSet<i64> {
        self.rows.values().flat_map(|columns| columns.keys().copied()).collect()
    }

    /// Sum of one row.
    pub fn row_total(&self, row: i64) -> u64 {
        self.rows.get(&row).map(|columns| columns.values().sum()).unwrap_or(0)
    }

    /// Sum of one column.
    pub fn column_total(&self, column: i64) -> u64 {
        self.rows.values().filter_map(|columns| columns.get(&column)).sum()
    }

    /// Non-zero cells, row-major.
    pub fn iter(&self) -> impl Iterator<Item = (i64, i64, u64)> + '_ {
        self.rows.iter().flat_map(|(&row, columns)| {
            columns.iter().map(move |(&column, &count)| (row, column, count))
        })
    }

    /// Approximate heap size, in bytes.
    pub fn memory_size(&self) -> usize {
        let cells: usize = self.rows.values().map(BTreeMap::len).sum();
        (self.rows.len() + cells) * 4 * std::mem::size_of::<u64>()
    }
}
