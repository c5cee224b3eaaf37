//! Confusion matrix between a reference and a produced label map.

use crate::accumulators::{covered_row, label_of};
use crate::accumulators::sparse::SparseCounts;
use crate::core::error::{ComputeError, RegionError, TilestreamResult};
use crate::core::node::check_input_count;
use crate::core::raster::{ImageInfo, Raster};
use crate::core::region::ImageRegion;
use crate::execution::persistent::Accumulator;
use serde::Serialize;
use std::fmt::Write as _;

/// Default NoData label.
pub const DEFAULT_NODATA_LABEL: i64 = 0;

/// Counts `(reference, produced)` label pairs.
///
/// Pixels where either map holds the NoData label are discarded.
#[derive(Debug, Clone)]
pub struct ConfusionMatrixAccumulator {
    nodata: i64,
    counts: SparseCounts,
}

impl Default for ConfusionMatrixAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_NODATA_LABEL)
    }
}

impl ConfusionMatrixAccumulator {
    /// Accumulator discarding `nodata` pixels.
    pub fn new(nodata: i64) -> Self {
        Self {
            nodata,
            counts: SparseCounts::new(),
        }
    }

    /// NoData label.
    pub fn nodata(&self) -> i64 {
        self.nodata
    }
}

impl Accumulator for ConfusionMatrixAccumulator {
    type Partial = SparseCounts;
    type Output = ConfusionMatrix;

    fn name(&self) -> &str {
        "confusion_matrix"
    }

    fn input_count(&self) -> usize {
        2
    }

    fn validate(&self, inputs: &[ImageInfo]) -> TilestreamResult<()> {
        check_input_count(self.name(), 2, inputs.len())?;
        for info in inputs {
            if info.bands != 1 {
                return Err(RegionError::BandMismatch {
                    node: self.name().to_string(),
                    expected: 1,
                    got: info.bands,
                }
                .into());
            }
        }
        Ok(())
    }

    fn reset(&mut self, _inputs: &[ImageInfo]) -> TilestreamResult<()> {
        self.counts = SparseCounts::new();
        Ok(())
    }

    fn identity(&self) -> SparseCounts {
        SparseCounts::new()
    }

    fn accumulate(
        &self,
        inputs: &[&Raster],
        partition: &ImageRegion,
        partial: &mut SparseCounts,
    ) -> Result<(), ComputeError> {
        let (reference, produced) = (inputs[0], inputs[1]);
        for y in partition.y()..partition.end(1) {
            let reference = covered_row(self.name(), reference, y, partition)?;
            let produced = covered_row(self.name(), produced, y, partition)?;
            for (&r, &p) in reference.iter().zip(produced) {
                let (r, p) = (label_of(r), label_of(p));
                if r != self.nodata && p != self.nodata {
                    partial.increment(r, p);
                }
            }
        }
        Ok(())
    }

    fn merge(&mut self, partial: SparseCounts) {
        self.counts.merge(partial);
    }

    fn finalize(&mut self) -> Result<ConfusionMatrix, ComputeError> {
        let matrix = ConfusionMatrix::from_counts(&self.counts);
        log::debug!(
            "Confusion matrix over {} labels and {} pixel(s)",
            matrix.labels.len(),
            matrix.total()
        );
        Ok(matrix)
    }
}

/// Dense confusion matrix over the sorted union of reference and produced
/// labels. Rows are reference labels, columns produced labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    /// Labels, ascending.
    pub labels: Vec<i64>,
    /// `counts[row][column]`.
    pub counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    /// Densify sparse `(reference, produced)` counts.
    pub fn from_counts(counts: &SparseCounts) -> Self {
        let labels: Vec<i64> = counts
            .row_labels()
            .union(&counts.column_labels())
            .copied()
            .collect();
        let dense = labels
            .iter()
            .map(|&r| labels.iter().map(|&c| counts.get(r, c)).collect())
            .collect();
        Self {
            labels,
            counts: dense,
        }
    }

    fn index(&self, label: i64) -> Option<usize> {
        self.labels.binary_search(&label).ok()
    }

    /// Count of pixels labelled `reference` and produced as `produced`.
    pub fn get(&self, reference: i64, produced: i64) -> u64 {
        match (self.index(reference), self.index(produced)) {
            (Some(r), Some(c)) => self.counts[r][c],
            _ => 0,
        }
    }

    /// Number of counted pixels.
    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    fn row_total(&self, i: usize) -> u64 {
        self.counts[i].iter().sum()
    }

    fn column_total(&self, i: usize) -> u64 {
        self.counts.iter().map(|row| row[i]).sum()
    }

    fn trace(&self) -> u64 {
        (0..self.labels.len()).map(|i| self.counts[i][i]).sum()
    }

    /// Fraction of counted pixels on the diagonal.
    pub fn overall_accuracy(&self) -> f64 {
        ratio(self.trace() as f64, self.total() as f64)
    }

    /// Cohen's kappa.
    pub fn kappa(&self) -> f64 {
        let total = self.total() as f64;
        if total == 0.0 {
            return 0.0;
        }
        let observed = self.overall_accuracy();
        let expected = (0..self.labels.len())
            .map(|i| self.row_total(i) as f64 * self.column_total(i) as f64)
            .sum::<f64>()
            / (total * total);
        ratio(observed - expected, 1.0 - expected)
    }

    /// Per-label precision (diagonal over column total).
    pub fn precisions(&self) -> Vec<f64> {
        (0..self.labels.len())
            .map(|i| ratio(self.counts[i][i] as f64, self.column_total(i) as f64))
            .collect()
    }

    /// Per-label recall (diagonal over row total).
    pub fn recalls(&self) -> Vec<f64> {
        (0..self.labels.len())
            .map(|i| ratio(self.counts[i][i] as f64, self.row_total(i) as f64))
            .collect()
    }

    /// Per-label F-score.
    pub fn f_scores(&self) -> Vec<f64> {
        self.precisions()
            .into_iter()
            .zip(self.recalls())
            .map(|(p, r)| ratio(2.0 * p * r, p + r))
            .collect()
    }

    /// Comma-separated rendering with the two label header lines.
    pub fn to_csv(&self) -> String {
        let labels = self
            .labels
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let mut csv = String::new();
        let _ = writeln!(csv, "#Reference labels (rows):{}", labels);
        let _ = writeln!(csv, "#Produced labels (columns):{}", labels);
        for row in &self.counts {
            let line = row.iter().map(u64::to_string).collect::<Vec<_>>().join(",");
            let _ = writeln!(csv, "{}", line);
        }
        csv
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TilestreamError;
    use crate::core::source::MemorySource;
    use crate::execution::{ExecutionOptions, PersistentFilter, Pipeline, PipelineState, StreamingConfig};
    use crate::graph::PipelineGraph;

    fn confusion(
        reference: MemorySource,
        produced: MemorySource,
        nodata: i64,
    ) -> (TilestreamResult<()>, PersistentFilter<ConfusionMatrixAccumulator>) {
        let mut graph = PipelineGraph::new();
        let r = graph.add_source(reference);
        let p = graph.add_source(produced);
        let mut pipeline = Pipeline::new(graph)
            .with_streaming(StreamingConfig::new().with_lines_per_division(2))
            .with_options(ExecutionOptions::new().with_max_threads(2));
        let mut filter = PersistentFilter::new(ConfusionMatrixAccumulator::new(nodata), &[r, p]);
        let outcome = pipeline.update(&mut filter).map(|_| ());
        (outcome, filter)
    }

    #[test]
    fn test_counts_and_measurements() {
        #[rustfmt::skip]
        let reference = MemorySource::labels(4, 3, &[
            1, 1, 2, 2,
            1, 1, 2, 2,
            3, 3, 0, 2,
        ]).unwrap();
        #[rustfmt::skip]
        let produced = MemorySource::labels(4, 3, &[
            1, 2, 2, 2,
            1, 1, 2, 0,
            3, 1, 3, 2,
        ]).unwrap();
        let (outcome, mut filter) = confusion(reference, produced, 0);
        outcome.unwrap();
        assert_eq!(filter.state(), PipelineState::Idle);
        let matrix = filter.take_result().unwrap();

        assert_eq!(matrix.labels, vec![1, 2, 3]);
        assert_eq!(matrix.total(), 10);
        assert_eq!(matrix.get(1, 1), 3);
        assert_eq!(matrix.get(1, 2), 1);
        assert_eq!(matrix.get(2, 2), 4);
        assert_eq!(matrix.get(3, 3), 1);
        assert_eq!(matrix.get(3, 1), 1);
        assert_eq!(matrix.get(0, 3), 0);

        assert!((matrix.overall_accuracy() - 0.8).abs() < 1e-12);
        let recalls = matrix.recalls();
        assert!((recalls[0] - 0.75).abs() < 1e-12);
        assert!((recalls[1] - 1.0).abs() < 1e-12);
        let precisions = matrix.precisions();
        assert!((precisions[0] - 0.75).abs() < 1e-12);
        assert!((precisions[1] - 0.8).abs() < 1e-12);
        // pe = (4*4 + 4*5 + 2*1) / 100 = 0.38
        assert!((matrix.kappa() - (0.8 - 0.38) / 0.62).abs() < 1e-12);

        let csv = matrix.to_csv();
        assert!(csv.starts_with("#Reference labels (rows):1,2,3\n#Produced labels (columns):1,2,3\n"));
        assert!(csv.ends_with("3,1,0\n0,4,0\n1,0,1\n"));
    }

    #[test]
    fn test_mismatched_shapes_fail_before_any_thread() {
        let reference = MemorySource::labels(100, 100, &vec![1; 10_000]).unwrap();
        let produced = MemorySource::labels(80, 100, &vec![1; 8_000]).unwrap();
        let (outcome, filter) = confusion(reference, produced, 0);
        assert!(matches!(
            outcome,
            Err(TilestreamError::Region(RegionError::Incongruent { .. }))
        ));
        assert_eq!(filter.state(), PipelineState::Idle);
        assert!(filter.result().is_none());
    }

    #[test]
    fn test_multi_band_input_rejected() {
        let accumulator = ConfusionMatrixAccumulator::default();
        let single = ImageInfo::new(4, 4, 1, crate::core::raster::ComponentType::I32);
        let double = single.with_bands(2);
        assert!(accumulator.validate(&[single, single]).is_ok());
        assert!(matches!(
            accumulator.validate(&[single, double]),
            Err(TilestreamError::Region(RegionError::BandMismatch { got: 2, .. }))
        ));
    }
}
