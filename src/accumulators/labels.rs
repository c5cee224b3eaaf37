//! Distinct labels of a label map.

use crate::accumulators::{covered_row, label_of};
use crate::core::error::{ComputeError, TilestreamResult};
use crate::core::raster::{ImageInfo, Raster};
use crate::core::region::ImageRegion;
use crate::execution::persistent::Accumulator;
use std::collections::BTreeSet;

/// Collects every label present in any band of its input.
#[derive(Debug, Clone, Default)]
pub struct LabelSetAccumulator {
    labels: BTreeSet<i64>,
}

impl LabelSetAccumulator {
    /// Empty label set.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Accumulator for LabelSetAccumulator {
    type Partial = BTreeSet<i64>;
    type Output = BTreeSet<i64>;

    fn name(&self) -> &str {
        "label_set"
    }

    fn reset(&mut self, _inputs: &[ImageInfo]) -> TilestreamResult<()> {
        self.labels.clear();
        Ok(())
    }

    fn identity(&self) -> BTreeSet<i64> {
        BTreeSet::new()
    }

    fn accumulate(
        &self,
        inputs: &[&Raster],
        partition: &ImageRegion,
        partial: &mut BTreeSet<i64>,
    ) -> Result<(), ComputeError> {
        for y in partition.y()..partition.end(1) {
            let row = covered_row(self.name(), inputs[0], y, partition)?;
            partial.extend(row.iter().map(|&v| label_of(v)));
        }
        Ok(())
    }

    fn merge(&mut self, partial: BTreeSet<i64>) {
        self.labels.extend(partial);
    }

    fn finalize(&mut self) -> Result<BTreeSet<i64>, ComputeError> {
        Ok(std::mem::take(&mut self.labels))
    }
}
