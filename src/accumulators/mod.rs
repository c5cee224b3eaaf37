//! Built-in accumulators.
//!
//! Every accumulator here plugs into [`crate::execution::PersistentFilter`]:
//! threads fill private partials, partials are merged in thread order after
//! each division, and the result is produced once the last division is done.

pub mod confusion;
pub mod hoover;
pub mod labels;
pub mod sparse;
pub mod statistics;

pub use confusion::{ConfusionMatrix, ConfusionMatrixAccumulator, DEFAULT_NODATA_LABEL};
pub use hoover::{HooverAccumulator, HooverMatrix, HooverPartial};
pub use labels::LabelSetAccumulator;
pub use sparse::SparseCounts;
pub use statistics::{Statistics, StatisticsConfig, StatisticsPartial, StreamingStatistics};

use crate::core::error::ComputeError;
use crate::core::raster::Raster;
use crate::core::region::ImageRegion;

/// Integer label carried by a sample.
pub(crate) fn label_of(sample: f64) -> i64 {
    sample.round() as i64
}

/// Row `y` of `partition` in `input`; an error if `input` does not cover it.
pub(crate) fn covered_row<'a>(
    name: &str,
    input: &'a Raster,
    y: i64,
    partition: &ImageRegion,
) -> Result<&'a [f64], ComputeError> {
    input
        .row_span(y, partition)
        .filter(|row| row.len() == partition.width() as usize * input.bands())
        .ok_or_else(|| ComputeError::Filter {
            filter: name.to_string(),
            message: format!("input {} does not cover row {} of {}", input.region(), y, partition),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covered_row() {
        let raster = Raster::new(ImageRegion::rect(0, 0, 4, 2), 2);
        let inside = ImageRegion::rect(1, 0, 3, 2);
        assert_eq!(covered_row("t", &raster, 1, &inside).unwrap().len(), 6);

        let wider = ImageRegion::rect(2, 0, 4, 2);
        assert!(matches!(
            covered_row("t", &raster, 0, &wider),
            Err(ComputeError::Filter { .. })
        ));
        let below = ImageRegion::rect(0, 1, 4, 2);
        assert!(covered_row("t", &raster, 2, &below).is_err());
    }
}
