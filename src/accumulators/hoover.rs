//! Hoover instance metrics between a ground-truth and a machine segmentation.
//!
//! The accumulator records how many pixels every ground-truth segment shares
//! with every machine segment, plus the size of each segment. Detections are
//! classified afterwards for any overlap tolerance `t` in `(0.5, 1]`: a pair
//! is a correct detection when the overlap covers at least `t` of both
//! segments; a ground-truth segment in no correct detection is missed, and a
//! machine segment in no correct detection is noise.

use crate::accumulators::{covered_row, label_of};
use crate::accumulators::sparse::SparseCounts;
use crate::core::error::{ComputeError, ConfigurationError, RegionError, TilestreamResult};
use crate::core::node::check_input_count;
use crate::core::raster::{ImageInfo, Raster};
use crate::core::region::ImageRegion;
use crate::execution::persistent::Accumulator;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Per-thread overlap and size counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HooverPartial {
    /// `(ground truth, machine)` shared pixel counts.
    pub overlaps: SparseCounts,
    /// Pixel count of every ground-truth segment.
    pub ground_truth_sizes: BTreeMap<i64, u64>,
    /// Pixel count of every machine segment.
    pub machine_sizes: BTreeMap<i64, u64>,
}

impl HooverPartial {
    fn merge(&mut self, other: HooverPartial) {
        self.overlaps.merge(other.overlaps);
        for (label, size) in other.ground_truth_sizes {
            *self.ground_truth_sizes.entry(label).or_insert(0) += size;
        }
        for (label, size) in other.machine_sizes {
            *self.machine_sizes.entry(label).or_insert(0) += size;
        }
    }
}

/// Accumulates a [`HooverMatrix`]; the background label is not an instance.
#[derive(Debug, Clone, Default)]
pub struct HooverAccumulator {
    background: i64,
    state: HooverPartial,
}

impl HooverAccumulator {
    /// Accumulator treating `background` as no instance.
    pub fn new(background: i64) -> Self {
        Self {
            background,
            state: HooverPartial::default(),
        }
    }
}

impl Accumulator for HooverAccumulator {
    type Partial = HooverPartial;
    type Output = HooverMatrix;

    fn name(&self) -> &str {
        "hoover"
    }

    fn input_count(&self) -> usize {
        2
    }

    fn validate(&self, inputs: &[ImageInfo]) -> TilestreamResult<()> {
        check_input_count(self.name(), 2, inputs.len())?;
        if let Some(info) = inputs.iter().find(|info| info.bands != 1) {
            return Err(RegionError::BandMismatch {
                node: self.name().to_string(),
                expected: 1,
                got: info.bands,
            }
            .into());
        }
        Ok(())
    }

    fn reset(&mut self, _inputs: &[ImageInfo]) -> TilestreamResult<()> {
        self.state = HooverPartial::default();
        Ok(())
    }

    fn identity(&self) -> HooverPartial {
        HooverPartial::default()
    }

    fn accumulate(
        &self,
        inputs: &[&Raster],
        partition: &ImageRegion,
        partial: &mut HooverPartial,
    ) -> Result<(), ComputeError> {
        for y in partition.y()..partition.end(1) {
            let truth = covered_row(self.name(), inputs[0], y, partition)?;
            let machine = covered_row(self.name(), inputs[1], y, partition)?;
            for (&g, &m) in truth.iter().zip(machine) {
                let (g, m) = (label_of(g), label_of(m));
                let g_instance = g != self.background;
                let m_instance = m != self.background;
                if g_instance {
                    *partial.ground_truth_sizes.entry(g).or_insert(0) += 1;
                }
                if m_instance {
                    *partial.machine_sizes.entry(m).or_insert(0) += 1;
                }
                if g_instance && m_instance {
                    partial.overlaps.increment(g, m);
                }
            }
        }
        Ok(())
    }

    fn merge(&mut self, partial: HooverPartial) {
        self.state.merge(partial);
    }

    fn finalize(&mut self) -> Result<HooverMatrix, ComputeError> {
        Ok(HooverMatrix {
            counts: std::mem::take(&mut self.state),
        })
    }
}

/// Finished overlap counts with the Hoover classification queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HooverMatrix {
    counts: HooverPartial,
}

impl HooverMatrix {
    /// Raw counts.
    pub fn counts(&self) -> &HooverPartial {
        &self.counts
    }

    /// Pixels shared by ground-truth segment `truth` and machine segment `machine`.
    pub fn overlap(&self, truth: i64, machine: i64) -> u64 {
        self.counts.overlaps.get(truth, machine)
    }

    /// `(ground truth, machine)` pairs overlapping by at least `tolerance`
    /// of both segments.
    pub fn correct_detections(
        &self,
        tolerance: f64,
    ) -> Result<Vec<(i64, i64)>, ConfigurationError> {
        check_tolerance(tolerance)?;
        let detections = self
            .counts
            .overlaps
            .iter()
            .filter(|&(g, m, overlap)| {
                let g_size = self.counts.ground_truth_sizes.get(&g).copied().unwrap_or(0);
                let m_size = self.counts.machine_sizes.get(&m).copied().unwrap_or(0);
                overlap as f64 >= tolerance * g_size as f64
                    && overlap as f64 >= tolerance * m_size as f64
            })
            .map(|(g, m, _)| (g, m))
            .collect();
        Ok(detections)
    }

    /// Ground-truth segments without a correct detection.
    pub fn missed(&self, tolerance: f64) -> Result<Vec<i64>, ConfigurationError> {
        let detected: BTreeSet<i64> = self
            .correct_detections(tolerance)?
            .into_iter()
            .map(|(g, _)| g)
            .collect();
        Ok(self
            .counts
            .ground_truth_sizes
            .keys()
            .copied()
            .filter(|g| !detected.contains(g))
            .collect())
    }

    /// Machine segments without a correct detection.
    pub fn noise(&self, tolerance: f64) -> Result<Vec<i64>, ConfigurationError> {
        let detected: BTreeSet<i64> = self
            .correct_detections(tolerance)?
            .into_iter()
            .map(|(_, m)| m)
            .collect();
        Ok(self
            .counts
            .machine_sizes
            .keys()
            .copied()
            .filter(|m| !detected.contains(m))
            .collect())
    }
}

fn check_tolerance(tolerance: f64) -> Result<(), ConfigurationError> {
    if tolerance > 0.5 && tolerance <= 1.0 {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidParameter {
            filter: "hoover".to_string(),
            parameter: "tolerance".to_string(),
            reason: format!("{} is outside (0.5, 1]", tolerance),
        })
    }
}
