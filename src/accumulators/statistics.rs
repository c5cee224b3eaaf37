//! Streaming per-band statistics.
//!
//! [`StreamingStatistics`] accumulates min, max, first- and second-order sums
//! of every band over a streamed image. Each worker thread keeps its own
//! [`StatisticsPartial`]; partials are merged in thread order after every
//! division, and the final moments are derived once at the end.

use crate::accumulators::covered_row;
use crate::core::error::{ComputeError, TilestreamResult};
use crate::core::raster::{ImageInfo, Raster};
use crate::core::region::ImageRegion;
use crate::execution::persistent::Accumulator;
use serde::{Deserialize, Serialize};

/// What to compute and which pixels to skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatisticsConfig {
    /// Track per-band minimum and maximum.
    pub enable_minmax: bool,
    /// Track sums, means and variances.
    pub enable_first_order: bool,
    /// Track band cross products (covariance and second moments).
    pub enable_second_order: bool,
    /// Skip pixels with a non-finite sample.
    pub ignore_infinite_values: bool,
    /// Skip pixels whose every band equals this value.
    pub ignored_value: Option<f64>,
    /// Scale variances by `n / (n - 1)`.
    pub use_unbiased_estimator: bool,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            enable_minmax: true,
            enable_first_order: true,
            enable_second_order: false,
            ignore_infinite_values: true,
            ignored_value: None,
            use_unbiased_estimator: false,
        }
    }
}

/// Thread-private running sums.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsPartial {
    min: Vec<f64>,
    max: Vec<f64>,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    cross: Vec<f64>,
    component_sum: f64,
    component_sum_sq: f64,
    count: u64,
    ignored_infinite: u64,
    ignored_user: u64,
}

impl StatisticsPartial {
    fn identity(bands: usize, second_order: bool) -> Self {
        Self {
            min: vec![f64::INFINITY; bands],
            max: vec![f64::NEG_INFINITY; bands],
            sum: vec![0.0; bands],
            sum_sq: vec![0.0; bands],
            cross: if second_order { vec![0.0; bands * bands] } else { Vec::new() },
            component_sum: 0.0,
            component_sum_sq: 0.0,
            count: 0,
            ignored_infinite: 0,
            ignored_user: 0,
        }
    }

    fn add_pixel(&mut self, pixel: &[f64]) {
        for (band, &value) in pixel.iter().enumerate() {
            self.min[band] = self.min[band].min(value);
            self.max[band] = self.max[band].max(value);
            self.sum[band] += value;
            self.sum_sq[band] += value * value;
            self.component_sum += value;
            self.component_sum_sq += value * value;
        }
        if !self.cross.is_empty() {
            let bands = pixel.len();
            for r in 0..bands {
                for c in 0..bands {
                    self.cross[r * bands + c] += pixel[r] * pixel[c];
                }
            }
        }
        self.count += 1;
    }

    fn merge(&mut self, other: &StatisticsPartial) {
        for band in 0..self.sum.len() {
            self.min[band] = self.min[band].min(other.min[band]);
            self.max[band] = self.max[band].max(other.max[band]);
            self.sum[band] += other.sum[band];
            self.sum_sq[band] += other.sum_sq[band];
        }
        for (mine, theirs) in self.cross.iter_mut().zip(&other.cross) {
            *mine += theirs;
        }
        self.component_sum += other.component_sum;
        self.component_sum_sq += other.component_sum_sq;
        self.count += other.count;
        self.ignored_infinite += other.ignored_infinite;
        self.ignored_user += other.ignored_user;
    }
}

/// Final statistics of a run. Disabled groups are left empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    /// Number of bands.
    pub bands: usize,
    /// Pixels that contributed.
    pub count: u64,
    /// Pixels skipped for a non-finite sample.
    pub ignored_infinite: u64,
    /// Pixels skipped for matching the ignored value.
    pub ignored_user: u64,
    /// Per-band minimum.
    pub min: Vec<f64>,
    /// Per-band maximum.
    pub max: Vec<f64>,
    /// Per-band sum.
    pub sum: Vec<f64>,
    /// Per-band mean.
    pub mean: Vec<f64>,
    /// Per-band sum of squares.
    pub sum_of_squares: Vec<f64>,
    /// Per-band variance, never negative.
    pub variance: Vec<f64>,
    /// Band covariance matrix, row-major.
    pub covariance: Option<Vec<Vec<f64>>>,
    /// Band second-moment matrix `E[x_r x_c]`, row-major.
    pub correlation: Option<Vec<Vec<f64>>>,
    /// Mean over every sample of every band.
    pub component_mean: Option<f64>,
    /// Variance over every sample of every band.
    pub component_variance: Option<f64>,
}

/// Per-band statistics accumulator.
#[derive(Debug, Clone, Default)]
pub struct StreamingStatistics {
    config: StatisticsConfig,
    bands: usize,
    aggregate: Option<StatisticsPartial>,
}

impl StreamingStatistics {
    /// Accumulator with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator with `config`.
    pub fn with_config(config: StatisticsConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &StatisticsConfig {
        &self.config
    }

    fn second_order(&self) -> bool {
        self.config.enable_second_order
    }

    fn is_ignored(&self, pixel: &[f64], partial: &mut StatisticsPartial) -> bool {
        if self.config.ignore_infinite_values && pixel.iter().any(|v| !v.is_finite()) {
            partial.ignored_infinite += 1;
            return true;
        }
        if let Some(ignored) = self.config.ignored_value {
            if !pixel.is_empty() && pixel.iter().all(|&v| v == ignored) {
                partial.ignored_user += 1;
                return true;
            }
        }
        false
    }
}

impl Accumulator for StreamingStatistics {
    type Partial = StatisticsPartial;
    type Output = Statistics;

    fn name(&self) -> &str {
        "streaming_statistics"
    }

    fn reset(&mut self, inputs: &[ImageInfo]) -> TilestreamResult<()> {
        self.bands = inputs.first().map(|info| info.bands).unwrap_or(0);
        self.aggregate = Some(StatisticsPartial::identity(self.bands, self.second_order()));
        Ok(())
    }

    fn identity(&self) -> StatisticsPartial {
        StatisticsPartial::identity(self.bands, self.second_order())
    }

    fn partial_footprint(&self) -> usize {
        let vectors = 4 * self.bands;
        let matrix = if self.second_order() { self.bands * self.bands } else { 0 };
        std::mem::size_of::<StatisticsPartial>() + (vectors + matrix) * std::mem::size_of::<f64>()
    }

    fn accumulate(
        &self,
        inputs: &[&Raster],
        partition: &ImageRegion,
        partial: &mut StatisticsPartial,
    ) -> Result<(), ComputeError> {
        let input = inputs[0];
        let bands = input.bands();
        for y in partition.y()..partition.end(1) {
            let row = covered_row(self.name(), input, y, partition)?;
            for pixel in row.chunks_exact(bands.max(1)) {
                if !self.is_ignored(pixel, partial) {
                    partial.add_pixel(pixel);
                }
            }
        }
        Ok(())
    }

    fn merge(&mut self, partial: StatisticsPartial) {
        match &mut self.aggregate {
            Some(aggregate) => aggregate.merge(&partial),
            None => self.aggregate = Some(partial),
        }
    }

    fn finalize(&mut self) -> Result<Statistics, ComputeError> {
        let empty = || ComputeError::EmptyAggregate {
            name: "streaming_statistics".to_string(),
        };
        let aggregate = self.aggregate.as_ref().ok_or_else(empty)?;
        if aggregate.count == 0 {
            return Err(empty());
        }

        let bands = self.bands;
        let n = aggregate.count as f64;
        let regul = if self.config.use_unbiased_estimator && aggregate.count > 1 {
            n / (n - 1.0)
        } else {
            1.0
        };
        let samples = n * bands as f64;
        let regul_component = if self.config.use_unbiased_estimator && samples > 1.0 {
            samples / (samples - 1.0)
        } else {
            1.0
        };

        let mut statistics = Statistics {
            bands,
            count: aggregate.count,
            ignored_infinite: aggregate.ignored_infinite,
            ignored_user: aggregate.ignored_user,
            min: Vec::new(),
            max: Vec::new(),
            sum: Vec::new(),
            mean: Vec::new(),
            sum_of_squares: Vec::new(),
            variance: Vec::new(),
            covariance: None,
            correlation: None,
            component_mean: None,
            component_variance: None,
        };

        if self.config.enable_minmax {
            statistics.min = aggregate.min.clone();
            statistics.max = aggregate.max.clone();
        }

        if self.config.enable_first_order || self.second_order() {
            let mean: Vec<f64> = aggregate.sum.iter().map(|s| s / n).collect();
            statistics.variance = aggregate
                .sum_sq
                .iter()
                .zip(&mean)
                .map(|(sq, m)| (regul * (sq / n - m * m)).max(0.0))
                .collect();
            statistics.sum = aggregate.sum.clone();
            statistics.sum_of_squares = aggregate.sum_sq.clone();

            let component_mean = aggregate.component_sum / samples;
            statistics.component_mean = Some(component_mean);
            statistics.component_variance = Some(
                (regul_component * (aggregate.component_sum_sq / samples - component_mean * component_mean))
                    .max(0.0),
            );
            statistics.mean = mean;
        }

        if self.second_order() {
            let mean = &statistics.mean;
            let correlation: Vec<Vec<f64>> = (0..bands)
                .map(|r| (0..bands).map(|c| aggregate.cross[r * bands + c] / n).collect())
                .collect();
            let covariance = (0..bands)
                .map(|r| {
                    (0..bands)
                        .map(|c| {
                            let value = regul * (correlation[r][c] - mean[r] * mean[c]);
                            if r == c {
                                value.max(0.0)
                            } else {
                                value
                            }
                        })
                        .collect()
                })
                .collect();
            statistics.correlation = Some(correlation);
            statistics.covariance = Some(covariance);
        }

        log::debug!(
            "Statistics over {} pixel(s), {} ignored",
            statistics.count,
            statistics.ignored_infinite + statistics.ignored_user
        );
        Ok(statistics)
    }
}
