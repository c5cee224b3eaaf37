//! Neighborhood majority voting over label maps.

use crate::accumulators::label_of;
use crate::core::error::{ComputeError, ConfigurationError, TilestreamResult};
use crate::core::neighborhood::{EdgePolicy, Neighborhood};
use crate::core::node::{check_input_count, Category, FilterMetadata, ImageFilter, TileContext};
use crate::core::raster::{ImageInfo, Raster};
use crate::core::region::ImageRadius;
use crate::filters::registry::{parse_parameters, FilterRegistry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;

/// Register the majority voting filter.
pub fn register(registry: &mut FilterRegistry) -> TilestreamResult<()> {
    registry.register(|params| {
        let params: MajorityVotingParams = parse_parameters("majority_voting", params)?;
        let filter: Box<dyn ImageFilter> = Box::new(MajorityVotingFilter::from_params(params));
        Ok(filter)
    })
}

/// What a pixel becomes when several labels share the highest vote count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// Emit this sentinel label.
    Undecided(i64),
    /// Keep the center label.
    KeepOriginal,
}

/// JSON parameters of `majority_voting`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MajorityVotingParams {
    /// Window radius.
    pub radius: u64,
    /// Label passed through and never counted.
    pub nodata: i64,
    /// Outcome of a tie.
    pub tie_policy: TiePolicy,
    /// Labels the input may hold.
    pub labels: Option<BTreeSet<i64>>,
    /// Whether the center votes.
    pub include_center: bool,
    /// Relabel only centers with at most this many agreeing neighbors.
    pub isolated_threshold: Option<usize>,
}

impl Default for MajorityVotingParams {
    fn default() -> Self {
        Self {
            radius: 1,
            nodata: 0,
            tie_policy: TiePolicy::KeepOriginal,
            labels: None,
            include_center: false,
            isolated_threshold: None,
        }
    }
}

/// Replaces every label with the most frequent label of its window.
///
/// NoData centers pass through and NoData neighbors never vote. Samples
/// outside the image are skipped, so border windows are just smaller. A
/// center with no voting neighbor keeps its label.
#[derive(Debug, Clone, PartialEq)]
pub struct MajorityVotingFilter {
    params: MajorityVotingParams,
}

impl MajorityVotingFilter {
    /// Filter with the given radius, keeping the original label on ties.
    pub fn new(radius: u64) -> Self {
        Self::from_params(MajorityVotingParams {
            radius,
            ..Default::default()
        })
    }

    /// Filter configured from decoded parameters.
    pub fn from_params(params: MajorityVotingParams) -> Self {
        Self { params }
    }

    /// Set the NoData label.
    pub fn with_nodata(mut self, nodata: i64) -> Self {
        self.params.nodata = nodata;
        self
    }

    /// Set the tie outcome.
    pub fn with_tie_policy(mut self, policy: TiePolicy) -> Self {
        self.params.tie_policy = policy;
        self
    }

    /// Declare the labels the input may hold; the undecided label is checked
    /// against them. Without a declaration it is checked against the labels
    /// actually present, which costs an extra pass over the input.
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = i64>) -> Self {
        self.params.labels = Some(labels.into_iter().collect());
        self
    }

    /// Let the center pixel vote.
    pub fn with_center(mut self, include: bool) -> Self {
        self.params.include_center = include;
        self
    }

    /// Only relabel centers whose own label occurs at most `threshold` times
    /// among the voting neighbors.
    pub fn with_isolated_threshold(mut self, threshold: usize) -> Self {
        self.params.isolated_threshold = Some(threshold);
        self
    }

    /// Current parameters.
    pub fn params(&self) -> &MajorityVotingParams {
        &self.params
    }

    fn vote(&self, center: i64, window: &[f64], tally: &mut Vec<(i64, usize)>) -> i64 {
        let nodata = self.params.nodata;
        if center == nodata {
            return center;
        }
        tally.clear();
        for &sample in window {
            let label = label_of(sample);
            if label == nodata {
                continue;
            }
            match tally.iter_mut().find(|(l, _)| *l == label) {
                Some((_, count)) => *count += 1,
                None => tally.push((label, 1)),
            }
        }
        if let Some(threshold) = self.params.isolated_threshold {
            let own = tally
                .iter()
                .find(|(l, _)| *l == center)
                .map_or(0, |&(_, count)| count);
            if own > threshold {
                return center;
            }
        }
        let Some(best) = tally.iter().map(|&(_, count)| count).max() else {
            return center;
        };
        let mut winners = tally.iter().filter(|&&(_, count)| count == best);
        match (winners.next(), winners.next()) {
            (Some(&(label, _)), None) => label,
            _ => match self.params.tie_policy {
                TiePolicy::Undecided(label) => label,
                TiePolicy::KeepOriginal => center,
            },
        }
    }
}

impl ImageFilter for MajorityVotingFilter {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::builder("majority_voting", "Majority Voting")
            .description("Regularize a label map with the most frequent label of each window")
            .category(Category::Classification)
            .input("labels")
            .parameter("radius", "Window radius, in pixels", json!(1))
            .parameter("nodata", "Label passed through and never counted", json!(0))
            .parameter(
                "tie_policy",
                "\"keep_original\" or {\"undecided\": label}",
                json!("keep_original"),
            )
            .parameter("labels", "Labels the input may hold", json!(null))
            .parameter("include_center", "Let the center vote", json!(false))
            .parameter(
                "isolated_threshold",
                "Only relabel centers with at most this many agreeing neighbors",
                json!(null),
            )
            .build()
    }

    fn validate(&self, inputs: &[ImageInfo]) -> Result<(), ConfigurationError> {
        check_input_count("majority_voting", 1, inputs.len())?;
        if let TiePolicy::Undecided(label) = self.params.tie_policy {
            if label == self.params.nodata {
                return Err(ConfigurationError::UndecidedLabelCollision {
                    label,
                    reason: "the NoData label".to_string(),
                });
            }
            if self.params.labels.as_ref().is_some_and(|labels| labels.contains(&label)) {
                return Err(ConfigurationError::UndecidedLabelCollision {
                    label,
                    reason: "a declared input label".to_string(),
                });
            }
        }
        Ok(())
    }

    fn needs_present_labels(&self) -> bool {
        matches!(self.params.tie_policy, TiePolicy::Undecided(_)) && self.params.labels.is_none()
    }

    fn check_present_labels(&self, labels: &BTreeSet<i64>) -> Result<(), ConfigurationError> {
        match self.params.tie_policy {
            TiePolicy::Undecided(label) if labels.contains(&label) => {
                Err(ConfigurationError::UndecidedLabelCollision {
                    label,
                    reason: "a label present in the input".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn padding(&self) -> ImageRadius {
        ImageRadius::uniform(self.params.radius)
    }

    fn edge_policy(&self) -> EdgePolicy {
        EdgePolicy::Skip
    }

    fn threaded_generate(
        &self,
        inputs: &[&Raster],
        output: &mut Raster,
        context: &TileContext,
    ) -> Result<(), ComputeError> {
        let input = inputs[0];
        let hood = Neighborhood::new(self.padding(), self.edge_policy(), context.bounds);
        let region = *output.region();
        let mut window = Vec::with_capacity(self.padding().window_len());
        let mut tally = Vec::new();

        for (x, y) in region.points() {
            for band in 0..output.bands() {
                let center = input.get(x, y, band).ok_or_else(|| ComputeError::Filter {
                    filter: "majority_voting".to_string(),
                    message: format!("input does not cover ({}, {})", x, y),
                })?;
                hood.gather(input, x, y, band, self.params.include_center, &mut window);
                let label = self.vote(label_of(center), &window, &mut tally);
                output.set(x, y, band, label as f64);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TilestreamError;
    use crate::core::raster::ComponentType;
    use crate::core::source::MemorySource;
    use crate::execution::{ExecutionOptions, Pipeline, RasterWriter, StreamingConfig};
    use crate::graph::PipelineGraph;

    fn regularize(source: MemorySource, filter: MajorityVotingFilter) -> TilestreamResult<Raster> {
        let mut graph = PipelineGraph::new();
        let input = graph.add_source(source);
        let vote = graph.add_filter(filter);
        graph.connect(input, vote, 0)?;
        let mut pipeline = Pipeline::new(graph)
            .with_streaming(StreamingConfig::new().with_lines_per_division(3))
            .with_options(ExecutionOptions::new().with_max_threads(3));
        let mut writer = RasterWriter::new(vote);
        pipeline.update(&mut writer)?;
        Ok(writer.into_raster().unwrap())
    }

    fn checkerboard(width: u64, height: u64) -> Vec<i64> {
        (0..height)
            .flat_map(|y| (0..width).map(move |x| if (x + y) % 2 == 0 { 1 } else { 2 }))
            .collect()
    }

    #[test]
    fn test_checkerboard_ties_become_undecided() {
        let (width, height) = (8, 8);
        let mut labels = checkerboard(width, height);
        labels[(5 * width + 5) as usize] = 0;
        let source = MemorySource::labels(width, height, &labels).unwrap();
        let filter = MajorityVotingFilter::new(1)
            .with_nodata(0)
            .with_tie_policy(TiePolicy::Undecided(9));
        let output = regularize(source, filter).unwrap();

        assert_eq!(output.get(5, 5, 0), Some(0.0));
        for y in 1..height as i64 - 1 {
            for x in 1..width as i64 - 1 {
                let touches_nodata = (x - 5).abs() <= 1 && (y - 5).abs() <= 1;
                if !touches_nodata {
                    assert_eq!(output.get(x, y, 0), Some(9.0), "pixel ({}, {})", x, y);
                }
            }
        }
        // A corner sees two opposite labels and one of its own.
        assert_eq!(output.get(0, 0, 0), Some(2.0));
    }

    #[test]
    fn test_keep_original_on_tie() {
        let source = MemorySource::labels(5, 5, &checkerboard(5, 5)).unwrap();
        let output = regularize(source, MajorityVotingFilter::new(1)).unwrap();
        assert_eq!(output.get(2, 2, 0), Some(1.0));
        assert_eq!(output.get(2, 1, 0), Some(2.0));
    }

    #[test]
    fn test_isolated_threshold() {
        #[rustfmt::skip]
        let labels = [
            3, 3, 3, 4,
            3, 5, 3, 4,
            3, 3, 4, 4,
        ];
        let source = MemorySource::labels(4, 3, &labels).unwrap();
        let output = regularize(source, MajorityVotingFilter::new(1).with_isolated_threshold(0)).unwrap();
        assert_eq!(output.get(1, 1, 0), Some(3.0));
        // (2, 1) has three agreeing neighbors, so it stays.
        assert_eq!(output.get(2, 1, 0), Some(3.0));
        assert_eq!(output.get(3, 0, 0), Some(4.0));
    }

    #[test]
    fn test_undecided_label_collisions() {
        let info = [ImageInfo::new(4, 4, 1, ComponentType::I32)];
        let clash_nodata = MajorityVotingFilter::new(1).with_tie_policy(TiePolicy::Undecided(0));
        assert!(matches!(
            clash_nodata.validate(&info),
            Err(ConfigurationError::UndecidedLabelCollision { label: 0, .. })
        ));

        let clash_label = MajorityVotingFilter::new(1)
            .with_tie_policy(TiePolicy::Undecided(2))
            .with_labels([1, 2]);
        assert!(clash_label.validate(&info).is_err());

        let fine = MajorityVotingFilter::new(1)
            .with_tie_policy(TiePolicy::Undecided(9))
            .with_labels([1, 2]);
        assert!(fine.validate(&info).is_ok());

        let source = MemorySource::labels(4, 4, &checkerboard(4, 4)).unwrap();
        let result = regularize(source, clash_label);
        assert!(matches!(
            result,
            Err(TilestreamError::Configuration(ConfigurationError::UndecidedLabelCollision { .. }))
        ));
    }

    #[test]
    fn test_undecided_label_present_in_input() {
        let filter = MajorityVotingFilter::new(1).with_tie_policy(TiePolicy::Undecided(2));
        assert!(filter.needs_present_labels());
        assert!(!filter.clone().with_labels([1, 3]).needs_present_labels());
        assert!(!MajorityVotingFilter::new(1).needs_present_labels());

        let source = MemorySource::labels(5, 5, &checkerboard(5, 5)).unwrap();
        let result = regularize(source, filter);
        assert!(matches!(
            result,
            Err(TilestreamError::Configuration(ConfigurationError::UndecidedLabelCollision {
                label: 2,
                ..
            }))
        ));

        let source = MemorySource::labels(5, 5, &checkerboard(5, 5)).unwrap();
        let filter = MajorityVotingFilter::new(1).with_tie_policy(TiePolicy::Undecided(7));
        let output = regularize(source, filter).unwrap();
        assert_eq!(output.get(2, 2, 0), Some(7.0));
    }

    #[test]
    fn test_vote_directly() {
        let filter = MajorityVotingFilter::new(1).with_tie_policy(TiePolicy::Undecided(7));
        let mut tally = Vec::new();
        assert_eq!(filter.vote(1, &[2.0, 2.0, 1.0, 0.0, 0.0, 0.0], &mut tally), 2);
        assert_eq!(filter.vote(1, &[0.0, 0.0], &mut tally), 1);
        assert_eq!(filter.vote(1, &[2.0, 3.0], &mut tally), 7);
        assert_eq!(filter.vote(0, &[2.0, 2.0], &mut tally), 0);
    }
}
