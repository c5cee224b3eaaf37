//! Splitting regions into disjoint pieces.
//!
//! Two strategies are available:
//! - **Strips**: contiguous bands along one axis (rows by default)
//! - **Tiles**: a grid composed of 1-D splits along every axis, chosen to keep
//!   pieces close to square
//!
//! Every split is a partition: pieces are pairwise disjoint, non-empty, and
//! their union is exactly the input region. Bands are near-equal; when the
//! extent is not a multiple of the piece count, the remainder is absorbed by
//! the final bands (one extra line each), so no piece is ever larger than
//! `ceil(extent / k)`.

use crate::core::error::{ConfigurationError, RegionError, TilestreamResult};
use crate::core::region::Region;

/// How a splitter cuts a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStrategy {
    /// Contiguous bands along one axis. `None` selects the slowest axis.
    Strips {
        /// Axis to cut along.
        axis: Option<usize>,
    },
    /// Balanced grid along every axis.
    Tiles,
}

impl Default for SplitStrategy {
    fn default() -> Self {
        SplitStrategy::Strips { axis: None }
    }
}

/// Splits a region into `k` disjoint sub-regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionSplitter {
    strategy: SplitStrategy,
}

impl RegionSplitter {
    /// Strips along the slowest axis.
    pub fn strips() -> Self {
        Self {
            strategy: SplitStrategy::Strips { axis: None },
        }
    }

    /// Strips along a specific axis.
    pub fn along(axis: usize) -> Self {
        Self {
            strategy: SplitStrategy::Strips { axis: Some(axis) },
        }
    }

    /// Balanced grid.
    pub fn tiles() -> Self {
        Self {
            strategy: SplitStrategy::Tiles,
        }
    }

    /// The configured strategy.
    pub fn strategy(&self) -> SplitStrategy {
        self.strategy
    }

    /// Number of pieces `split(full, k)` will produce.
    pub fn piece_count<const D: usize>(
        &self,
        full: &Region<D>,
        k: usize,
    ) -> Result<usize, ConfigurationError> {
        if k == 0 {
            return Err(ConfigurationError::InvalidSplitCount(k));
        }
        if full.is_empty() {
            return Ok(0);
        }
        match self.strategy {
            SplitStrategy::Strips { axis } => {
                let axis = resolve_axis(full, axis)?;
                Ok(clamp_count(full.size()[axis], k))
            }
            SplitStrategy::Tiles => Ok(grid_counts(full, k).iter().product()),
        }
    }

    /// Split `full` into at most `k` pieces.
    pub fn split<const D: usize>(
        &self,
        full: &Region<D>,
        k: usize,
    ) -> Result<Vec<Region<D>>, ConfigurationError> {
        match self.strategy {
            SplitStrategy::Strips { axis } => {
                let axis = resolve_axis(full, axis)?;
                split_axis(full, axis, k)
            }
            SplitStrategy::Tiles => {
                if k == 0 {
                    return Err(ConfigurationError::InvalidSplitCount(k));
                }
                split_grid(full, grid_counts(full, k))
            }
        }
    }

    /// The `index`-th piece of `split(full, k)`, without building the others.
    pub fn split_one<const D: usize>(
        &self,
        full: &Region<D>,
        k: usize,
        index: usize,
    ) -> TilestreamResult<Region<D>> {
        match self.strategy {
            SplitStrategy::Strips { axis } => {
                let axis = resolve_axis(full, axis)?;
                split_axis_one(full, axis, k, index)
            }
            SplitStrategy::Tiles => {
                if k == 0 {
                    return Err(ConfigurationError::InvalidSplitCount(k).into());
                }
                split_grid_one(full, grid_counts(full, k), index)
            }
        }
    }
}

fn resolve_axis<const D: usize>(
    full: &Region<D>,
    axis: Option<usize>,
) -> Result<usize, ConfigurationError> {
    let axis = axis.unwrap_or_else(|| full.slowest_axis());
    if axis >= D {
        return Err(ConfigurationError::InvalidAxis { axis, dimension: D });
    }
    Ok(axis)
}

fn clamp_count(extent: u64, k: usize) -> usize {
    (k as u64).min(extent) as usize
}

/// Offset and length of band `index` out of `count` over `extent` lines.
fn band(extent: u64, count: usize, index: usize) -> (u64, u64) {
    let count = count as u64;
    let index = index as u64;
    let base = extent / count;
    let remainder = extent % count;
    let first_long = count - remainder;
    let offset = index * base + index.saturating_sub(first_long);
    let length = if index >= first_long { base + 1 } else { base };
    (offset, length)
}

/// Cut `full` along `axis` into `k` contiguous near-equal bands.
///
/// `k` larger than the extent is clamped to one line per band. An empty
/// region splits into no pieces.
pub fn split_axis<const D: usize>(
    full: &Region<D>,
    axis: usize,
    k: usize,
) -> Result<Vec<Region<D>>, ConfigurationError> {
    if k == 0 {
        return Err(ConfigurationError::InvalidSplitCount(k));
    }
    if axis >= D {
        return Err(ConfigurationError::InvalidAxis { axis, dimension: D });
    }
    if full.is_empty() {
        return Ok(Vec::new());
    }
    let extent = full.size()[axis];
    let count = clamp_count(extent, k);
    if count == 1 {
        return Ok(vec![*full]);
    }
    let start = full.origin()[axis];
    Ok((0..count)
        .map(|index| {
            let (offset, length) = band(extent, count, index);
            full.with_axis(axis, start + offset as i64, length)
        })
        .collect())
}

/// The `index`-th band of `split_axis(full, axis, k)`.
pub fn split_axis_one<const D: usize>(
    full: &Region<D>,
    axis: usize,
    k: usize,
    index: usize,
) -> TilestreamResult<Region<D>> {
    if k == 0 {
        return Err(ConfigurationError::InvalidSplitCount(k).into());
    }
    if axis >= D {
        return Err(ConfigurationError::InvalidAxis { axis, dimension: D }.into());
    }
    let count = if full.is_empty() {
        0
    } else {
        clamp_count(full.size()[axis], k)
    };
    if index >= count {
        return Err(RegionError::SplitIndexOutOfRange { index, count }.into());
    }
    let (offset, length) = band(full.size()[axis], count, index);
    Ok(full.with_axis(axis, full.origin()[axis] + offset as i64, length))
}

/// Per-axis piece counts for a balanced grid of at most `k` pieces.
///
/// Greedily adds a cut to the axis whose pieces are currently longest, as
/// long as the total stays within `k`.
pub fn grid_counts<const D: usize>(full: &Region<D>, k: usize) -> [usize; D] {
    let mut counts = [1usize; D];
    if full.is_empty() || k <= 1 {
        return counts;
    }
    let size = full.size();
    loop {
        let product: usize = counts.iter().product();
        let candidate = (0..D)
            .filter(|&axis| (counts[axis] as u64) < size[axis])
            .max_by(|&a, &b| {
                let ea = size[a] as f64 / counts[a] as f64;
                let eb = size[b] as f64 / counts[b] as f64;
                ea.total_cmp(&eb).then(a.cmp(&b))
            });
        let Some(axis) = candidate else { break };
        let grown = product / counts[axis] * (counts[axis] + 1);
        if grown > k {
            break;
        }
        counts[axis] += 1;
    }
    counts
}

/// Per-axis piece counts so that no piece exceeds `tile` lines on any axis.
pub fn tile_counts<const D: usize>(full: &Region<D>, tile: u64) -> [usize; D] {
    let mut counts = [1usize; D];
    let tile = tile.max(1);
    for (axis, &extent) in full.size().iter().enumerate() {
        counts[axis] = extent.div_ceil(tile).max(1) as usize;
    }
    counts
}

/// Compose 1-D splits along every axis. Pieces come out in row-major order
/// (slowest axis outermost).
pub fn split_grid<const D: usize>(
    full: &Region<D>,
    counts: [usize; D],
) -> Result<Vec<Region<D>>, ConfigurationError> {
    if full.is_empty() {
        return Ok(Vec::new());
    }
    let mut pieces = vec![*full];
    for axis in (0..D).rev() {
        let mut next = Vec::with_capacity(pieces.len() * counts[axis].max(1));
        for piece in &pieces {
            next.extend(split_axis(piece, axis, counts[axis])?);
        }
        pieces = next;
    }
    Ok(pieces)
}

/// The `index`-th piece of `split_grid(full, counts)`.
pub fn split_grid_one<const D: usize>(
    full: &Region<D>,
    counts: [usize; D],
    index: usize,
) -> TilestreamResult<Region<D>> {
    let mut clamped = [0usize; D];
    for axis in 0..D {
        if counts[axis] == 0 {
            return Err(ConfigurationError::InvalidSplitCount(0).into());
        }
        clamped[axis] = if full.is_empty() {
            0
        } else {
            clamp_count(full.size()[axis], counts[axis])
        };
    }
    let total: usize = clamped.iter().product();
    if index >= total {
        return Err(RegionError::SplitIndexOutOfRange {
            index,
            count: total,
        }
        .into());
    }
    let mut piece = *full;
    let mut rest = index;
    for axis in 0..D {
        let along = rest % clamped[axis];
        rest /= clamped[axis];
        piece = split_axis_one(&piece, axis, clamped[axis], along)?;
    }
    Ok(piece)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::region::ImageRegion;
    use proptest::prelude::*;

    fn assert_partition<const D: usize>(full: &Region<D>, pieces: &[Region<D>]) {
        let total: u64 = pieces.iter().map(|p| p.pixel_count()).sum();
        assert_eq!(total, full.pixel_count());
        for (i, a) in pieces.iter().enumerate() {
            assert!(!a.is_empty());
            assert!(full.contains(a));
            for b in &pieces[i + 1..] {
                assert!(a.is_disjoint(b), "{a} overlaps {b}");
            }
        }
    }

    #[test]
    fn test_split_rows_remainder_goes_last() {
        let full = ImageRegion::from_size([7, 10]);
        let pieces = split_axis(&full, 1, 3).unwrap();
        let heights: Vec<_> = pieces.iter().map(|p| p.height()).collect();
        assert_eq!(heights, vec![3, 3, 4]);
        assert_eq!(pieces[2].y(), 6);
        assert_partition(&full, &pieces);
    }

    #[test]
    fn test_split_single_piece_is_identity() {
        let full = ImageRegion::rect(3, 4, 10, 10);
        assert_eq!(RegionSplitter::strips().split(&full, 1).unwrap(), vec![full]);
    }

    #[test]
    fn test_split_zero_is_configuration_error() {
        let full = ImageRegion::from_size([10, 10]);
        assert_eq!(
            RegionSplitter::strips().split(&full, 0),
            Err(ConfigurationError::InvalidSplitCount(0))
        );
    }

    #[test]
    fn test_split_clamps_to_extent() {
        let full = ImageRegion::from_size([50, 4]);
        let pieces = RegionSplitter::strips().split(&full, 9).unwrap();
        assert_eq!(pieces.len(), 4);
        assert!(pieces.iter().all(|p| p.height() == 1));
    }

    #[test]
    fn test_split_empty_region() {
        let full = ImageRegion::rect(0, 0, 10, 0);
        assert!(RegionSplitter::strips().split(&full, 3).unwrap().is_empty());
        assert_eq!(RegionSplitter::strips().piece_count(&full, 3), Ok(0));
    }

    #[test]
    fn test_split_one_matches_split() {
        let full = ImageRegion::rect(-5, 2, 33, 101);
        let splitter = RegionSplitter::strips();
        let pieces = splitter.split(&full, 7).unwrap();
        for (i, piece) in pieces.iter().enumerate() {
            assert_eq!(&splitter.split_one(&full, 7, i).unwrap(), piece);
        }
        assert!(splitter.split_one(&full, 7, 7).is_err());
    }

    #[test]
    fn test_tiles_balanced() {
        let full = ImageRegion::from_size([100, 100]);
        assert_eq!(grid_counts(&full, 4), [2, 2]);
        let pieces = RegionSplitter::tiles().split(&full, 4).unwrap();
        assert_eq!(pieces.len(), 4);
        assert_partition(&full, &pieces);
        assert_eq!(pieces[1], ImageRegion::rect(50, 0, 50, 50));

        let wide = ImageRegion::from_size([400, 100]);
        assert_eq!(grid_counts(&wide, 4), [4, 1]);
    }

    #[test]
    fn test_tile_counts_bound_piece_size() {
        let full = ImageRegion::from_size([11, 9]);
        let counts = tile_counts(&full, 4);
        assert_eq!(counts, [3, 3]);
        let pieces = split_grid(&full, counts).unwrap();
        assert!(pieces.iter().all(|p| p.width() <= 4 && p.height() <= 4));
        assert_partition(&full, &pieces);
        for (i, piece) in pieces.iter().enumerate() {
            assert_eq!(&split_grid_one(&full, counts, i).unwrap(), piece);
        }
    }

    #[test]
    fn test_invalid_axis() {
        let full = ImageRegion::from_size([4, 4]);
        assert!(matches!(
            RegionSplitter::along(2).split(&full, 2),
            Err(ConfigurationError::InvalidAxis { axis: 2, dimension: 2 })
        ));
    }

    proptest! {
        #[test]
        fn prop_strips_partition(
            x in -50i64..50, y in -50i64..50,
            w in 1u64..120, h in 1u64..120,
            k in 1usize..200,
        ) {
            let full = ImageRegion::rect(x, y, w, h);
            let pieces = RegionSplitter::strips().split(&full, k).unwrap();
            prop_assert_eq!(pieces.len(), k.min(h as usize));
            let max = h.div_ceil(pieces.len() as u64);
            prop_assert!(pieces.iter().all(|p| p.height() <= max));
            assert_partition(&full, &pieces);
        }

        #[test]
        fn prop_tiles_partition(
            w in 1u64..80, h in 1u64..80, k in 1usize..40,
        ) {
            let full = ImageRegion::from_size([w, h]);
            let pieces = RegionSplitter::tiles().split(&full, k).unwrap();
            prop_assert!(!pieces.is_empty() && pieces.len() <= k);
            assert_partition(&full, &pieces);
        }
    }
}
