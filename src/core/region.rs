//! Axis-aligned integer boxes in N-D pixel space.
//!
//! Axis 0 is the fastest-varying axis (columns for images) and axis `D - 1`
//! the slowest-varying one (rows). A region with any zero-sized axis is
//! *empty*: a valid, inert value that touches no pixels.

use std::fmt;

/// An axis-aligned box: `origin` plus `size` along each of the `D` axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region<const D: usize> {
    origin: [i64; D],
    size: [u64; D],
}

/// Two-dimensional region used by image pipelines (`[x, y]`).
pub type ImageRegion = Region<2>;

impl<const D: usize> Region<D> {
    /// Create a region from its origin and size.
    pub fn new(origin: [i64; D], size: [u64; D]) -> Self {
        Self { origin, size }
    }

    /// Create a region anchored at the origin.
    pub fn from_size(size: [u64; D]) -> Self {
        Self {
            origin: [0; D],
            size,
        }
    }

    /// The canonical empty region.
    pub fn empty() -> Self {
        Self {
            origin: [0; D],
            size: [0; D],
        }
    }

    /// Origin along every axis.
    pub fn origin(&self) -> [i64; D] {
        self.origin
    }

    /// Size along every axis.
    pub fn size(&self) -> [u64; D] {
        self.size
    }

    /// Exclusive end coordinate along `axis`.
    pub fn end(&self, axis: usize) -> i64 {
        self.origin[axis] + self.size[axis] as i64
    }

    /// Whether any axis has zero size.
    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0)
    }

    /// Number of pixels covered by the region.
    pub fn pixel_count(&self) -> u64 {
        self.size.iter().product()
    }

    /// The slowest-varying axis (rows for images).
    pub fn slowest_axis(&self) -> usize {
        D.saturating_sub(1)
    }

    /// The axis with the largest extent. Ties resolve to the slowest axis.
    pub fn longest_axis(&self) -> usize {
        let mut best = self.slowest_axis();
        for axis in (0..D).rev() {
            if self.size[axis] > self.size[best] {
                best = axis;
            }
        }
        best
    }

    /// Whether `point` lies inside the region.
    pub fn contains_point(&self, point: [i64; D]) -> bool {
        (0..D).all(|axis| point[axis] >= self.origin[axis] && point[axis] < self.end(axis))
    }

    /// Whether `other` lies entirely inside this region.
    ///
    /// The empty region is contained everywhere.
    pub fn contains(&self, other: &Region<D>) -> bool {
        if other.is_empty() {
            return true;
        }
        (0..D).all(|axis| {
            other.origin[axis] >= self.origin[axis] && other.end(axis) <= self.end(axis)
        })
    }

    /// Box intersection. Disjoint regions yield an empty region.
    pub fn intersection(&self, other: &Region<D>) -> Region<D> {
        let mut origin = [0i64; D];
        let mut size = [0u64; D];
        for axis in 0..D {
            let start = self.origin[axis].max(other.origin[axis]);
            let end = self.end(axis).min(other.end(axis));
            origin[axis] = start;
            size[axis] = (end - start).max(0) as u64;
        }
        Region { origin, size }
    }

    /// Whether the two regions share no pixel.
    pub fn is_disjoint(&self, other: &Region<D>) -> bool {
        self.intersection(other).is_empty()
    }

    /// Smallest region containing both. Empty operands are ignored.
    pub fn union(&self, other: &Region<D>) -> Region<D> {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let mut origin = [0i64; D];
        let mut size = [0u64; D];
        for axis in 0..D {
            let start = self.origin[axis].min(other.origin[axis]);
            let end = self.end(axis).max(other.end(axis));
            origin[axis] = start;
            size[axis] = (end - start) as u64;
        }
        Region { origin, size }
    }

    /// Grow the region by `radius` on both sides of every axis.
    ///
    /// Empty regions stay empty.
    pub fn pad(&self, radius: &Radius<D>) -> Region<D> {
        if self.is_empty() {
            return *self;
        }
        let mut origin = self.origin;
        let mut size = self.size;
        for axis in 0..D {
            origin[axis] -= radius.0[axis] as i64;
            size[axis] += 2 * radius.0[axis];
        }
        Region { origin, size }
    }

    /// Clip the region to `bounds`.
    pub fn crop(&self, bounds: &Region<D>) -> Region<D> {
        self.intersection(bounds)
    }

    /// Same origin and size.
    pub fn is_congruent(&self, other: &Region<D>) -> bool {
        self == other
    }

    /// Copy of the region with a new extent along `axis`.
    pub fn with_axis(&self, axis: usize, origin: i64, size: u64) -> Region<D> {
        let mut region = *self;
        region.origin[axis] = origin;
        region.size[axis] = size;
        region
    }
}

impl ImageRegion {
    /// Create a 2-D region from `x, y, width, height`.
    pub fn rect(x: i64, y: i64, width: u64, height: u64) -> Self {
        Self::new([x, y], [width, height])
    }

    /// First column.
    pub fn x(&self) -> i64 {
        self.origin[0]
    }

    /// First row.
    pub fn y(&self) -> i64 {
        self.origin[1]
    }

    /// Number of columns.
    pub fn width(&self) -> u64 {
        self.size[0]
    }

    /// Number of rows.
    pub fn height(&self) -> u64 {
        self.size[1]
    }

    /// Iterate over every `(x, y)` in row-major order.
    pub fn points(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        let (x0, y0) = (self.x(), self.y());
        let (w, h) = (self.width() as i64, self.height() as i64);
        let w = if h == 0 { 0 } else { w };
        (y0..y0 + h).flat_map(move |y| (x0..x0 + w).map(move |x| (x, y)))
    }
}

impl<const D: usize> Default for Region<D> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const D: usize> fmt::Display for Region<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[origin {:?}, size {:?}]", self.origin, self.size)
    }
}

/// Per-axis neighborhood radius requested by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Radius<const D: usize>(pub [u64; D]);

/// Two-dimensional radius (`[rx, ry]`).
pub type ImageRadius = Radius<2>;

impl<const D: usize> Radius<D> {
    /// No padding.
    pub fn zero() -> Self {
        Self([0; D])
    }

    /// Same radius on every axis.
    pub fn uniform(radius: u64) -> Self {
        Self([radius; D])
    }

    /// Whether any axis needs padding.
    pub fn needs_padding(&self) -> bool {
        self.0.iter().any(|&r| r > 0)
    }

    /// Per-axis maximum of both radii.
    pub fn combine(&self, other: &Radius<D>) -> Radius<D> {
        let mut radius = self.0;
        for axis in 0..D {
            radius[axis] = radius[axis].max(other.0[axis]);
        }
        Radius(radius)
    }

    /// Number of samples in the full `(2r + 1)^D` window.
    pub fn window_len(&self) -> usize {
        self.0.iter().map(|&r| (2 * r + 1) as usize).product()
    }
}

impl<const D: usize> Default for Radius<D> {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_basics() {
        let region = ImageRegion::rect(10, 20, 100, 200);
        assert_eq!(region.end(0), 110);
        assert_eq!(region.end(1), 220);
        assert_eq!(region.pixel_count(), 20000);
        assert!(!region.is_empty());
        assert_eq!(region.longest_axis(), 1);
    }

    #[test]
    fn test_empty_region_is_inert() {
        let region = ImageRegion::rect(5, 5, 40, 0);
        assert!(region.is_empty());
        assert_eq!(region.pixel_count(), 0);
        assert_eq!(region.points().count(), 0);
        assert_eq!(region.pad(&Radius::uniform(3)), region);
        assert!(ImageRegion::from_size([1, 1]).contains(&region));
    }

    #[test]
    fn test_intersection_and_disjoint() {
        let a = ImageRegion::rect(0, 0, 10, 10);
        let b = ImageRegion::rect(5, 5, 10, 10);
        assert_eq!(a.intersection(&b), ImageRegion::rect(5, 5, 5, 5));
        assert!(!a.is_disjoint(&b));

        let c = ImageRegion::rect(10, 0, 4, 4);
        assert!(a.is_disjoint(&c));
        assert!(a.intersection(&c).is_empty());
    }

    #[test]
    fn test_pad_then_crop() {
        let largest = ImageRegion::from_size([100, 100]);
        let region = ImageRegion::rect(0, 50, 100, 10);
        let padded = region.pad(&Radius([2, 3]));
        assert_eq!(padded, ImageRegion::rect(-2, 47, 104, 16));
        assert_eq!(padded.crop(&largest), ImageRegion::rect(0, 47, 100, 16));
    }

    #[test]
    fn test_union() {
        let a = ImageRegion::rect(0, 0, 2, 2);
        let b = ImageRegion::rect(4, 1, 2, 5);
        assert_eq!(a.union(&b), ImageRegion::rect(0, 0, 6, 6));
        assert_eq!(a.union(&ImageRegion::empty()), a);
    }

    #[test]
    fn test_points_row_major() {
        let points: Vec<_> = ImageRegion::rect(1, 1, 2, 2).points().collect();
        assert_eq!(points, vec![(1, 1), (2, 1), (1, 2), (2, 2)]);
    }

    #[test]
    fn test_three_dimensional_region() {
        let cube = Region::<3>::from_size([4, 5, 6]);
        assert_eq!(cube.pixel_count(), 120);
        assert_eq!(cube.slowest_axis(), 2);
        assert!(cube.contains_point([3, 4, 5]));
        assert!(!cube.contains_point([4, 0, 0]));
    }

    #[test]
    fn test_radius() {
        let radius = Radius([1, 2]);
        assert_eq!(radius.window_len(), 15);
        assert!(radius.needs_padding());
        assert_eq!(radius.combine(&Radius([3, 0])), Radius([3, 2]));
        assert!(!ImageRadius::zero().needs_padding());
    }
}
