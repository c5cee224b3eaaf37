//! Neighborhood windows and border handling.
//!
//! Neighborhood filters read a `(2r + 1)` window around every output pixel.
//! Near the image border part of that window lies outside the largest region;
//! [`EdgePolicy`] decides deterministically what happens to those samples.

use crate::core::raster::Raster;
use crate::core::region::{ImageRadius, ImageRegion};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a neighborhood filter does with window samples outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgePolicy {
    /// Reflect coordinates across the border (`-1 → 0`, `-2 → 1`).
    Mirror,
    /// Treat outside samples as zero.
    ZeroFill,
    /// Drop outside samples from the window.
    Skip,
    /// Emit the center sample unchanged when the window is incomplete.
    KeepOriginal,
}

impl EdgePolicy {
    /// Name used in parameters and logs.
    pub fn name(&self) -> &'static str {
        match self {
            EdgePolicy::Mirror => "mirror",
            EdgePolicy::ZeroFill => "zero_fill",
            EdgePolicy::Skip => "skip",
            EdgePolicy::KeepOriginal => "keep_original",
        }
    }
}

impl fmt::Display for EdgePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Half-sample symmetric reflection of `coord` into `[start, start + len)`.
fn reflect(coord: i64, start: i64, len: u64) -> i64 {
    if len == 0 {
        return start;
    }
    let period = 2 * len as i64;
    let mut offset = (coord - start).rem_euclid(period);
    if offset >= len as i64 {
        offset = period - 1 - offset;
    }
    start + offset
}

/// A window shape bound to the extent of the image it runs over.
#[derive(Debug, Clone, Copy)]
pub struct Neighborhood {
    radius: ImageRadius,
    policy: EdgePolicy,
    bounds: ImageRegion,
}

impl Neighborhood {
    /// Window of `radius` over an image whose largest region is `bounds`.
    pub fn new(radius: ImageRadius, policy: EdgePolicy, bounds: ImageRegion) -> Self {
        Self {
            radius,
            policy,
            bounds,
        }
    }

    /// Window radius.
    pub fn radius(&self) -> ImageRadius {
        self.radius
    }

    /// Border policy.
    pub fn policy(&self) -> EdgePolicy {
        self.policy
    }

    /// Whether the whole window around `(x, y)` lies inside the image.
    pub fn is_complete(&self, x: i64, y: i64) -> bool {
        let [rx, ry] = self.radius.0;
        let window = ImageRegion::rect(x - rx as i64, y - ry as i64, 2 * rx + 1, 2 * ry + 1);
        self.bounds.contains(&window)
    }

    /// Collect the window samples of `band` around `(x, y)` into `out`.
    ///
    /// Returns `false` when the policy is [`EdgePolicy::KeepOriginal`] and the
    /// window is incomplete; `out` is left empty in that case.
    pub fn gather(
        &self,
        input: &Raster,
        x: i64,
        y: i64,
        band: usize,
        include_center: bool,
        out: &mut Vec<f64>,
    ) -> bool {
        out.clear();
        if self.policy == EdgePolicy::KeepOriginal && !self.is_complete(x, y) {
            return false;
        }
        let [rx, ry] = self.radius.0;
        let (rx, ry) = (rx as i64, ry as i64);
        for dy in -ry..=ry {
            for dx in -rx..=rx {
                if dx == 0 && dy == 0 && !include_center {
                    continue;
                }
                let (nx, ny) = (x + dx, y + dy);
                if self.bounds.contains_point([nx, ny]) {
                    if let Some(value) = input.get(nx, ny, band) {
                        out.push(value);
                    }
                    continue;
                }
                match self.policy {
                    EdgePolicy::Mirror => {
                        let mx = reflect(nx, self.bounds.x(), self.bounds.width());
                        let my = reflect(ny, self.bounds.y(), self.bounds.height());
                        if let Some(value) = input.get(mx, my, band) {
                            out.push(value);
                        }
                    }
                    EdgePolicy::ZeroFill => out.push(0.0),
                    EdgePolicy::Skip | EdgePolicy::KeepOriginal => {}
                }
            }
        }
        true
    }
}
