//! Pixel sources at the upstream end of a pipeline.
//!
//! Sources receive requested regions and clip them to their own extent, so a
//! padded request near the border simply yields a smaller raster.

use crate::core::error::ComputeError;
use crate::core::raster::{ComponentType, ImageInfo, Raster};
use crate::core::region::ImageRegion;
use std::fmt;
use std::sync::Arc;

/// A provider of pixels for requested regions.
///
/// Implementations must be safe to read from several threads at once.
pub trait ImageSource: Send + Sync {
    /// Display name used in logs and errors.
    fn name(&self) -> &str;

    /// Geometry of the image, available without reading pixels.
    fn info(&self) -> ImageInfo;

    /// Read the part of `region` that lies inside the image.
    fn read(&self, region: &ImageRegion) -> Result<Raster, ComputeError>;
}

/// Source backed by an in-memory raster.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    raster: Arc<Raster>,
    component: ComponentType,
}

impl MemorySource {
    /// Wrap a raster. The component type only affects streaming decisions.
    pub fn new(raster: Raster, component: ComponentType) -> Self {
        Self {
            name: "memory".to_string(),
            raster: Arc::new(raster),
            component,
        }
    }

    /// Single-band label map from row-major values.
    pub fn labels(width: u64, height: u64, labels: &[i64]) -> Option<Self> {
        let data = labels.iter().map(|&l| l as f64).collect();
        let raster = Raster::from_vec(ImageRegion::from_size([width, height]), 1, data)?;
        Some(Self::new(raster, ComponentType::I32))
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The backing raster.
    pub fn raster(&self) -> &Raster {
        &self.raster
    }
}

impl ImageSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self) -> ImageInfo {
        ImageInfo {
            largest: *self.raster.region(),
            bands: self.raster.bands(),
            component: self.component,
        }
    }

    fn read(&self, region: &ImageRegion) -> Result<Raster, ComputeError> {
        Ok(self.raster.crop(region))
    }
}

/// Source of any size whose every pixel has the same value per band.
///
/// Tiles are generated on demand, so very large images cost nothing until read.
#[derive(Debug, Clone)]
pub struct ConstantSource {
    info: ImageInfo,
    values: Vec<f64>,
}

impl ConstantSource {
    /// Single-band constant image.
    pub fn new(width: u64, height: u64, component: ComponentType, value: f64) -> Self {
        Self {
            info: ImageInfo::new(width, height, 1, component),
            values: vec![value],
        }
    }

    /// Multi-band constant image with one value per band.
    pub fn with_bands(width: u64, height: u64, component: ComponentType, values: Vec<f64>) -> Self {
        Self {
            info: ImageInfo::new(width, height, values.len(), component),
            values,
        }
    }
}

impl ImageSource for ConstantSource {
    fn name(&self) -> &str {
        "constant"
    }

    fn info(&self) -> ImageInfo {
        self.info
    }

    fn read(&self, region: &ImageRegion) -> Result<Raster, ComputeError> {
        let clipped = region.crop(&self.info.largest);
        Ok(Raster::from_fn(clipped, self.values.len(), |_, _, band| {
            self.values[band]
        }))
    }
}

/// Per-pixel generator function `(x, y, band) -> sample`.
pub type PixelFn = Arc<dyn Fn(i64, i64, usize) -> f64 + Send + Sync>;

/// Source computing every sample from its coordinates.
#[derive(Clone)]
pub struct SyntheticSource {
    name: String,
    info: ImageInfo,
    generator: PixelFn,
}

impl SyntheticSource {
    /// Create a synthetic image.
    pub fn new<F>(info: ImageInfo, generator: F) -> Self
    where
        F: Fn(i64, i64, usize) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: "synthetic".to_string(),
            info,
            generator: Arc::new(generator),
        }
    }

    /// Two-label checkerboard of single pixels.
    pub fn checkerboard(width: u64, height: u64, even: i64, odd: i64) -> Self {
        let info = ImageInfo::new(width, height, 1, ComponentType::I32);
        Self::new(info, move |x, y, _| {
            if (x + y).rem_euclid(2) == 0 {
                even as f64
            } else {
                odd as f64
            }
        })
        .with_name("checkerboard")
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl fmt::Debug for SyntheticSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntheticSource")
            .field("name", &self.name)
            .field("info", &self.info)
            .finish()
    }
}

impl ImageSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self) -> ImageInfo {
        self.info
    }

    fn read(&self, region: &ImageRegion) -> Result<Raster, ComputeError> {
        let clipped = region.crop(&self.info.largest);
        Ok(Raster::from_fn(clipped, self.info.bands, |x, y, band| {
            (self.generator)(x, y, band)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_clips_request() {
        let source = MemorySource::labels(3, 2, &[1, 2, 3, 4, 5, 6]).unwrap();
        let raster = source.read(&ImageRegion::rect(-1, 1, 10, 10)).unwrap();
        assert_eq!(*raster.region(), ImageRegion::rect(0, 1, 3, 1));
        assert_eq!(raster.data(), &[4.0, 5.0, 6.0]);
        assert_eq!(source.info().component, ComponentType::I32);
    }

    #[test]
    fn test_constant_source_bands() {
        let source = ConstantSource::with_bands(100, 100, ComponentType::U16, vec![1.0, 2.0]);
        assert_eq!(source.info().footprint(), 4);
        let raster = source.read(&ImageRegion::rect(98, 98, 4, 4)).unwrap();
        assert_eq!(raster.region().pixel_count(), 4);
        assert_eq!(raster.pixel(99, 99), Some(&[1.0, 2.0][..]));
    }

    #[test]
    fn test_checkerboard() {
        let source = SyntheticSource::checkerboard(4, 4, 1, 2);
        let raster = source.read(&ImageRegion::from_size([4, 4])).unwrap();
        assert_eq!(raster.get(0, 0, 0), Some(1.0));
        assert_eq!(raster.get(1, 0, 0), Some(2.0));
        assert_eq!(raster.get(1, 1, 0), Some(1.0));
        assert_eq!(source.name(), "checkerboard");
    }

    #[test]
    fn test_empty_request_reads_nothing() {
        let source = ConstantSource::new(10, 10, ComponentType::U8, 3.0);
        let raster = source.read(&ImageRegion::rect(0, 0, 10, 0)).unwrap();
        assert!(raster.data().is_empty());
    }
}
