//! Raster buffers and image information.
//!
//! A [`Raster`] holds the pixels of one buffered region of an image. Samples
//! are band-interleaved and widened to `f64`; the on-disk component type is
//! kept in [`ImageInfo`] so streaming decisions use the real footprint.

use crate::core::region::ImageRegion;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage type of one sample, as declared by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    /// Unsigned 8-bit
    #[default]
    U8,
    /// Unsigned 16-bit
    U16,
    /// Signed 16-bit
    I16,
    /// Unsigned 32-bit
    U32,
    /// Signed 32-bit (label maps)
    I32,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
}

impl ComponentType {
    /// Size in bytes.
    pub fn size(&self) -> usize {
        match self {
            ComponentType::U8 => 1,
            ComponentType::U16 | ComponentType::I16 => 2,
            ComponentType::U32 | ComponentType::I32 | ComponentType::F32 => 4,
            ComponentType::F64 => 8,
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentType::U8 => "u8",
            ComponentType::U16 => "u16",
            ComponentType::I16 => "i16",
            ComponentType::U32 => "u32",
            ComponentType::I32 => "i32",
            ComponentType::F32 => "f32",
            ComponentType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Output geometry of a node, known without touching pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// Full extent the node can produce.
    pub largest: ImageRegion,
    /// Number of bands per pixel.
    pub bands: usize,
    /// Declared sample type.
    pub component: ComponentType,
}

impl ImageInfo {
    /// Create image information anchored at the origin.
    pub fn new(width: u64, height: u64, bands: usize, component: ComponentType) -> Self {
        Self {
            largest: ImageRegion::from_size([width, height]),
            bands,
            component,
        }
    }

    /// Bytes per pixel (`bands × component size`).
    pub fn footprint(&self) -> usize {
        self.bands * self.component.size()
    }

    /// Copy with a different band count.
    pub fn with_bands(mut self, bands: usize) -> Self {
        self.bands = bands;
        self
    }

    /// Copy with a different component type.
    pub fn with_component(mut self, component: ComponentType) -> Self {
        self.component = component;
        self
    }
}

/// Pixels of one buffered region.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    region: ImageRegion,
    bands: usize,
    data: Vec<f64>,
}

impl Raster {
    /// Zero-filled raster covering `region`.
    pub fn new(region: ImageRegion, bands: usize) -> Self {
        Self::filled(region, bands, 0.0)
    }

    /// Raster covering `region` with every sample set to `value`.
    pub fn filled(region: ImageRegion, bands: usize, value: f64) -> Self {
        let len = region.pixel_count() as usize * bands;
        Self {
            region,
            bands,
            data: vec![value; len],
        }
    }

    /// Raster whose samples are produced by `f(x, y, band)`.
    pub fn from_fn<F>(region: ImageRegion, bands: usize, mut f: F) -> Self
    where
        F: FnMut(i64, i64, usize) -> f64,
    {
        let mut data = Vec::with_capacity(region.pixel_count() as usize * bands);
        for (x, y) in region.points() {
            for band in 0..bands {
                data.push(f(x, y, band));
            }
        }
        Self {
            region,
            bands,
            data,
        }
    }

    /// Wrap existing band-interleaved samples. Returns `None` on a length mismatch.
    pub fn from_vec(region: ImageRegion, bands: usize, data: Vec<f64>) -> Option<Self> {
        if data.len() != region.pixel_count() as usize * bands {
            return None;
        }
        Some(Self {
            region,
            bands,
            data,
        })
    }

    /// Buffered region in full-image coordinates.
    pub fn region(&self) -> &ImageRegion {
        &self.region
    }

    /// Number of bands.
    pub fn bands(&self) -> usize {
        self.bands
    }

    /// All samples, row-major and band-interleaved.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Take the samples out.
    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if !self.region.contains_point([x, y]) {
            return None;
        }
        let col = (x - self.region.x()) as usize;
        let row = (y - self.region.y()) as usize;
        Some((row * self.region.width() as usize + col) * self.bands)
    }

    /// Whether `(x, y)` is buffered.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        self.region.contains_point([x, y])
    }

    /// Sample at `(x, y)` on `band`, if buffered.
    pub fn get(&self, x: i64, y: i64, band: usize) -> Option<f64> {
        if band >= self.bands {
            return None;
        }
        self.offset(x, y).map(|o| self.data[o + band])
    }

    /// All bands of the pixel at `(x, y)`, if buffered.
    pub fn pixel(&self, x: i64, y: i64) -> Option<&[f64]> {
        let bands = self.bands;
        self.offset(x, y).map(move |o| &self.data[o..o + bands])
    }

    /// Mutable bands of the pixel at `(x, y)`, if buffered.
    pub fn pixel_mut(&mut self, x: i64, y: i64) -> Option<&mut [f64]> {
        let bands = self.bands;
        self.offset(x, y).map(move |o| &mut self.data[o..o + bands])
    }

    /// Set one sample. Returns `false` when `(x, y)` is not buffered.
    pub fn set(&mut self, x: i64, y: i64, band: usize, value: f64) -> bool {
        if band >= self.bands {
            return false;
        }
        match self.offset(x, y) {
            Some(o) => {
                self.data[o + band] = value;
                true
            }
            None => false,
        }
    }

    /// Contiguous samples of row `y` restricted to `region`'s columns.
    pub fn row_span(&self, y: i64, region: &ImageRegion) -> Option<&[f64]> {
        let span = region.intersection(&self.region);
        if span.is_empty() || y < span.y() || y >= span.end(1) {
            return None;
        }
        let start = self.offset(span.x(), y)?;
        let len = span.width() as usize * self.bands;
        Some(&self.data[start..start + len])
    }

    /// Copy the overlap of `other` into this raster, row by row.
    pub fn paste(&mut self, other: &Raster) {
        let overlap = self.region.intersection(&other.region);
        if overlap.is_empty() || self.bands != other.bands {
            return;
        }
        let len = overlap.width() as usize * self.bands;
        for y in overlap.y()..overlap.end(1) {
            let (Some(dst), Some(src)) = (self.offset(overlap.x(), y), other.offset(overlap.x(), y))
            else {
                continue;
            };
            self.data[dst..dst + len].copy_from_slice(&other.data[src..src + len]);
        }
    }

    /// New raster holding the part of this one inside `region`.
    pub fn crop(&self, region: &ImageRegion) -> Raster {
        let mut cropped = Raster::new(region.intersection(&self.region), self.bands);
        cropped.paste(self);
        cropped
    }

    /// Memory held by the samples, in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_sizes() {
        assert_eq!(ComponentType::U8.size(), 1);
        assert_eq!(ComponentType::I32.size(), 4);
        assert_eq!(ImageInfo::new(10, 10, 3, ComponentType::U16).footprint(), 6);
    }

    #[test]
    fn test_raster_addressing_uses_global_coordinates() {
        let region = ImageRegion::rect(10, 20, 4, 3);
        let raster = Raster::from_fn(region, 2, |x, y, b| (x * 100 + y) as f64 + b as f64 * 0.5);
        assert_eq!(raster.get(10, 20, 0), Some(1020.0));
        assert_eq!(raster.get(13, 22, 1), Some(1322.5));
        assert_eq!(raster.get(14, 22, 0), None);
        assert_eq!(raster.pixel(11, 21), Some(&[1121.0, 1121.5][..]));
    }

    #[test]
    fn test_paste_and_crop() {
        let mut canvas = Raster::new(ImageRegion::from_size([6, 6]), 1);
        let tile = Raster::filled(ImageRegion::rect(4, 4, 4, 4), 1, 7.0);
        canvas.paste(&tile);
        assert_eq!(canvas.get(5, 5, 0), Some(7.0));
        assert_eq!(canvas.get(3, 5, 0), Some(0.0));

        let cropped = canvas.crop(&ImageRegion::rect(3, 3, 10, 10));
        assert_eq!(*cropped.region(), ImageRegion::rect(3, 3, 3, 3));
        assert_eq!(cropped.get(4, 4, 0), Some(7.0));
    }

    #[test]
    fn test_row_span() {
        let raster = Raster::from_fn(ImageRegion::from_size([5, 2]), 1, |x, _, _| x as f64);
        let span = raster.row_span(1, &ImageRegion::rect(1, 0, 3, 2)).unwrap();
        assert_eq!(span, &[1.0, 2.0, 3.0]);
        assert!(raster.row_span(2, &ImageRegion::from_size([5, 5])).is_none());
    }

    #[test]
    fn test_from_vec_length_check() {
        let region = ImageRegion::from_size([2, 2]);
        assert!(Raster::from_vec(region, 1, vec![0.0; 4]).is_some());
        assert!(Raster::from_vec(region, 2, vec![0.0; 4]).is_none());
    }
}
