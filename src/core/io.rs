//! File sources and sinks through the `image` crate.

use crate::core::error::{ComputeError, ConfigurationError, TilestreamResult};
use crate::core::raster::{ComponentType, ImageInfo, Raster};
use crate::core::region::ImageRegion;
use crate::core::source::ImageSource;
use image::{DynamicImage, ImageBuffer, Luma, LumaA, Pixel, Rgb, Rgba};
use std::path::{Path, PathBuf};

/// Image file decoded once and served in tiles.
pub struct ImageFileSource {
    path: PathBuf,
    name: String,
    image: DynamicImage,
    info: ImageInfo,
}

impl ImageFileSource {
    /// Open and decode an image file.
    pub fn open(path: impl AsRef<Path>) -> TilestreamResult<Self> {
        let path = path.as_ref().to_path_buf();
        let image = image::open(&path)?;
        let (bands, component) = layout(&image);
        let info = ImageInfo::new(image.width() as u64, image.height() as u64, bands, component);
        log::debug!(
            "Opened '{}': {}x{}, {} band(s) of {}",
            path.display(),
            image.width(),
            image.height(),
            bands,
            component
        );
        Ok(Self {
            name: path.display().to_string(),
            path,
            image,
            info,
        })
    }

    /// Path of the decoded file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn layout(image: &DynamicImage) -> (usize, ComponentType) {
    match image {
        DynamicImage::ImageLuma8(_) => (1, ComponentType::U8),
        DynamicImage::ImageLumaA8(_) => (2, ComponentType::U8),
        DynamicImage::ImageRgb8(_) => (3, ComponentType::U8),
        DynamicImage::ImageRgba8(_) => (4, ComponentType::U8),
        DynamicImage::ImageLuma16(_) => (1, ComponentType::U16),
        DynamicImage::ImageLumaA16(_) => (2, ComponentType::U16),
        DynamicImage::ImageRgb16(_) => (3, ComponentType::U16),
        DynamicImage::ImageRgba16(_) => (4, ComponentType::U16),
        DynamicImage::ImageRgb32F(_) => (3, ComponentType::F32),
        _ => (4, ComponentType::F32),
    }
}

fn read_buffer<P>(buffer: &ImageBuffer<P, Vec<P::Subpixel>>, region: &ImageRegion) -> Raster
where
    P: Pixel,
    P::Subpixel: Into<f64>,
{
    Raster::from_fn(*region, P::CHANNEL_COUNT as usize, |x, y, band| {
        buffer.get_pixel(x as u32, y as u32).channels()[band].into()
    })
}

impl ImageSource for ImageFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self) -> ImageInfo {
        self.info
    }

    fn read(&self, region: &ImageRegion) -> Result<Raster, ComputeError> {
        let clipped = region.crop(&self.info.largest);
        let raster = match &self.image {
            DynamicImage::ImageLuma8(b) => read_buffer(b, &clipped),
            DynamicImage::ImageLumaA8(b) => read_buffer(b, &clipped),
            DynamicImage::ImageRgb8(b) => read_buffer(b, &clipped),
            DynamicImage::ImageRgba8(b) => read_buffer(b, &clipped),
            DynamicImage::ImageLuma16(b) => read_buffer(b, &clipped),
            DynamicImage::ImageLumaA16(b) => read_buffer(b, &clipped),
            DynamicImage::ImageRgb16(b) => read_buffer(b, &clipped),
            DynamicImage::ImageRgba16(b) => read_buffer(b, &clipped),
            DynamicImage::ImageRgb32F(b) => read_buffer(b, &clipped),
            DynamicImage::ImageRgba32F(b) => read_buffer(b, &clipped),
            other => {
                let crop = other.crop_imm(
                    clipped.x() as u32,
                    clipped.y() as u32,
                    clipped.width() as u32,
                    clipped.height() as u32,
                );
                let converted = crop.to_rgba32f();
                let local = ImageRegion::from_size([clipped.width(), clipped.height()]);
                let tile = read_buffer(&converted, &local);
                let data = tile.into_data();
                Raster::from_vec(clipped, 4, data).ok_or_else(|| ComputeError::SourceRead {
                    region: clipped,
                    message: "unexpected sample count after conversion".to_string(),
                })?
            }
        };
        Ok(raster)
    }
}

fn pack<P, F>(raster: &Raster, convert: F) -> Option<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel,
    F: Fn(f64) -> P::Subpixel,
{
    let region = raster.region();
    let samples = raster.data().iter().map(|&v| convert(v)).collect();
    ImageBuffer::from_raw(region.width() as u32, region.height() as u32, samples)
}

fn to_u8(value: f64) -> u8 {
    value.round().clamp(0.0, u8::MAX as f64) as u8
}

fn to_u16(value: f64) -> u16 {
    value.round().clamp(0.0, u16::MAX as f64) as u16
}

/// Encode a raster to `path`; the format follows the file extension.
///
/// `U8` rasters are written with 8-bit samples and every other component type
/// with 16-bit samples. Values are rounded and clamped to the target depth.
pub fn save_raster(raster: &Raster, component: ComponentType, path: impl AsRef<Path>) -> TilestreamResult<()> {
    let path = path.as_ref();
    let eight_bit = component == ComponentType::U8;
    let image = match (raster.bands(), eight_bit) {
        (1, true) => pack::<Luma<u8>, _>(raster, to_u8).map(DynamicImage::ImageLuma8),
        (2, true) => pack::<LumaA<u8>, _>(raster, to_u8).map(DynamicImage::ImageLumaA8),
        (3, true) => pack::<Rgb<u8>, _>(raster, to_u8).map(DynamicImage::ImageRgb8),
        (4, true) => pack::<Rgba<u8>, _>(raster, to_u8).map(DynamicImage::ImageRgba8),
        (1, false) => pack::<Luma<u16>, _>(raster, to_u16).map(DynamicImage::ImageLuma16),
        (2, false) => pack::<LumaA<u16>, _>(raster, to_u16).map(DynamicImage::ImageLumaA16),
        (3, false) => pack::<Rgb<u16>, _>(raster, to_u16).map(DynamicImage::ImageRgb16),
        (4, false) => pack::<Rgba<u16>, _>(raster, to_u16).map(DynamicImage::ImageRgba16),
        (bands, _) => {
            return Err(ConfigurationError::InvalidParameter {
                filter: "save_raster".to_string(),
                parameter: "bands".to_string(),
                reason: format!("cannot encode {} band(s), expected 1 to 4", bands),
            }
            .into())
        }
    };
    let image = image.ok_or_else(|| ConfigurationError::InvalidParameter {
        filter: "save_raster".to_string(),
        parameter: "raster".to_string(),
        reason: "sample count does not match the raster size".to_string(),
    })?;
    image.save(path)?;
    log::info!("Wrote {} to '{}'", raster.region(), path.display());
    Ok(())
}
