use anyhow::{bail, Context, Result};
use glam::Vec3;
use image::codecs::hdr::HdrEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader, Rgb, Rgb32FImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Largest value a half-float consumer can represent; decoded input is
/// clamped to this range before any processing.
pub const CHANNEL_MAX: f32 = 65_504.0;

const RGBM_RANGE: f32 = 8.0;

/// Owned RGB float pixel buffer. Backing storage for cubemap faces and LUTs.
#[derive(Clone)]
pub struct Image {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Image {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, data: vec![0.0; width * height * 3] }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> Vec3 {
        let idx = (y * self.width + x) * 3;
        Vec3::new(self.data[idx], self.data[idx + 1], self.data[idx + 2])
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, value: Vec3) {
        let idx = (y * self.width + x) * 3;
        self.data[idx] = value.x;
        self.data[idx + 1] = value.y;
        self.data[idx + 2] = value.z;
    }

    pub fn fill(&mut self, value: Vec3) {
        for chunk in self.data.chunks_exact_mut(3) {
            chunk[0] = value.x;
            chunk[1] = value.y;
            chunk[2] = value.z;
        }
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Replaces non-finite texels with black and clamps channels to
    /// [0, CHANNEL_MAX] so downstream integration stays finite.
    pub fn clamp_channels(&mut self) {
        for value in &mut self.data {
            *value = if value.is_finite() { value.clamp(0.0, CHANNEL_MAX) } else { 0.0 };
        }
    }

    /// Bilinear fetch with wrap-around in x and clamp in y, as used for
    /// equirectangular sources.
    pub fn sample_wrapped(&self, u: f32, v: f32) -> Vec3 {
        let x = u * (self.width as f32 - 1.0);
        let y = v * (self.height as f32 - 1.0);
        let x0 = x.floor();
        let y0 = y.floor();
        let tx = x - x0;
        let ty = y - y0;

        let ix0 = x0.rem_euclid(self.width as f32) as usize;
        let ix1 = (x0 + 1.0).rem_euclid(self.width as f32) as usize;
        let iy0 = y0.clamp(0.0, (self.height - 1) as f32) as usize;
        let iy1 = (y0 + 1.0).clamp(0.0, (self.height - 1) as f32) as usize;

        let c00 = self.pixel(ix0, iy0);
        let c10 = self.pixel(ix1, iy0);
        let c01 = self.pixel(ix0, iy1);
        let c11 = self.pixel(ix1, iy1);

        let c0 = c00 * (1.0 - tx) + c10 * tx;
        let c1 = c01 * (1.0 - tx) + c11 * tx;
        c0 * (1.0 - ty) + c1 * ty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Hdr,
    Exr,
    Rgbm,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "hdr" => Ok(OutputFormat::Hdr),
            "exr" => Ok(OutputFormat::Exr),
            "rgbm" => Ok(OutputFormat::Rgbm),
            "psd" | "dds" => bail!("format '{name}' has no encoder in this build; use png, hdr, exr or rgbm"),
            other => bail!("unknown output format '{other}'; use png, hdr, exr or rgbm"),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Hdr => "hdr",
            OutputFormat::Exr => "exr",
            OutputFormat::Rgbm => "rgbm",
        }
    }
}

/// Decodes an image file into a linear RGB float buffer. The source must
/// carry exactly 3 channels; anything else is rejected here, before the
/// numeric pipeline runs.
pub fn decode(path: &Path) -> Result<Image> {
    let reader = ImageReader::open(path)
        .with_context(|| format!("opening input image '{}'", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("probing format of '{}'", path.display()))?;
    let dyn_img = reader.decode().with_context(|| format!("decoding '{}'", path.display()))?;
    let channels = dyn_img.color().channel_count();
    if channels != 3 {
        bail!("input image must be RGB (3 channels), '{}' has {channels}", path.display());
    }
    Ok(from_dynamic(&dyn_img))
}

fn from_dynamic(dyn_img: &DynamicImage) -> Image {
    let rgb = dyn_img.to_rgb32f();
    let mut out = Image::new(rgb.width() as usize, rgb.height() as usize);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        out.set_pixel(x as usize, y as usize, Vec3::new(r, g, b));
    }
    out
}

/// Encodes an image to disk. The compression hint is accepted for interface
/// parity but none of the available encoders take one.
pub fn encode(img: &Image, path: &Path, format: OutputFormat, _compression: Option<&str>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory '{}'", parent.display()))?;
        }
    }
    match format {
        OutputFormat::Png => encode_png(img, path),
        OutputFormat::Hdr => encode_hdr(img, path),
        OutputFormat::Exr => encode_exr(img, path),
        OutputFormat::Rgbm => encode_rgbm(img, path),
    }
    .with_context(|| format!("writing '{}'", path.display()))
}

fn encode_png(img: &Image, path: &Path) -> Result<()> {
    let mut bytes = Vec::with_capacity(img.width * img.height * 3);
    for value in &img.data {
        bytes.push((linear_to_srgb(*value) * 255.0 + 0.5) as u8);
    }
    let writer = BufWriter::new(File::create(path)?);
    PngEncoder::new(writer).write_image(
        &bytes,
        img.width as u32,
        img.height as u32,
        ExtendedColorType::Rgb8,
    )?;
    Ok(())
}

fn encode_hdr(img: &Image, path: &Path) -> Result<()> {
    let pixels: Vec<Rgb<f32>> =
        img.data.chunks_exact(3).map(|c| Rgb([c[0], c[1], c[2]])).collect();
    let writer = BufWriter::new(File::create(path)?);
    HdrEncoder::new(writer).encode(&pixels, img.width, img.height)?;
    Ok(())
}

fn encode_exr(img: &Image, path: &Path) -> Result<()> {
    let buffer = Rgb32FImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
        .context("building EXR pixel buffer")?;
    DynamicImage::ImageRgb32F(buffer).save_with_format(path, image::ImageFormat::OpenExr)?;
    Ok(())
}

fn encode_rgbm(img: &Image, path: &Path) -> Result<()> {
    let mut bytes = Vec::with_capacity(img.width * img.height * 4);
    for chunk in img.data.chunks_exact(3) {
        bytes.extend_from_slice(&rgbm_encode(Vec3::new(chunk[0], chunk[1], chunk[2])));
    }
    let writer = BufWriter::new(File::create(path)?);
    PngEncoder::new(writer).write_image(
        &bytes,
        img.width as u32,
        img.height as u32,
        ExtendedColorType::Rgba8,
    )?;
    Ok(())
}

/// Shared-multiplier HDR packing: linear RGB scaled into [0,1] by the range
/// constant, largest channel quantized into alpha.
pub fn rgbm_encode(color: Vec3) -> [u8; 4] {
    let scaled = (color / RGBM_RANGE).clamp(Vec3::ZERO, Vec3::ONE);
    let mut m = scaled.max_element().max(1.0 / 255.0);
    m = (m * 255.0).ceil() / 255.0;
    let rgb = scaled / m;
    [
        (rgb.x * 255.0 + 0.5) as u8,
        (rgb.y * 255.0 + 0.5) as u8,
        (rgb.z * 255.0 + 0.5) as u8,
        (m * 255.0 + 0.5) as u8,
    ]
}

pub fn rgbm_decode(texel: [u8; 4]) -> Vec3 {
    let m = texel[3] as f32 / 255.0;
    Vec3::new(texel[0] as f32, texel[1] as f32, texel[2] as f32) / 255.0 * m * RGBM_RANGE
}

fn linear_to_srgb(value: f32) -> f32 {
    let v = value.clamp(0.0, 1.0);
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_channels_scrubs_non_finite_texels() {
        let mut img = Image::new(2, 1);
        img.set_pixel(0, 0, Vec3::new(f32::NAN, -1.0, 1e9));
        img.set_pixel(1, 0, Vec3::new(0.25, 0.5, 0.75));
        img.clamp_channels();
        assert_eq!(img.pixel(0, 0), Vec3::new(0.0, 0.0, CHANNEL_MAX));
        assert_eq!(img.pixel(1, 0), Vec3::new(0.25, 0.5, 0.75));
    }

    #[test]
    fn rgbm_round_trip_preserves_hdr_values() {
        for color in [
            Vec3::new(0.1, 0.5, 0.9),
            Vec3::new(4.0, 2.0, 0.5),
            Vec3::new(7.5, 7.5, 7.5),
            Vec3::ZERO,
        ] {
            let decoded = rgbm_decode(rgbm_encode(color));
            let tolerance = (color.max_element() / 255.0).max(0.04);
            assert!(
                (decoded - color).abs().max_element() <= tolerance,
                "rgbm round trip drifted: {color:?} -> {decoded:?}"
            );
        }
    }

    #[test]
    fn sample_wrapped_is_exact_on_texel_centers() {
        let mut img = Image::new(4, 2);
        img.set_pixel(2, 1, Vec3::new(1.0, 2.0, 3.0));
        let u = 2.0 / 3.0;
        let v = 1.0;
        assert_eq!(img.sample_wrapped(u, v), Vec3::new(1.0, 2.0, 3.0));
    }
}
