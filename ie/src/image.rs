//! Captured pixels.
//!
//! A capture is kept as packed RGB rows (`OwnedImage`). Field regions are
//! borrowed views into it (`Image<'a>`), so an extraction pass can crop many
//! small regions and only copy the ones that reach OCR preprocessing.

use anyhow::{Context, Result};
use fast_image_resize as fr;

const CHANNELS: usize = 3;

/// Owned RGB image, 3 bytes per pixel, rows tightly packed.
#[derive(Clone, Debug)]
pub struct OwnedImage {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

impl OwnedImage {
    /// Pack RGBA bytes as delivered by the screen grabber; alpha is dropped.
    ///
    /// Trailing bytes that don't make up a full row are ignored.
    pub fn from_rgba(width: usize, bytes: &[u8]) -> Self {
        let height = bytes.len() / width.max(1) / 4;
        let rgb = bytes
            .chunks_exact(4)
            .take(width * height)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        Self {
            width: width as u32,
            height: height as u32,
            rgb,
        }
    }

    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        let rgb = [color.r, color.g, color.b].repeat((width * height) as usize);
        Self { width, height, rgb }
    }

    /// Each gray level repeated into the three channels.
    pub fn from_gray_as_rgb(gray: &image::GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        let rgb = gray.as_raw().iter().flat_map(|&v| [v, v, v]).collect();
        Self { width, height, rgb }
    }

    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Out-of-bounds writes are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, color: Color) {
        if x < self.width && y < self.height {
            let i = (x + y * self.width) as usize * CHANNELS;
            self.rgb[i..i + CHANNELS].copy_from_slice(&[color.r, color.g, color.b]);
        }
    }

    /// Scale to `height`, keeping the aspect ratio (Catmull-Rom).
    pub fn resized_h(self, height: u32) -> Result<Self> {
        if self.height == height || self.width == 0 || self.height == 0 {
            return Ok(self);
        }

        let height = height.max(1);
        let width = ((self.width as u64 * height as u64 / self.height as u64) as u32).max(1);

        let src = fr::images::ImageRef::new(self.width, self.height, &self.rgb, fr::PixelType::U8x3)
            .context("wrap pixels for resize")?;
        let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);
        let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Interpolation(fr::FilterType::CatmullRom));
        fr::Resizer::new()
            .resize(&src, &mut dst, &options)
            .context("resize")?;

        Ok(Self {
            width,
            height,
            rgb: dst.into_vec(),
        })
    }

    pub fn as_image(&self) -> Image<'_> {
        Image {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
            stride: self.width,
            rgb: &self.rgb,
        }
    }

    pub fn to_gray_image(&self) -> image::GrayImage {
        self.as_image().to_gray_image()
    }
}

/// Borrowed rectangle of an `OwnedImage`.
#[derive(Clone, Copy)]
pub struct Image<'a> {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    /// Row length of the parent image, in pixels.
    stride: u32,
    rgb: &'a [u8],
}

impl<'a> Image<'a> {
    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes of row `row` (view-relative).
    #[inline]
    fn row(&self, row: u32) -> &'a [u8] {
        let start = ((self.y + row) * self.stride + self.x) as usize * CHANNELS;
        &self.rgb[start..start + self.width as usize * CHANNELS]
    }

    fn rows(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        (0..self.height).map(|row| self.row(row))
    }

    /// Packed RGB bytes of the view.
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.width as usize * self.height as usize * CHANNELS);
        for row in self.rows() {
            bytes.extend_from_slice(row);
        }
        bytes
    }

    pub fn to_owned_image(self) -> OwnedImage {
        OwnedImage {
            width: self.width,
            height: self.height,
            rgb: self.to_rgb_bytes(),
        }
    }

    pub fn to_gray_image(&self) -> image::GrayImage {
        let luma = self
            .rows()
            .flat_map(|row| row.chunks_exact(CHANNELS))
            .map(|px| Color::new(px[0], px[1], px[2]).luma())
            .collect();
        image::GrayImage::from_raw(self.width, self.height, luma).unwrap_or_default()
    }

    pub fn save_png<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let img = image::RgbImage::from_raw(self.width, self.height, self.to_rgb_bytes())
            .context("RgbImage::from_raw failed")?;
        img.save_with_format(path, image::ImageFormat::Png)
            .context("save png")?;
        Ok(())
    }

    /// Sub-rectangle in view-relative coordinates, clipped to this view.
    pub fn sub_image(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let x = x.min(self.width);
        let y = y.min(self.height);

        Self {
            x: self.x + x,
            y: self.y + y,
            width: width.min(self.width - x),
            height: height.min(self.height - y),
            stride: self.stride,
            rgb: self.rgb,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    #[inline]
    pub const fn gray(v: u8) -> Self {
        Self::new(v, v, v)
    }

    /// Rec. 601 luma.
    pub fn luma(&self) -> u8 {
        ((299 * self.r as u32 + 587 * self.g as u32 + 114 * self.b as u32) / 1000) as u8
    }
}
