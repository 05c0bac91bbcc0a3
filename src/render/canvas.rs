use std::path::Path;

use anyhow::Context;

use crate::assets::decode::DecodedFrame;
use crate::foundation::core::{Point, Rect, Viewport};
use crate::foundation::error::FramescrollResult;

/// Drawing surface the renderer paints frames onto.
pub trait Canvas2d {
    /// Current backing-store size in pixels.
    fn size(&self) -> Viewport;

    /// Resize the backing store. Contents are discarded.
    fn set_size(&mut self, size: Viewport);

    /// Clear every pixel to transparent.
    fn clear(&mut self);

    /// Draw `frame` scaled into `dest` (canvas space). Parts outside the canvas are cropped.
    fn draw_image(&mut self, frame: &DecodedFrame, dest: Rect);
}

type PremulRgba8 = [u8; 4];

/// CPU canvas holding premultiplied RGBA8 pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelCanvas {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelCanvas {
    pub fn new(size: Viewport) -> Self {
        Self {
            width: size.width,
            height: size.height,
            data: vec![0; byte_len(size)],
        }
    }

    /// Premultiplied RGBA8 bytes, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<PremulRgba8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    /// Straight-alpha copy suitable for encoding.
    pub fn to_rgba_image(&self) -> FramescrollResult<image::RgbaImage> {
        let mut straight = self.data.clone();
        for px in straight.chunks_exact_mut(4) {
            let a = u32::from(px[3]);
            if a == 0 || a == 255 {
                continue;
            }
            for c in &mut px[..3] {
                *c = ((u32::from(*c) * 255 + a / 2) / a).min(255) as u8;
            }
        }
        image::RgbaImage::from_raw(self.width, self.height, straight)
            .context("canvas buffer size mismatch")
            .map_err(Into::into)
    }

    pub fn save_png(&self, path: &Path) -> FramescrollResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir '{}'", parent.display()))?;
        }
        self.to_rgba_image()?
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("write png '{}'", path.display()))?;
        Ok(())
    }
}

impl Canvas2d for PixelCanvas {
    fn size(&self) -> Viewport {
        Viewport::new(self.width, self.height)
    }

    fn set_size(&mut self, size: Viewport) {
        self.width = size.width;
        self.height = size.height;
        self.data = vec![0; byte_len(size)];
    }

    fn clear(&mut self) {
        self.data.fill(0);
    }

    fn draw_image(&mut self, frame: &DecodedFrame, dest: Rect) {
        if frame.width == 0 || frame.height == 0 || dest.width() <= 0.0 || dest.height() <= 0.0
        {
            return;
        }
        let bounds = Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height));
        let clip = bounds.intersect(dest);
        if clip.width() <= 0.0 || clip.height() <= 0.0 {
            return;
        }

        let sx = f64::from(frame.width) / dest.width();
        let sy = f64::from(frame.height) / dest.height();
        let x_start = clip.x0.floor() as u32;
        let x_end = (clip.x1.ceil() as u32).min(self.width);
        let y_start = clip.y0.floor() as u32;
        let y_end = (clip.y1.ceil() as u32).min(self.height);

        // Nearest-neighbour: sample the source texel under each destination pixel center.
        for y in y_start..y_end {
            for x in x_start..x_end {
                let p = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                if !dest.contains(p) {
                    continue;
                }
                let u = (((p.x - dest.x0) * sx) as u32).min(frame.width - 1);
                let v = (((p.y - dest.y0) * sy) as u32).min(frame.height - 1);
                let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
                let dst = [
                    self.data[i],
                    self.data[i + 1],
                    self.data[i + 2],
                    self.data[i + 3],
                ];
                let out = over(dst, frame.pixel(u, v));
                self.data[i..i + 4].copy_from_slice(&out);
            }
        }
    }
}

fn byte_len(size: Viewport) -> usize {
    (size.width as usize) * (size.height as usize) * 4
}

/// Premultiplied source-over.
fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }
    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/render/canvas.rs"]
mod tests;
