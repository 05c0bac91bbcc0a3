use anyhow::Context;

use crate::foundation::core::Size;
use crate::foundation::error::FramescrollResult;

/// A decoded frame in premultiplied RGBA8 form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel bytes in row-major premultiplied RGBA8.
    pub rgba8_premul: Vec<u8>,
}

impl DecodedFrame {
    /// Build a frame filled with a single premultiplied color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let px = (width as usize) * (height as usize);
        Self {
            width,
            height,
            rgba8_premul: rgba.repeat(px),
        }
    }

    pub fn size(&self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }

    pub fn byte_len(&self) -> usize {
        self.rgba8_premul.len()
    }

    /// Premultiplied pixel at `(x, y)`; callers keep coordinates in bounds.
    pub(crate) fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [
            self.rgba8_premul[i],
            self.rgba8_premul[i + 1],
            self.rgba8_premul[i + 2],
            self.rgba8_premul[i + 3],
        ]
    }
}

/// Decode encoded image bytes (WebP, PNG, JPEG, ...) and convert to premultiplied RGBA8.
pub fn decode_image(bytes: &[u8]) -> FramescrollResult<DecodedFrame> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(DecodedFrame {
        width,
        height,
        rgba8_premul,
    })
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;
