use crate::foundation::core::{Affine, Rect, Size};

/// Placement of an image scaled to cover a target while keeping its aspect ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AspectFill {
    /// Uniform scale applied to the source image.
    pub scale: f64,
    /// Destination rectangle in canvas space. May extend past the canvas (overflow is cropped).
    pub dest: Rect,
}

impl AspectFill {
    /// Source-to-canvas transform.
    pub fn to_affine(self) -> Affine {
        Affine::translate(self.dest.origin().to_vec2()) * Affine::scale(self.scale)
    }
}

/// Cover `canvas` with `image`: `scale = max(cw / iw, ch / ih)`, centered.
///
/// Returns `None` for empty images, which cannot be scaled.
pub fn aspect_fill(canvas: Size, image: Size) -> Option<AspectFill> {
    if image.width <= 0.0 || image.height <= 0.0 {
        return None;
    }
    let scale = (canvas.width / image.width).max(canvas.height / image.height);
    let width = image.width * scale;
    let height = image.height * scale;
    let x0 = (canvas.width - width) / 2.0;
    let y0 = (canvas.height - height) / 2.0;
    Some(AspectFill {
        scale,
        dest: Rect::new(x0, y0, x0 + width, y0 + height),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/render/geometry.rs"]
mod tests;
