//! Image-space to viewport-space mapping.
//!
//! The image layer is drawn scaled by `scale` and offset by `position * scale`,
//! so a point maps as `viewport = (image + position) * scale`. `position` is
//! therefore expressed in image units.

use egui::{Pos2, Vec2};

/// Fraction of the viewport the fitted image may occupy.
pub const DEFAULT_FIT_MARGIN: f32 = 0.9;

/// Uniform scale plus pan offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub scale: f32,
    pub position: Vec2,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl ViewTransform {
    pub fn new(scale: f32, position: Vec2) -> Self {
        Self { scale, position }
    }

    pub fn identity() -> Self {
        Self::new(1.0, Vec2::ZERO)
    }

    /// Scale and center an image so it is fully visible in the viewport,
    /// leaving `margin` of the limiting dimension in use.
    ///
    /// Degenerate sizes yield the identity transform.
    pub fn fit(image_size: Vec2, viewport_size: Vec2, margin: f32) -> Self {
        if image_size.x <= 0.0
            || image_size.y <= 0.0
            || viewport_size.x <= 0.0
            || viewport_size.y <= 0.0
        {
            return Self::identity();
        }

        let scale = (viewport_size.x / image_size.x).min(viewport_size.y / image_size.y) * margin;
        let position = Vec2::new(
            (viewport_size.x / 2.0 - image_size.x * scale / 2.0) / scale,
            (viewport_size.y / 2.0 - image_size.y * scale / 2.0) / scale,
        );
        Self { scale, position }
    }

    pub fn image_to_viewport(&self, p: Pos2) -> Pos2 {
        Pos2::new(
            (p.x + self.position.x) * self.scale,
            (p.y + self.position.y) * self.scale,
        )
    }

    pub fn viewport_to_image(&self, p: Pos2) -> Pos2 {
        Pos2::new(
            p.x / self.scale - self.position.x,
            p.y / self.scale - self.position.y,
        )
    }

    /// Zoom while keeping the image point under `cursor` fixed.
    pub fn zoom_to_cursor(&self, new_scale: f32, cursor: Pos2) -> Self {
        let anchor = self.viewport_to_image(cursor);
        Self {
            scale: new_scale,
            position: Vec2::new(
                cursor.x / new_scale - anchor.x,
                cursor.y / new_scale - anchor.y,
            ),
        }
    }

    /// Pan by a delta given in viewport pixels.
    pub fn pan_by(&self, delta: Vec2) -> Self {
        Self {
            scale: self.scale,
            position: self.position + delta / self.scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_fit_landscape_image() {
        let t = ViewTransform::fit(
            Vec2::new(2000.0, 1000.0),
            Vec2::new(1200.0, 700.0),
            DEFAULT_FIT_MARGIN,
        );
        assert!(approx_eq(t.scale, 0.54));
        assert!(approx_eq(t.position.x, (600.0 - 540.0) / 0.54));
        assert!(approx_eq(t.position.y, (350.0 - 270.0) / 0.54));
    }

    #[test]
    fn test_fit_centers_image() {
        let image = Vec2::new(640.0, 480.0);
        let viewport = Vec2::new(1200.0, 700.0);
        let t = ViewTransform::fit(image, viewport, DEFAULT_FIT_MARGIN);

        let top_left = t.image_to_viewport(Pos2::ZERO);
        let bottom_right = t.image_to_viewport(image.to_pos2());
        assert!(approx_eq(top_left.x, viewport.x - bottom_right.x));
        assert!(approx_eq(top_left.y, viewport.y - bottom_right.y));
        assert!(top_left.x >= 0.0 && top_left.y >= 0.0);
    }

    #[test]
    fn test_fit_degenerate_is_identity() {
        let t = ViewTransform::fit(Vec2::ZERO, Vec2::new(1200.0, 700.0), DEFAULT_FIT_MARGIN);
        assert_eq!(t, ViewTransform::identity());
    }

    #[test]
    fn test_viewport_roundtrip() {
        let t = ViewTransform::new(0.75, Vec2::new(12.0, -3.0));
        let p = Pos2::new(140.0, 260.0);
        let back = t.viewport_to_image(t.image_to_viewport(p));
        assert!(approx_eq(back.x, p.x) && approx_eq(back.y, p.y));
    }

    #[test]
    fn test_zoom_to_cursor_keeps_point_fixed() {
        let t = ViewTransform::new(1.0, Vec2::new(10.0, 20.0));
        let cursor = Pos2::new(300.0, 200.0);
        let before = t.viewport_to_image(cursor);
        let zoomed = t.zoom_to_cursor(2.5, cursor);
        let after = zoomed.viewport_to_image(cursor);
        assert!(approx_eq(before.x, after.x));
        assert!(approx_eq(before.y, after.y));
    }

    #[test]
    fn test_pan_moves_in_viewport_pixels() {
        let t = ViewTransform::new(2.0, Vec2::ZERO);
        let panned = t.pan_by(Vec2::new(20.0, -10.0));
        let moved = panned.image_to_viewport(Pos2::ZERO);
        assert!(approx_eq(moved.x, 20.0));
        assert!(approx_eq(moved.y, -10.0));
    }
}
