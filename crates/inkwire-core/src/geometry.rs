//! Pointer-to-canvas coordinate mapping.

use kurbo::{Point, Rect};

/// Maps client-space pointer positions onto the canvas backing store.
///
/// The canvas occupies `bounds` in client (CSS pixel) space; its backing
/// store is scaled by `device_pixel_ratio`, so every recorded stroke point
/// is already in device pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasGeometry {
    bounds: Rect,
    device_pixel_ratio: f64,
}

impl Default for CanvasGeometry {
    fn default() -> Self {
        Self {
            bounds: Rect::ZERO,
            device_pixel_ratio: 1.0,
        }
    }
}

impl CanvasGeometry {
    /// Create a geometry for a canvas placed at `bounds` in client space.
    ///
    /// A non-finite or non-positive ratio falls back to `1.0`.
    pub fn new(bounds: Rect, device_pixel_ratio: f64) -> Self {
        Self {
            bounds,
            device_pixel_ratio: sanitize_ratio(device_pixel_ratio),
        }
    }

    /// Update after the canvas element moved or was resized.
    pub fn resize(&mut self, bounds: Rect, device_pixel_ratio: f64) {
        self.bounds = bounds;
        self.device_pixel_ratio = sanitize_ratio(device_pixel_ratio);
    }

    /// Client-space rectangle covered by the canvas.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    /// Size of the backing store in device pixels.
    pub fn backing_size(&self) -> kurbo::Size {
        self.bounds.size() * self.device_pixel_ratio
    }

    /// Convert a client-space pointer position into canvas-local coordinates.
    pub fn to_canvas_coordinates(&self, client_x: f64, client_y: f64) -> Point {
        let local = Point::new(client_x, client_y) - self.bounds.origin();
        (local * self.device_pixel_ratio).to_point()
    }

    /// Whether a client-space position falls inside the canvas.
    pub fn contains(&self, client_x: f64, client_y: f64) -> bool {
        self.bounds.contains(Point::new(client_x, client_y))
    }
}

fn sanitize_ratio(ratio: f64) -> f64 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}
