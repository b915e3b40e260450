//! Rectangular domain boundary.

use glam::Vec2;

/// Axis-aligned rectangle the fluid is confined to.
///
/// Tracks the window the fluid lives in: the rectangle can move and resize
/// between frames, and particles caught outside by such a move receive the
/// wall's displacement as a velocity impulse so the fluid sloshes with the
/// window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryRect {
    /// Lower-left corner.
    pub origin: Vec2,
    /// Width and height; both positive.
    pub size: Vec2,
}

impl BoundaryRect {
    /// Construct from corner and extent.
    pub fn new(origin: Vec2, size: Vec2) -> Self {
        debug_assert!(size.x > 0.0 && size.y > 0.0);
        Self { origin, size }
    }

    /// Upper-right corner.
    #[inline]
    pub fn max(&self) -> Vec2 {
        self.origin + self.size
    }

    /// True when `p` lies inside or on the rectangle.
    #[inline]
    pub fn contains(&self, p: Vec2) -> bool {
        let max = self.max();
        p.x >= self.origin.x && p.x <= max.x && p.y >= self.origin.y && p.y <= max.y
    }

    /// Clamp a position to the rectangle and reflect the velocity component
    /// along each violated axis, scaled by `damping`.
    ///
    /// Each axis is handled independently, so a corner hit reflects both
    /// components.
    pub fn resolve_collision(&self, pos: &mut Vec2, vel: &mut Vec2, damping: f32) {
        let max = self.max();

        if pos.x < self.origin.x {
            pos.x = self.origin.x;
            vel.x *= -damping;
        } else if pos.x > max.x {
            pos.x = max.x;
            vel.x *= -damping;
        }

        if pos.y < self.origin.y {
            pos.y = self.origin.y;
            vel.y *= -damping;
        } else if pos.y > max.y {
            pos.y = max.y;
            vel.y *= -damping;
        }
    }

    /// Pull a particle left outside by a boundary move back inside, adding
    /// the displacement as a velocity impulse over `dt`.
    ///
    /// No-op for particles already inside. `dt` of zero (first frame) skips
    /// the impulse and only clamps.
    pub fn absorb_displaced(&self, pos: &mut Vec2, vel: &mut Vec2, dt: f32) {
        if self.contains(*pos) {
            return;
        }
        let max = self.max();
        let clamped = pos.clamp(self.origin, max);
        if dt > 0.0 {
            *vel += (clamped - *pos) / dt;
        }
        *pos = clamped;
    }
}
