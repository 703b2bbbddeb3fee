use serde::{Deserialize, Serialize};

/// A point or direction in 2D world space.
/// Positive x is to the right, positive y is down (screen convention).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    /// Returns the magnitude of the vector.
    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn length_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Returns the unit-length version of this vector.
    ///
    /// Zero-length and non-finite vectors normalize to `Vec2::ZERO`, so
    /// corrupt client input degrades to "no movement" instead of NaN
    /// propagating through the simulation.
    pub fn normalized_or_zero(&self) -> Vec2 {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Vec2::ZERO;
        }
        let len = self.length();
        if len == 0.0 {
            Vec2::ZERO
        } else {
            Vec2 {
                x: self.x / len,
                y: self.y / len,
            }
        }
    }

    pub fn add(&self, other: Vec2) -> Vec2 {
        Vec2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    pub fn sub(&self, other: Vec2) -> Vec2 {
        Vec2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    pub fn scale(&self, scalar: f64) -> Vec2 {
        Vec2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    pub fn distance_to(&self, other: Vec2) -> f64 {
        self.sub(other).length()
    }
}
