use nalgebra::{SVector, Vector2};

use super::primitive::{Ball, Cuboid};
use super::{Bounds, Frame, Region};
use crate::error::{Error, Result};
use crate::rng::XorShift64Star;

/// Forwards every `Region` method to the wrapped primitive.
macro_rules! delegate_region {
    ($ty:ident, $dim:literal) => {
        impl Region<$dim> for $ty {
            fn signed_distance(&self, p: &SVector<f64, $dim>) -> f64 {
                self.0.signed_distance(p)
            }

            fn project_to_boundary(&self, p: &SVector<f64, $dim>) -> SVector<f64, $dim> {
                self.0.project_to_boundary(p)
            }

            fn sample_point(&self, rng: &mut XorShift64Star) -> SVector<f64, $dim> {
                self.0.sample_point(rng)
            }

            fn measure(&self) -> f64 {
                self.0.measure()
            }

            fn bounds(&self) -> Bounds<$dim> {
                self.0.bounds()
            }

            fn transformed(&self, frame: &Frame<$dim>) -> Self {
                Self(self.0.transformed(frame))
            }
        }
    };
}
pub(crate) use delegate_region;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disk(Ball<2>);

impl Disk {
    pub fn new(center: [f64; 2], radius: f64) -> Result<Self> {
        Ok(Self(Ball::new(center, radius)?))
    }

    pub fn center(&self) -> Vector2<f64> {
        self.0.center
    }

    pub fn radius(&self) -> f64 {
        self.0.radius
    }
}

/// Axis-aligned square given by its lower-left corner and side length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Square(Cuboid<2>);

impl Square {
    pub fn new(lower: [f64; 2], side: f64) -> Result<Self> {
        if !(side.is_finite() && side > 0.0) {
            return Err(Error::degenerate(format!(
                "side must be finite and positive, got {side}"
            )));
        }
        Ok(Self(Cuboid::from_corners(
            lower,
            [lower[0] + side, lower[1] + side],
        )?))
    }

    pub fn side(&self) -> f64 {
        2.0 * self.0.half[0]
    }

    pub fn lower(&self) -> Vector2<f64> {
        self.0.lower()
    }
}

/// Axis-aligned rectangle given by its lower-left and upper-right corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle(Cuboid<2>);

impl Rectangle {
    pub fn new(lower: [f64; 2], upper: [f64; 2]) -> Result<Self> {
        Ok(Self(Cuboid::from_corners(lower, upper)?))
    }

    pub fn lower(&self) -> Vector2<f64> {
        self.0.lower()
    }

    pub fn upper(&self) -> Vector2<f64> {
        self.0.upper()
    }

    /// Width over height.
    pub fn aspect_ratio(&self) -> f64 {
        self.0.half[0] / self.0.half[1]
    }
}

delegate_region!(Disk, 2);
delegate_region!(Square, 2);
delegate_region!(Rectangle, 2);
