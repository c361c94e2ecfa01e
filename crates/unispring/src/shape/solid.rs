use nalgebra::{SVector, Vector3};

use super::planar::delegate_region;
use super::primitive::{Ball, Cuboid};
use super::{Bounds, Frame, Region};
use crate::error::{Error, Result};
use crate::rng::XorShift64Star;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere(Ball<3>);

impl Sphere {
    pub fn new(center: [f64; 3], radius: f64) -> Result<Self> {
        Ok(Self(Ball::new(center, radius)?))
    }

    pub fn center(&self) -> Vector3<f64> {
        self.0.center
    }

    pub fn radius(&self) -> f64 {
        self.0.radius
    }
}

/// Axis-aligned cube given by its lower corner and side length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cube(Cuboid<3>);

impl Cube {
    pub fn new(lower: [f64; 3], side: f64) -> Result<Self> {
        if !(side.is_finite() && side > 0.0) {
            return Err(Error::degenerate(format!(
                "side must be finite and positive, got {side}"
            )));
        }
        Ok(Self(Cuboid::from_corners(
            lower,
            [lower[0] + side, lower[1] + side, lower[2] + side],
        )?))
    }

    pub fn side(&self) -> f64 {
        2.0 * self.0.half[0]
    }
}

/// Axis-aligned rectangular parallelepiped given by two opposite corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parallelepiped(Cuboid<3>);

impl Parallelepiped {
    pub fn new(lower: [f64; 3], upper: [f64; 3]) -> Result<Self> {
        Ok(Self(Cuboid::from_corners(lower, upper)?))
    }

    pub fn lower(&self) -> Vector3<f64> {
        self.0.lower()
    }

    pub fn upper(&self) -> Vector3<f64> {
        self.0.upper()
    }
}

delegate_region!(Sphere, 3);
delegate_region!(Cube, 3);
delegate_region!(Parallelepiped, 3);
