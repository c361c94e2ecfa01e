//! Dimension-generic closed-form regions shared by the 2D and 3D shapes.

use std::f64::consts::PI;

use nalgebra::SVector;

use super::{Bounds, Frame, MAX_REJECTION_ATTEMPTS, Region};
use crate::error::{Error, Result};
use crate::rng::XorShift64Star;

/// Closed ball: a disk in 2D, a sphere in 3D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Ball<const D: usize> {
    pub(crate) center: SVector<f64, D>,
    pub(crate) radius: f64,
}

impl<const D: usize> Ball<D> {
    pub(crate) fn new(center: [f64; D], radius: f64) -> Result<Self> {
        if !center.iter().all(|c| c.is_finite()) {
            return Err(Error::degenerate("centre must be finite"));
        }
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::degenerate(format!(
                "radius must be finite and positive, got {radius}"
            )));
        }
        Ok(Self {
            center: SVector::from(center),
            radius,
        })
    }
}

/// Volume of the `d`-ball of radius `r`, via `V(d) = 2 pi r^2 / d * V(d - 2)`.
fn ball_measure(d: usize, r: f64) -> f64 {
    match d {
        0 => 1.0,
        1 => 2.0 * r,
        _ => 2.0 * PI * r * r / d as f64 * ball_measure(d - 2, r),
    }
}

impl<const D: usize> Region<D> for Ball<D> {
    fn signed_distance(&self, p: &SVector<f64, D>) -> f64 {
        (p - self.center).norm() - self.radius
    }

    fn project_to_boundary(&self, p: &SVector<f64, D>) -> SVector<f64, D> {
        let v = p - self.center;
        let n = v.norm();
        if n <= f64::EPSILON * self.radius {
            // Every boundary point is equally near the centre; pick the one along +x.
            let mut e = SVector::<f64, D>::zeros();
            e[0] = self.radius;
            return self.center + e;
        }
        self.center + v * (self.radius / n)
    }

    fn sample_point(&self, rng: &mut XorShift64Star) -> SVector<f64, D> {
        let b = self.bounds();
        for _ in 0..MAX_REJECTION_ATTEMPTS {
            let p = rng.next_in_box(&b.min, &b.max);
            if (p - self.center).norm_squared() <= self.radius * self.radius {
                return p;
            }
        }
        self.center
    }

    fn measure(&self) -> f64 {
        ball_measure(D, self.radius)
    }

    fn bounds(&self) -> Bounds<D> {
        let r = SVector::<f64, D>::repeat(self.radius);
        Bounds::new(self.center - r, self.center + r)
    }

    fn transformed(&self, frame: &Frame<D>) -> Self {
        Self {
            center: frame.to_local(&self.center),
            radius: self.radius / frame.scale(),
        }
    }
}

/// Axis-aligned box given by its centre and half-extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Cuboid<const D: usize> {
    pub(crate) center: SVector<f64, D>,
    pub(crate) half: SVector<f64, D>,
}

impl<const D: usize> Cuboid<D> {
    pub(crate) fn from_corners(lower: [f64; D], upper: [f64; D]) -> Result<Self> {
        let lo = SVector::<f64, D>::from(lower);
        let hi = SVector::<f64, D>::from(upper);
        for i in 0..D {
            if !(lo[i].is_finite() && hi[i].is_finite()) {
                return Err(Error::degenerate("corners must be finite"));
            }
            if hi[i] <= lo[i] {
                return Err(Error::degenerate(format!(
                    "extent along axis {i} must be positive, got {}",
                    hi[i] - lo[i]
                )));
            }
        }
        Ok(Self {
            center: (lo + hi) * 0.5,
            half: (hi - lo) * 0.5,
        })
    }

    pub(crate) fn lower(&self) -> SVector<f64, D> {
        self.center - self.half
    }

    pub(crate) fn upper(&self) -> SVector<f64, D> {
        self.center + self.half
    }
}

impl<const D: usize> Region<D> for Cuboid<D> {
    fn signed_distance(&self, p: &SVector<f64, D>) -> f64 {
        let q = (p - self.center).abs() - self.half;
        let outside = q.map(|v| v.max(0.0)).norm();
        let inside = q.max().min(0.0);
        outside + inside
    }

    fn project_to_boundary(&self, p: &SVector<f64, D>) -> SVector<f64, D> {
        let lo = self.lower();
        let hi = self.upper();
        let d = p - self.center;
        let q = d.abs() - self.half;
        if q.iter().any(|&v| v > 0.0) {
            return SVector::<f64, D>::from_fn(|i, _| p[i].clamp(lo[i], hi[i]));
        }
        // Inside: push out through the nearest face.
        let axis = q.imax();
        let mut out = *p;
        out[axis] = if d[axis] < 0.0 { lo[axis] } else { hi[axis] };
        out
    }

    fn sample_point(&self, rng: &mut XorShift64Star) -> SVector<f64, D> {
        rng.next_in_box(&self.lower(), &self.upper())
    }

    fn measure(&self) -> f64 {
        self.half.iter().map(|h| 2.0 * h).product()
    }

    fn bounds(&self) -> Bounds<D> {
        Bounds::new(self.lower(), self.upper())
    }

    fn transformed(&self, frame: &Frame<D>) -> Self {
        Self {
            center: frame.to_local(&self.center),
            half: self.half / frame.scale(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Vector2, Vector3};

    #[test]
    fn ball_measure_matches_closed_forms() {
        assert!((ball_measure(2, 2.0) - 4.0 * PI).abs() < 1e-12);
        assert!((ball_measure(3, 1.0) - 4.0 / 3.0 * PI).abs() < 1e-12);
    }

    #[test]
    fn box_signed_distance_is_exact_inside_and_outside() {
        let b = Cuboid::<2>::from_corners([0.0, 0.0], [4.0, 2.0]).unwrap();
        assert!((b.signed_distance(&Vector2::new(1.0, 1.0)) + 1.0).abs() < 1e-12);
        assert!((b.signed_distance(&Vector2::new(3.5, 1.0)) + 0.5).abs() < 1e-12);
        assert!((b.signed_distance(&Vector2::new(7.0, 6.0)) - 5.0).abs() < 1e-12);
        assert!((b.signed_distance(&Vector2::new(2.0, -1.0)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn box_projection_uses_nearest_face_or_clamp() {
        let b = Cuboid::<3>::from_corners([0.0; 3], [2.0; 3]).unwrap();
        let inside = Vector3::new(1.0, 1.8, 0.5);
        assert_eq!(b.project_to_boundary(&inside), Vector3::new(1.0, 2.0, 0.5));
        let outside = Vector3::new(-1.0, 3.0, 1.0);
        assert_eq!(b.project_to_boundary(&outside), Vector3::new(0.0, 2.0, 1.0));
    }

    #[test]
    fn ball_rejects_bad_parameters() {
        assert!(Ball::<2>::new([0.0, 0.0], 0.0).is_err());
        assert!(Ball::<3>::new([0.0, f64::NAN, 0.0], 1.0).is_err());
        assert!(Cuboid::<2>::from_corners([0.0, 0.0], [1.0, 0.0]).is_err());
    }
}
