#![forbid(unsafe_code)]

//! Spring relaxation of point sets into 2D and 3D regions.
//!
//! Points keep the neighbourhoods they had in their input space (a fixed topology found with a
//! [`kdspace`] tree) while springs, mild repulsion and a boundary force spread them evenly over a
//! target [`Shape`]. The result preserves who is next to whom, not exact distances.
//!
//! ```
//! use unispring::{Disk, SpringConfig, layout};
//!
//! let points = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.5, 0.5];
//! let disk = Disk::new([0.0, 0.0], 1.0)?;
//! let result = layout(&points, 2, &disk.into(), &SpringConfig::default())?;
//! assert_eq!(result.len(), 5);
//! for i in 0..result.len() {
//!     let p = result.point(i);
//!     assert!(p[0].hypot(p[1]) <= 1.0 + 1e-9);
//! }
//! # Ok::<(), unispring::Error>(())
//! ```

pub mod config;
mod engine;
pub mod error;
mod placement;
pub mod rng;
pub mod shape;
mod topology;

pub use config::{
    IndexRebuild, NeighborCriterion, Placement, Repulsion, RestMode, SpringConfig, SpringLaw,
};
pub use engine::{ConvergenceReason, LayoutResult, Phase, Relaxation, StepReport, Termination};
pub use error::{Error, Result};
pub use shape::{
    Bounds, Cube, Disk, Frame, Parallelepiped, PlanarShape, Polygon, Rectangle, Region, Shape,
    ShapeSpec, SolidShape, Sphere, Square,
};

/// Relaxes row-major `points` of dimension `dim` into `shape`, running up to
/// `config.max_iterations` steps.
///
/// Positions come back in input order, in the shape's coordinates.
pub fn layout(points: &[f64], dim: usize, shape: &Shape, config: &SpringConfig) -> Result<LayoutResult> {
    if dim != shape.dim() {
        return Err(Error::DimensionMismatch {
            expected: shape.dim(),
            found: dim,
        });
    }
    if points.len() % dim != 0 {
        return Err(Error::RaggedInput {
            len: points.len(),
            dim,
        });
    }
    match shape {
        Shape::Planar(s) => relax::<2, _>(points, s.clone(), config),
        Shape::Solid(s) => relax::<3, _>(points, s.clone(), config),
    }
}

fn relax<const D: usize, R: Region<D>>(
    points: &[f64],
    region: R,
    config: &SpringConfig,
) -> Result<LayoutResult> {
    let rows: Vec<[f64; D]> = points
        .chunks_exact(D)
        .map(|c| std::array::from_fn(|k| c[k]))
        .collect();
    let mut engine = Relaxation::initialize(&rows, region, config)?;
    engine.run(config.max_iterations)?;
    Ok(engine.finalize())
}
