use nalgebra::SVector;

use crate::config::Placement;
use crate::rng::XorShift64Star;
use crate::shape::{Frame, Region};

/// Start positions in the relaxation frame, in input order.
///
/// Points that start outside `region` (by more than `geps`) are moved onto its boundary.
pub(crate) fn initial_positions<const D: usize, R: Region<D>>(
    input: &[SVector<f64, D>],
    frame: &Frame<D>,
    region: &R,
    placement: Placement,
    rect_scale: f64,
    geps: f64,
    rng: &mut XorShift64Star,
) -> Vec<SVector<f64, D>> {
    let n = input.len();
    let target = region.placement_box(rect_scale);
    let span = target.max - target.min;

    let mut out: Vec<SVector<f64, D>> = match placement {
        Placement::Given => input.iter().map(|p| frame.to_local(p)).collect(),
        Placement::Sample => (0..n).map(|_| region.sample_point(rng)).collect(),
        Placement::PreUniformize => {
            let mut out = vec![target.min; n];
            let denom = (n.max(2) - 1) as f64;
            let mut order: Vec<usize> = (0..n).collect();
            for axis in 0..D {
                order.sort_by(|&a, &b| input[a][axis].total_cmp(&input[b][axis]).then(a.cmp(&b)));
                for (rank, &i) in order.iter().enumerate() {
                    out[i][axis] = target.min[axis] + span[axis] * rank as f64 / denom;
                }
            }
            out
        }
        Placement::Scale => {
            let mut out = vec![target.center(); n];
            for axis in 0..D {
                let (lo, hi) = input.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, p| {
                    (acc.0.min(p[axis]), acc.1.max(p[axis]))
                });
                if hi > lo {
                    for (o, p) in out.iter_mut().zip(input) {
                        o[axis] = target.min[axis] + span[axis] * (p[axis] - lo) / (hi - lo);
                    }
                }
            }
            out
        }
    };

    for p in &mut out {
        if region.signed_distance(p) > geps {
            *p = region.project_to_boundary(p);
        }
    }
    out
}
