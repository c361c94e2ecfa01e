use nalgebra::SVector;

/// Small seeded xorshift64* generator.
///
/// Every random choice a relaxation makes (sampling, jitter) is drawn from one of these, so a
/// run is fully determined by `SpringConfig::seed`.
#[derive(Debug, Clone)]
pub struct XorShift64Star {
    state: u64,
}

impl XorShift64Star {
    pub fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D_u64)
    }

    /// Uniform in `[0, 1)` with 53 bits of precision.
    pub fn next_f64_unit(&mut self) -> f64 {
        let u = self.next_u64() >> 11;
        (u as f64) / ((1u64 << 53) as f64)
    }

    /// Uniform in `[-1, 1)`.
    pub fn next_f64_signed(&mut self) -> f64 {
        self.next_f64_unit() * 2.0 - 1.0
    }

    /// Uniform point in the box `[lo, hi]`.
    pub fn next_in_box<const D: usize>(
        &mut self,
        lo: &SVector<f64, D>,
        hi: &SVector<f64, D>,
    ) -> SVector<f64, D> {
        SVector::<f64, D>::from_fn(|i, _| lo[i] + (hi[i] - lo[i]) * self.next_f64_unit())
    }

    /// Direction drawn uniformly from the unit sphere (rejection from the cube).
    pub fn next_unit_vector<const D: usize>(&mut self) -> SVector<f64, D> {
        for _ in 0..64 {
            let v = SVector::<f64, D>::from_fn(|_, _| self.next_f64_signed());
            let n = v.norm();
            if n > 1e-3 && n <= 1.0 {
                return v / n;
            }
        }
        let mut e = SVector::<f64, D>::zeros();
        e[0] = 1.0;
        e
    }
}
