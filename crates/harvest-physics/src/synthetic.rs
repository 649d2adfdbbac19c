// ─────────────────────────────────────────────────────────────────────
// Harvest Kernel — Synthetic Data Helpers
// ─────────────────────────────────────────────────────────────────────
//! Deterministic pseudo-random noise for synthetic inversion tests.

/// Minimal xorshift64 RNG (no external dep).
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0xDEAD_BEEF_CAFE_BABE } else { seed },
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Standard normal via Box-Muller.
    pub fn next_normal(&mut self) -> f64 {
        let u1 = self.next_f64().max(1e-300);
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}

/// Add zero-mean Gaussian noise with standard deviation `stddev`.
///
/// The same `seed` always yields the same noise sequence.
pub fn contaminate(data: &[f64], stddev: f64, seed: u64) -> Vec<f64> {
    if stddev <= 0.0 {
        return data.to_vec();
    }
    let mut rng = SimpleRng::new(seed);
    data.iter().map(|&d| d + stddev * rng.next_normal()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let data = vec![1.0; 50];
        assert_eq!(contaminate(&data, 0.1, 42), contaminate(&data, 0.1, 42));
        assert_ne!(contaminate(&data, 0.1, 42), contaminate(&data, 0.1, 43));
    }

    #[test]
    fn test_zero_stddev_is_identity() {
        let data = vec![0.5, -1.5, 2.0];
        assert_eq!(contaminate(&data, 0.0, 7), data);
    }

    #[test]
    fn test_noise_statistics() {
        let n = 20_000;
        let noisy = contaminate(&vec![0.0; n], 2.0, 1234);
        let mean = noisy.iter().sum::<f64>() / n as f64;
        let var = noisy.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.1, "mean = {mean}");
        assert!((var.sqrt() - 2.0).abs() < 0.1, "std = {}", var.sqrt());
    }

    #[test]
    fn test_uniform_range() {
        let mut rng = SimpleRng::new(0);
        for _ in 0..1000 {
            let u = rng.next_f64();
            assert!((0.0..1.0).contains(&u));
        }
    }
}
