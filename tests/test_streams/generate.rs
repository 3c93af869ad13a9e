use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// `before` samples at `low`, then `after` samples at `high`
pub fn step(before: usize, after: usize, low: f64, high: f64) -> Vec<f64> {
    std::iter::repeat_n(low, before)
        .chain(std::iter::repeat_n(high, after))
        .collect()
}

pub fn ramp(n: usize, start: f64, slope: f64) -> Vec<f64> {
    (0..n).map(|i| start + slope * i as f64).collect()
}

/// Add reproducible gaussian noise to a stream
pub fn noisy(values: &[f64], std_dev: f64, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(0.0, std_dev).unwrap();
    values.iter().map(|v| v + normal.sample(&mut rng)).collect()
}

/// Turn every `every`-th reading (1-based) into a gap
pub fn with_gaps(values: &[f64], every: usize) -> Vec<Option<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| if (i + 1) % every == 0 { None } else { Some(v) })
        .collect()
}
