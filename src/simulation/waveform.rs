use rand::RngExt;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// Shape of a simulated process variable
///
/// `noise` is the standard deviation of the gaussian noise added to every
/// reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    /// Uniform random level in [-1, 1) held for `hold` seconds
    RandomFlat {
        hold: f64,
        scale: f64,
        noise: f64,
        offset: f64,
    },
    /// Gaussian random walk, one step per reading
    RandomWalk { step: f64, start: f64 },
    /// Symmetric triangle in [-1, 1], clipped to `±clip`
    ClippedTriangle {
        period: f64,
        clip: f64,
        scale: f64,
        noise: f64,
        offset: f64,
    },
    Sine {
        period: f64,
        amplitude: f64,
        noise: f64,
        offset: f64,
    },
}

/// Names of the built-in simulated PVs
pub const SIMULATED_PVS: [&str; 4] = ["dummy_pv_0", "dummy_pv_1", "dummy_pv_2", "dummy_pv_3"];

impl Waveform {
    /// Waveform behind one of the built-in PV names
    pub fn for_pv(name: &str) -> Option<Self> {
        match name {
            "dummy_pv_0" => Some(Waveform::RandomFlat {
                hold: 5.0,
                scale: 10.0,
                noise: 1.0,
                offset: 10.0,
            }),
            "dummy_pv_1" => Some(Waveform::RandomWalk {
                step: 10.0,
                start: 1.0,
            }),
            "dummy_pv_2" => Some(Waveform::ClippedTriangle {
                period: 50.0,
                clip: 0.5,
                scale: 10.0,
                noise: 0.4,
                offset: 1.0,
            }),
            "dummy_pv_3" => Some(Waveform::Sine {
                period: 40.0,
                amplitude: 10.0,
                noise: 2.0,
                offset: 1.0,
            }),
            _ => None,
        }
    }
}

/// Triangle wave rising from -1 at phase 0 to 1 at phase 0.5
pub fn triangle(t: f64, period: f64) -> f64 {
    let phase = (t / period).rem_euclid(1.0);
    if phase < 0.5 {
        -1.0 + 4.0 * phase
    } else {
        3.0 - 4.0 * phase
    }
}

fn gaussian(rng: &mut ChaCha8Rng, std_dev: f64) -> f64 {
    let z: f64 = StandardNormal.sample(rng);
    z * std_dev
}

/// A waveform plus the state it carries between readings
#[derive(Debug, Clone)]
pub(crate) struct Channel {
    waveform: Waveform,
    hold_slot: Option<i64>,
    level: f64,
}

impl Channel {
    pub(crate) fn new(waveform: Waveform) -> Self {
        let level = match waveform {
            Waveform::RandomWalk { start, .. } => start,
            _ => 0.0,
        };
        Self {
            waveform,
            hold_slot: None,
            level,
        }
    }

    pub(crate) fn sample(&mut self, t: f64, rng: &mut ChaCha8Rng) -> f64 {
        match self.waveform {
            Waveform::RandomFlat {
                hold,
                scale,
                noise,
                offset,
            } => {
                let slot = (t / hold.max(f64::EPSILON)).floor() as i64;
                if self.hold_slot != Some(slot) {
                    self.hold_slot = Some(slot);
                    self.level = 2.0 * rng.random::<f64>() - 1.0;
                }
                self.level * scale + gaussian(rng, noise) + offset
            }
            Waveform::RandomWalk { step, .. } => {
                self.level += gaussian(rng, step);
                self.level
            }
            Waveform::ClippedTriangle {
                period,
                clip,
                scale,
                noise,
                offset,
            } => {
                let v = triangle(t, period).clamp(-clip, clip);
                v * scale + gaussian(rng, noise) + offset
            }
            Waveform::Sine {
                period,
                amplitude,
                noise,
                offset,
            } => {
                let v = (2.0 * std::f64::consts::PI * t / period).sin();
                v * amplitude + gaussian(rng, noise) + offset
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn test_triangle_shape() {
        assert_abs_diff_eq!(triangle(0.0, 50.0), -1.0);
        assert_abs_diff_eq!(triangle(12.5, 50.0), 0.0);
        assert_abs_diff_eq!(triangle(25.0, 50.0), 1.0);
        assert_abs_diff_eq!(triangle(37.5, 50.0), 0.0);
        // Negative time wraps around
        assert_abs_diff_eq!(triangle(-12.5, 50.0), 0.0);
    }

    #[test]
    fn test_random_flat_holds_level() {
        let mut channel = Channel::new(Waveform::RandomFlat {
            hold: 5.0,
            scale: 10.0,
            noise: 0.0,
            offset: 10.0,
        });
        let mut rng = rng();
        let a = channel.sample(0.0, &mut rng);
        let b = channel.sample(4.9, &mut rng);
        assert_eq!(a, b);
        assert!((0.0..20.0).contains(&a));
    }

    #[test]
    fn test_clipped_triangle_without_noise() {
        let mut channel = Channel::new(Waveform::ClippedTriangle {
            period: 50.0,
            clip: 0.5,
            scale: 10.0,
            noise: 0.0,
            offset: 1.0,
        });
        let mut rng = rng();
        // Clipped at +0.5 around the peak, scaled by 10, offset by 1
        assert_abs_diff_eq!(channel.sample(25.0, &mut rng), 6.0);
        assert_abs_diff_eq!(channel.sample(0.0, &mut rng), -4.0);
        assert_abs_diff_eq!(channel.sample(12.5, &mut rng), 1.0);
    }

    #[test]
    fn test_random_walk_starts_near_start() {
        let mut channel = Channel::new(Waveform::RandomWalk {
            step: 0.0,
            start: 1.0,
        });
        let mut rng = rng();
        assert_eq!(channel.sample(0.0, &mut rng), 1.0);
    }

    #[test]
    fn test_unknown_pv() {
        assert!(Waveform::for_pv("dummy_pv_9").is_none());
        for name in SIMULATED_PVS {
            assert!(Waveform::for_pv(name).is_some());
        }
    }
}
