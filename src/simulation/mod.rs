//! Simulated process variables for demos and tests

mod waveform;

use std::collections::HashMap;

use rand::RngExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::source::DataSource;

pub use waveform::{SIMULATED_PVS, Waveform, triangle};

use waveform::Channel;

/// `DataSource` producing synthetic readings
///
/// Knows the built-in `dummy_pv_*` names plus any waveform registered with
/// `with_waveform`. Fetching any other name is an error.
pub struct SimulatedSource {
    waveforms: HashMap<String, Waveform>,
    channels: HashMap<String, Channel>,
    rng: ChaCha8Rng,
    dropout: f64,
}

fn create_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => rand::make_rng(),
    }
}

impl SimulatedSource {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            waveforms: HashMap::new(),
            channels: HashMap::new(),
            rng: create_rng(seed),
            dropout: 0.0,
        }
    }

    /// Probability in [0, 1] that a reading comes back missing
    pub fn with_dropout(mut self, probability: f64) -> Self {
        self.dropout = probability.clamp(0.0, 1.0);
        self
    }

    /// Register an extra PV, or override a built-in one
    pub fn with_waveform(mut self, name: &str, waveform: Waveform) -> Self {
        self.channels.remove(name);
        self.waveforms.insert(name.to_string(), waveform);
        self
    }

    pub fn knows(&self, name: &str) -> bool {
        self.waveforms.contains_key(name) || Waveform::for_pv(name).is_some()
    }
}

impl DataSource for SimulatedSource {
    fn fetch(&mut self, name: &str, timestamp: f64) -> anyhow::Result<Option<f64>> {
        if !self.channels.contains_key(name) {
            let waveform = self
                .waveforms
                .get(name)
                .copied()
                .or_else(|| Waveform::for_pv(name))
                .ok_or_else(|| anyhow::anyhow!("PV {name} was not found"))?;
            self.channels.insert(name.to_string(), Channel::new(waveform));
        }

        if self.dropout > 0.0 && self.rng.random::<f64>() < self.dropout {
            return Ok(None);
        }

        let Some(channel) = self.channels.get_mut(name) else {
            return Ok(None);
        };
        Ok(Some(channel.sample(timestamp, &mut self.rng)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(source: &mut SimulatedSource, name: &str, n: usize) -> Vec<Option<f64>> {
        (0..n)
            .map(|i| source.fetch(name, i as f64).unwrap())
            .collect()
    }

    #[test]
    fn test_seeded_reproducibility() {
        let mut a = SimulatedSource::new(Some(42));
        let mut b = SimulatedSource::new(Some(42));
        for name in SIMULATED_PVS {
            assert_eq!(readings(&mut a, name, 20), readings(&mut b, name, 20));
        }
    }

    #[test]
    fn test_unknown_name_is_error() {
        let mut source = SimulatedSource::new(Some(1));
        assert!(!source.knows("nope"));
        assert!(source.fetch("nope", 0.0).is_err());
    }

    #[test]
    fn test_dropout() {
        let mut always = SimulatedSource::new(Some(3)).with_dropout(1.0);
        assert!(readings(&mut always, "dummy_pv_3", 10).iter().all(|r| r.is_none()));

        let mut never = SimulatedSource::new(Some(3));
        assert!(readings(&mut never, "dummy_pv_3", 10).iter().all(|r| r.is_some()));
    }

    #[test]
    fn test_custom_waveform() {
        let mut source = SimulatedSource::new(Some(5)).with_waveform(
            "flat",
            Waveform::Sine {
                period: 10.0,
                amplitude: 0.0,
                noise: 0.0,
                offset: 2.5,
            },
        );
        assert!(source.knows("flat"));
        assert_eq!(source.fetch("flat", 3.0).unwrap(), Some(2.5));
    }

    #[test]
    fn test_custom_waveform_overrides_builtin() {
        let flat = Waveform::Sine {
            period: 1.0,
            amplitude: 0.0,
            noise: 0.0,
            offset: -4.0,
        };
        let mut source = SimulatedSource::new(Some(5)).with_waveform("dummy_pv_0", flat);
        for t in [0.0, 7.5, 12.0] {
            assert_eq!(source.fetch("dummy_pv_0", t).unwrap(), Some(-4.0));
        }
    }
}
