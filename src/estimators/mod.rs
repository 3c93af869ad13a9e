mod adaptive_mean;
mod exponential_mean;
mod passthrough;
mod rolling_mean;

pub use adaptive_mean::AdaptiveMean;
pub use exponential_mean::ExponentialMean;
pub use passthrough::Passthrough;
pub use rolling_mean::RollingMean;

use serde::Serialize;

use crate::config::EstimatorParams;
use crate::error::Result;
use crate::sample::Sample;

/// The derived views computed for every source
///
/// Declaration order is the order estimators run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Raw samples, unchanged
    Original,
    /// Arithmetic mean of the last W samples
    RollingWindow,
    /// Exponentially weighted mean
    ExponentialWeighted,
    /// Phase-segmented mean that restarts on jumps
    AdaptiveAverage,
}

/// Pen style a renderer uses for a variant's curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    Solid,
    Dash,
    Dot,
    DashDot,
}

impl Variant {
    pub const COUNT: usize = 4;

    pub const ALL: [Variant; Variant::COUNT] = [
        Variant::Original,
        Variant::RollingWindow,
        Variant::ExponentialWeighted,
        Variant::AdaptiveAverage,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Original => 0,
            Self::RollingWindow => 1,
            Self::ExponentialWeighted => 2,
            Self::AdaptiveAverage => 3,
        }
    }

    /// Short identifier used in tabular output
    pub fn key(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::RollingWindow => "rolling_window",
            Self::ExponentialWeighted => "ewm",
            Self::AdaptiveAverage => "adaptive",
        }
    }

    /// Label of this variant's curve for a source
    pub fn curve_label(self, source: &str) -> String {
        match self {
            Self::Original => source.to_string(),
            Self::RollingWindow => format!("{source} Rolling-Window"),
            Self::ExponentialWeighted => format!("{source} Exponentially Weighted"),
            Self::AdaptiveAverage => format!("{source} Adaptive Average"),
        }
    }

    pub fn line_style(self) -> LineStyle {
        match self {
            Self::Original => LineStyle::Solid,
            Self::RollingWindow => LineStyle::Dash,
            Self::ExponentialWeighted => LineStyle::Dot,
            Self::AdaptiveAverage => LineStyle::DashDot,
        }
    }
}

/// Incremental estimator, one variant per derived view
///
/// Each instance owns its state exclusively. A configuration change builds
/// a fresh instance instead of adjusting the old state.
#[derive(Debug, Clone)]
pub enum Estimator {
    Original(Passthrough),
    RollingWindow(RollingMean),
    ExponentialWeighted(ExponentialMean),
    AdaptiveAverage(AdaptiveMean),
}

impl Estimator {
    /// Build an estimator in its initial state
    ///
    /// # Arguments
    /// * `params` - Variant and its parameters
    /// * `capacity` - Retention capacity of the owning source; caps the
    ///   rolling window
    pub fn new(params: &EstimatorParams, capacity: usize) -> Result<Self> {
        params.validate()?;
        let estimator = match *params {
            EstimatorParams::Original => Self::Original(Passthrough),
            EstimatorParams::RollingWindow { window } => {
                Self::RollingWindow(RollingMean::new(window, capacity))
            }
            EstimatorParams::ExponentialWeighted { decay } => {
                Self::ExponentialWeighted(ExponentialMean::new(decay.alpha()?))
            }
            EstimatorParams::AdaptiveAverage {
                phase_threshold,
                points_per_phase,
            } => Self::AdaptiveAverage(AdaptiveMean::new(phase_threshold, points_per_phase)),
        };
        Ok(estimator)
    }

    pub fn variant(&self) -> Variant {
        match self {
            Self::Original(_) => Variant::Original,
            Self::RollingWindow(_) => Variant::RollingWindow,
            Self::ExponentialWeighted(_) => Variant::ExponentialWeighted,
            Self::AdaptiveAverage(_) => Variant::AdaptiveAverage,
        }
    }

    /// Feed one sample and return the derived sample, if any
    ///
    /// The derived sample carries the input's timestamp. All current
    /// variants emit from their first sample on.
    pub fn update(&mut self, sample: &Sample) -> Option<Sample> {
        let value = match self {
            Self::Original(e) => e.update(sample.value),
            Self::RollingWindow(e) => e.update(sample.value),
            Self::ExponentialWeighted(e) => e.update(sample.value),
            Self::AdaptiveAverage(e) => e.update(sample.value),
        };
        Some(sample.with_value(value))
    }

    /// Feed a chronological run of samples, collecting every output
    pub fn replay(&mut self, samples: &[Sample]) -> Vec<Sample> {
        samples.iter().filter_map(|s| self.update(s)).collect()
    }

    /// Track a change of the owning source's retention capacity
    pub fn set_capacity(&mut self, capacity: usize) {
        if let Self::RollingWindow(e) = self {
            e.set_capacity(capacity);
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::Original(_) => {}
            Self::RollingWindow(e) => e.reset(),
            Self::ExponentialWeighted(e) => e.reset(),
            Self::AdaptiveAverage(e) => e.reset(),
        }
    }
}

/// One optional output per variant, for a single tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedSamples([Option<Sample>; Variant::COUNT]);

impl DerivedSamples {
    pub fn get(&self, variant: Variant) -> Option<Sample> {
        self.0[variant.index()]
    }

    pub fn set(&mut self, variant: Variant, sample: Option<Sample>) {
        self.0[variant.index()] = sample;
    }

    /// Variants that produced output, in estimator order
    pub fn iter(&self) -> impl Iterator<Item = (Variant, Sample)> + '_ {
        Variant::ALL
            .into_iter()
            .filter_map(|v| self.get(v).map(|s| (v, s)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EwmDecay;

    fn feed(estimator: &mut Estimator, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| estimator.update(&Sample::new(i as f64, v)))
            .map(|s| s.value)
            .collect()
    }

    #[test]
    fn test_variant_order_and_index() {
        for (i, variant) in Variant::ALL.iter().enumerate() {
            assert_eq!(variant.index(), i);
        }
    }

    #[test]
    fn test_curve_labels() {
        assert_eq!(Variant::Original.curve_label("pv"), "pv");
        assert_eq!(
            Variant::RollingWindow.curve_label("pv"),
            "pv Rolling-Window"
        );
        assert_eq!(
            Variant::AdaptiveAverage.curve_label("pv"),
            "pv Adaptive Average"
        );
    }

    #[test]
    fn test_new_rejects_invalid_params() {
        assert!(Estimator::new(&EstimatorParams::RollingWindow { window: 0 }, 10).is_err());
        assert!(
            Estimator::new(
                &EstimatorParams::ExponentialWeighted {
                    decay: EwmDecay::Alpha(0.0)
                },
                10
            )
            .is_err()
        );
    }

    #[test]
    fn test_update_keeps_timestamp() {
        let mut estimator =
            Estimator::new(&EstimatorParams::RollingWindow { window: 2 }, 10).unwrap();
        estimator.update(&Sample::new(0.5, 1.0));
        let out = estimator.update(&Sample::new(1.5, 3.0)).unwrap();
        assert_eq!(out, Sample::new(1.5, 2.0));
    }

    #[test]
    fn test_original_is_passthrough() {
        let mut estimator = Estimator::new(&EstimatorParams::Original, 10).unwrap();
        let input = Sample::new(3.0, -7.25);
        assert_eq!(estimator.update(&input), Some(input));
    }

    #[test]
    fn test_reset_restarts_state() {
        let mut estimator = Estimator::new(
            &EstimatorParams::AdaptiveAverage {
                phase_threshold: 10.0,
                points_per_phase: 4,
            },
            10,
        )
        .unwrap();
        feed(&mut estimator, &[1.0, 2.0, 3.0]);
        estimator.reset();
        assert_eq!(feed(&mut estimator, &[5.0]), vec![5.0]);
    }

    #[test]
    fn test_replay_matches_live_updates() {
        let params = EstimatorParams::ExponentialWeighted {
            decay: EwmDecay::Alpha(0.3),
        };
        let samples: Vec<Sample> = (0..20)
            .map(|i| Sample::new(i as f64, (i as f64 * 0.7).sin()))
            .collect();

        let mut live = Estimator::new(&params, 100).unwrap();
        let live_out: Vec<Sample> = samples.iter().filter_map(|s| live.update(s)).collect();

        let mut replayed = Estimator::new(&params, 100).unwrap();
        assert_eq!(replayed.replay(&samples), live_out);
    }

    #[test]
    fn test_derived_samples_iter_in_order() {
        let mut derived = DerivedSamples::default();
        assert!(derived.is_empty());
        derived.set(Variant::AdaptiveAverage, Some(Sample::new(0.0, 2.0)));
        derived.set(Variant::Original, Some(Sample::new(0.0, 1.0)));

        let variants: Vec<Variant> = derived.iter().map(|(v, _)| v).collect();
        assert_eq!(variants, vec![Variant::Original, Variant::AdaptiveAverage]);
        assert!(derived.get(Variant::RollingWindow).is_none());
    }
}
