use serde::Serialize;

use crate::buffer::RetentionBuffer;
use crate::config::{Color, EstimatorConfig, EstimatorSet, SourceConfig, validate_retention};
use crate::error::{Result, TrendError};
use crate::estimators::{DerivedSamples, Estimator, LineStyle, Variant};
use crate::sample::Sample;

/// State of one source: its retained samples and its estimators
///
/// The controller is the unit of locking: the registry wraps each one in a
/// mutex, so ingestion and reconfiguration of a source never interleave.
pub struct SeriesController {
    name: String,
    color: Color,
    sampling: bool,
    buffer: RetentionBuffer,
    configs: EstimatorSet,
    estimators: [Option<Estimator>; Variant::COUNT],
    history: [RetentionBuffer; Variant::COUNT],
    latest: DerivedSamples,
    replay_on_reconfigure: bool,
    gap_count: u64,
}

/// What a renderer needs to draw one curve
#[derive(Debug, Clone, Serialize)]
pub struct CurveSnapshot {
    pub variant: Variant,
    pub label: String,
    pub color: Color,
    pub subplot: u32,
    pub line_style: LineStyle,
    pub latest: Option<Sample>,
}

/// Point-in-time view of a source for the rendering layer
#[derive(Debug, Clone, Serialize)]
pub struct SeriesSnapshot {
    pub name: String,
    pub color: Color,
    pub sampling: bool,
    pub retained: usize,
    pub capacity: usize,
    pub gap_count: u64,
    pub curves: Vec<CurveSnapshot>,
}

impl SeriesController {
    /// Create a controller with default estimator settings
    pub fn new(name: impl Into<String>, color: Color, capacity: usize) -> Self {
        let name = name.into();
        let mut configs = EstimatorSet::default();
        let mut estimators: [Option<Estimator>; Variant::COUNT] = Default::default();
        for variant in Variant::ALL {
            let config = *configs.get(variant);
            if !config.enabled {
                continue;
            }
            match Estimator::new(&config.params, capacity) {
                Ok(estimator) => estimators[variant.index()] = Some(estimator),
                Err(e) => {
                    // Keep the config in step with the missing estimator
                    log::error!("{}: default {} estimator rejected: {}", name, variant.key(), e);
                    configs.set(EstimatorConfig {
                        enabled: false,
                        ..config
                    });
                }
            }
        }
        Self {
            name,
            color,
            sampling: true,
            buffer: RetentionBuffer::new(capacity),
            configs,
            estimators,
            history: Variant::ALL.map(|_| RetentionBuffer::new(capacity)),
            latest: DerivedSamples::default(),
            replay_on_reconfigure: true,
            gap_count: 0,
        }
    }

    /// Create a controller from a source definition
    pub fn from_config(
        config: &SourceConfig,
        color: Color,
        capacity: usize,
        replay_on_reconfigure: bool,
    ) -> Result<Self> {
        validate_retention(capacity)?;
        config.estimators.validate()?;

        let mut series = Self::new(config.name.clone(), color, capacity);
        series.sampling = config.sampling;
        series.replay_on_reconfigure = replay_on_reconfigure;
        for estimator in config.estimators.iter() {
            series.reconfigure(estimator.variant(), *estimator)?;
        }
        Ok(series)
    }

    /// Ingest one reading
    ///
    /// A missing or non-finite value is a gap: nothing is buffered, no
    /// estimator sees it, and the returned map is empty.
    ///
    /// # Returns
    /// The derived sample of every enabled estimator, by variant
    pub fn ingest(&mut self, value: Option<f64>, timestamp: f64) -> DerivedSamples {
        let Some(sample) = Sample::from_reading(timestamp, value) else {
            self.gap_count += 1;
            log::debug!("{}: gap at t={:.3}", self.name, timestamp);
            return DerivedSamples::default();
        };

        self.buffer.append(sample);

        let mut derived = DerivedSamples::default();
        for variant in Variant::ALL {
            let i = variant.index();
            if let Some(estimator) = self.estimators[i].as_mut() {
                let output = estimator.update(&sample);
                if let Some(output) = output {
                    self.history[i].append(output);
                    self.latest.set(variant, Some(output));
                }
                derived.set(variant, output);
            }
        }
        derived
    }

    /// Replace one variant's configuration
    ///
    /// A parameter change, or switching the variant on, builds a fresh
    /// estimator. With replay enabled the retained samples are fed through
    /// it so its history matches the new parameters from the start of the
    /// buffer. Switching a variant off drops its state. Display-only changes
    /// (color, subplot) keep the running state.
    ///
    /// Nothing changes if the configuration is invalid.
    pub fn reconfigure(&mut self, variant: Variant, config: EstimatorConfig) -> Result<()> {
        if config.variant() != variant {
            return Err(TrendError::InvalidConfig(format!(
                "{:?} parameters given for {:?}",
                config.variant(),
                variant
            )));
        }
        config.validate()?;

        let i = variant.index();
        let previous = *self.configs.get(variant);

        if !config.enabled {
            self.estimators[i] = None;
            self.history[i].clear();
            self.latest.set(variant, None);
        } else if !previous.enabled
            || previous.params != config.params
            || self.estimators[i].is_none()
        {
            let mut estimator = Estimator::new(&config.params, self.buffer.capacity())?;
            self.history[i].clear();
            self.latest.set(variant, None);
            if self.replay_on_reconfigure {
                let snapshot = self.buffer.snapshot();
                for output in estimator.replay(&snapshot) {
                    self.history[i].append(output);
                }
                self.latest.set(variant, self.history[i].last().copied());
                log::debug!(
                    "{}: rebuilt {:?} over {} retained samples",
                    self.name,
                    variant,
                    snapshot.len()
                );
            }
            self.estimators[i] = Some(estimator);
        }

        self.configs.set(config);
        Ok(())
    }

    /// Switch a variant on or off, keeping its other settings
    pub fn set_enabled(&mut self, variant: Variant, enabled: bool) -> Result<()> {
        let mut config = *self.configs.get(variant);
        config.enabled = enabled;
        self.reconfigure(variant, config)
    }

    /// Change how many recent samples are retained
    ///
    /// Truncates the buffer and the derived histories from the front. The
    /// estimators keep their state, except that a rolling window larger
    /// than the new capacity is trimmed to it.
    pub fn set_retention_capacity(&mut self, capacity: usize) -> Result<()> {
        validate_retention(capacity)?;
        let dropped = self.buffer.resize(capacity);
        for history in self.history.iter_mut() {
            history.resize(capacity);
        }
        for estimator in self.estimators.iter_mut().flatten() {
            estimator.set_capacity(capacity);
        }
        if dropped > 0 {
            log::debug!("{}: retention {} dropped {} samples", self.name, capacity, dropped);
        }
        Ok(())
    }

    /// Discard all retained samples and restart every estimator
    pub fn clear(&mut self) {
        self.buffer.clear();
        for history in self.history.iter_mut() {
            history.clear();
        }
        for estimator in self.estimators.iter_mut().flatten() {
            estimator.reset();
        }
        self.latest = DerivedSamples::default();
        self.gap_count = 0;
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn sampling(&self) -> bool {
        self.sampling
    }

    pub fn set_sampling(&mut self, sampling: bool) {
        self.sampling = sampling;
    }

    pub fn replay_on_reconfigure(&self) -> bool {
        self.replay_on_reconfigure
    }

    pub fn set_replay_on_reconfigure(&mut self, replay: bool) {
        self.replay_on_reconfigure = replay;
    }

    pub fn config(&self, variant: Variant) -> &EstimatorConfig {
        self.configs.get(variant)
    }

    pub fn configs(&self) -> &EstimatorSet {
        &self.configs
    }

    pub fn buffer(&self) -> &RetentionBuffer {
        &self.buffer
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Most recent output of each enabled variant
    pub fn latest(&self) -> DerivedSamples {
        self.latest
    }

    /// Retained outputs of a variant, oldest first; empty while disabled
    pub fn history(&self, variant: Variant) -> Vec<Sample> {
        self.history[variant.index()].snapshot()
    }

    /// Number of missing readings since creation or the last clear
    pub fn gap_count(&self) -> u64 {
        self.gap_count
    }

    /// Color a variant's curve is drawn in
    pub fn curve_color(&self, variant: Variant) -> Color {
        self.configs.get(variant).color.unwrap_or(self.color)
    }

    pub fn snapshot(&self) -> SeriesSnapshot {
        let curves = self
            .configs
            .iter()
            .filter(|c| c.enabled)
            .map(|c| {
                let variant = c.variant();
                CurveSnapshot {
                    variant,
                    label: variant.curve_label(&self.name),
                    color: self.curve_color(variant),
                    subplot: c.subplot,
                    line_style: variant.line_style(),
                    latest: self.latest.get(variant),
                }
            })
            .collect();

        SeriesSnapshot {
            name: self.name.clone(),
            color: self.color,
            sampling: self.sampling,
            retained: self.buffer.len(),
            capacity: self.buffer.capacity(),
            gap_count: self.gap_count,
            curves,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EstimatorParams, EwmDecay};

    fn controller(capacity: usize) -> SeriesController {
        SeriesController::new("pv", Color::rgb(1, 2, 3), capacity)
    }

    fn values(samples: &[Sample]) -> Vec<f64> {
        samples.iter().map(|s| s.value).collect()
    }

    #[test]
    fn test_default_only_original_runs() {
        let mut series = controller(10);
        let derived = series.ingest(Some(4.0), 0.0);
        assert_eq!(derived.get(Variant::Original), Some(Sample::new(0.0, 4.0)));
        assert!(derived.get(Variant::RollingWindow).is_none());
        assert!(derived.get(Variant::ExponentialWeighted).is_none());
        assert!(derived.get(Variant::AdaptiveAverage).is_none());
    }

    #[test]
    fn test_new_builds_every_default_enabled_estimator() {
        let defaults = EstimatorSet::default();
        assert!(defaults.validate().is_ok());

        let mut series = controller(10);
        assert_eq!(series.configs(), &defaults);
        let derived = series.ingest(Some(4.0), 0.0);
        for variant in Variant::ALL {
            assert_eq!(
                derived.get(variant).is_some(),
                defaults.get(variant).enabled,
                "{variant:?}"
            );
        }

        // Default parameters of the variants that start disabled build too
        for variant in Variant::ALL {
            let params = EstimatorParams::default_for(variant);
            assert!(Estimator::new(&params, 10).is_ok(), "{variant:?}");
        }
    }

    #[test]
    fn test_gap_is_skipped() {
        let mut series = controller(10);
        series
            .reconfigure(
                Variant::AdaptiveAverage,
                EstimatorConfig::enabled(EstimatorParams::AdaptiveAverage {
                    phase_threshold: 1.0,
                    points_per_phase: 4,
                }),
            )
            .unwrap();

        series.ingest(Some(5.0), 0.0);
        let derived = series.ingest(None, 1.0);
        assert!(derived.is_empty());
        let derived = series.ingest(Some(f64::NAN), 2.0);
        assert!(derived.is_empty());

        // The gap is neither a zero nor a jump
        let derived = series.ingest(Some(5.5), 3.0);
        assert_eq!(
            derived.get(Variant::AdaptiveAverage).map(|s| s.value),
            Some(5.25)
        );
        assert_eq!(series.buffer().len(), 2);
        assert_eq!(series.gap_count(), 2);
        assert_eq!(
            series.latest().get(Variant::Original),
            Some(Sample::new(3.0, 5.5))
        );
    }

    #[test]
    fn test_reconfigure_rejects_mismatched_variant() {
        let mut series = controller(10);
        let result = series.reconfigure(
            Variant::RollingWindow,
            EstimatorConfig::enabled(EstimatorParams::Original),
        );
        assert!(matches!(result, Err(TrendError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_reconfigure_keeps_prior_config() {
        let mut series = controller(10);
        let good = EstimatorConfig::enabled(EstimatorParams::RollingWindow { window: 2 });
        series.reconfigure(Variant::RollingWindow, good).unwrap();
        series.ingest(Some(1.0), 0.0);
        series.ingest(Some(3.0), 1.0);

        let bad = EstimatorConfig::enabled(EstimatorParams::RollingWindow { window: 0 });
        assert!(series.reconfigure(Variant::RollingWindow, bad).is_err());
        assert_eq!(*series.config(Variant::RollingWindow), good);

        let derived = series.ingest(Some(5.0), 2.0);
        assert_eq!(
            derived.get(Variant::RollingWindow).map(|s| s.value),
            Some(4.0)
        );
    }

    #[test]
    fn test_enable_replays_buffer() {
        let mut series = controller(10);
        for (t, v) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            series.ingest(Some(*v), t as f64);
        }

        series
            .reconfigure(
                Variant::RollingWindow,
                EstimatorConfig::enabled(EstimatorParams::RollingWindow { window: 2 }),
            )
            .unwrap();

        assert_eq!(
            values(&series.history(Variant::RollingWindow)),
            vec![1.0, 1.5, 2.5, 3.5]
        );
        assert_eq!(
            series.latest().get(Variant::RollingWindow),
            Some(Sample::new(3.0, 3.5))
        );
    }

    #[test]
    fn test_enable_without_replay_starts_empty() {
        let mut series = controller(10);
        series.set_replay_on_reconfigure(false);
        series.ingest(Some(10.0), 0.0);
        series.ingest(Some(20.0), 1.0);

        series
            .reconfigure(
                Variant::ExponentialWeighted,
                EstimatorConfig::enabled(EstimatorParams::ExponentialWeighted {
                    decay: EwmDecay::Alpha(0.5),
                }),
            )
            .unwrap();
        assert!(series.history(Variant::ExponentialWeighted).is_empty());

        let derived = series.ingest(Some(30.0), 2.0);
        assert_eq!(
            derived.get(Variant::ExponentialWeighted).map(|s| s.value),
            Some(30.0)
        );
    }

    #[test]
    fn test_display_change_keeps_state() {
        let mut series = controller(10);
        let mut config = EstimatorConfig::enabled(EstimatorParams::ExponentialWeighted {
            decay: EwmDecay::Alpha(0.5),
        });
        series
            .reconfigure(Variant::ExponentialWeighted, config)
            .unwrap();
        series.ingest(Some(0.0), 0.0);

        config.subplot = 2;
        config.color = Some(Color::rgb(9, 9, 9));
        series.set_replay_on_reconfigure(false);
        series
            .reconfigure(Variant::ExponentialWeighted, config)
            .unwrap();

        let derived = series.ingest(Some(8.0), 1.0);
        assert_eq!(
            derived.get(Variant::ExponentialWeighted).map(|s| s.value),
            Some(4.0)
        );
        assert_eq!(
            series.curve_color(Variant::ExponentialWeighted),
            Color::rgb(9, 9, 9)
        );
        assert_eq!(series.curve_color(Variant::Original), Color::rgb(1, 2, 3));
    }

    #[test]
    fn test_disable_drops_state() {
        let mut series = controller(10);
        series.set_replay_on_reconfigure(false);
        series
            .reconfigure(
                Variant::AdaptiveAverage,
                EstimatorConfig::enabled(EstimatorParams::AdaptiveAverage {
                    phase_threshold: 100.0,
                    points_per_phase: 8,
                }),
            )
            .unwrap();
        series.ingest(Some(2.0), 0.0);
        series.ingest(Some(4.0), 1.0);

        series.set_enabled(Variant::AdaptiveAverage, false).unwrap();
        assert!(series.latest().get(Variant::AdaptiveAverage).is_none());
        assert!(series.history(Variant::AdaptiveAverage).is_empty());

        series.set_enabled(Variant::AdaptiveAverage, true).unwrap();
        let derived = series.ingest(Some(9.0), 2.0);
        assert_eq!(
            derived.get(Variant::AdaptiveAverage).map(|s| s.value),
            Some(9.0)
        );
    }

    #[test]
    fn test_retention_shrink() {
        let mut series = controller(10);
        series
            .reconfigure(
                Variant::RollingWindow,
                EstimatorConfig::enabled(EstimatorParams::RollingWindow { window: 5 }),
            )
            .unwrap();
        for i in 0..8 {
            series.ingest(Some(i as f64), i as f64);
        }

        series.set_retention_capacity(3).unwrap();
        assert_eq!(series.buffer().len(), 3);
        assert_eq!(series.history(Variant::RollingWindow).len(), 3);

        // Effective window is now 3: (6 + 7 + 8) / 3
        let derived = series.ingest(Some(8.0), 8.0);
        assert_eq!(
            derived.get(Variant::RollingWindow).map(|s| s.value),
            Some(7.0)
        );

        assert!(series.set_retention_capacity(0).is_err());
        assert_eq!(series.capacity(), 3);
    }

    #[test]
    fn test_clear_restarts_everything() {
        let mut series = controller(5);
        series.ingest(Some(1.0), 0.0);
        series.ingest(None, 1.0);
        series.clear();
        assert!(series.buffer().is_empty());
        assert!(series.latest().is_empty());
        assert_eq!(series.gap_count(), 0);
    }

    #[test]
    fn test_snapshot_lists_enabled_curves() {
        let mut series = controller(5);
        series
            .reconfigure(
                Variant::RollingWindow,
                EstimatorConfig {
                    enabled: true,
                    subplot: 1,
                    color: None,
                    params: EstimatorParams::RollingWindow { window: 3 },
                },
            )
            .unwrap();
        series.ingest(Some(2.0), 0.5);

        let snapshot = series.snapshot();
        assert_eq!(snapshot.curves.len(), 2);
        assert_eq!(snapshot.curves[1].label, "pv Rolling-Window");
        assert_eq!(snapshot.curves[1].subplot, 1);
        assert_eq!(snapshot.curves[1].line_style, LineStyle::Dash);
        assert_eq!(snapshot.curves[1].latest, Some(Sample::new(0.5, 2.0)));
        assert_eq!(snapshot.retained, 1);
    }

    #[test]
    fn test_from_config() {
        let mut source = SourceConfig::new("dummy_pv_2");
        source.sampling = false;
        source.estimators.set(EstimatorConfig::enabled(
            EstimatorParams::ExponentialWeighted {
                decay: EwmDecay::Span(3.0),
            },
        ));

        let series = SeriesController::from_config(&source, Color::WHITE, 20, true).unwrap();
        assert_eq!(series.name(), "dummy_pv_2");
        assert!(!series.sampling());
        assert!(series.config(Variant::ExponentialWeighted).enabled);
        assert_eq!(series.capacity(), 20);

        assert!(SeriesController::from_config(&source, Color::WHITE, 0, true).is_err());
    }
}
