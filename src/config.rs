//! Configuration for pvtrend sessions, sources and estimators.
//!
//! Everything here is runtime configuration: the core takes these values
//! through its API and validates them on the way in. A TOML session file can
//! describe the same settings for the binaries:
//!
//! ```toml
//! sampling = "20hz"
//! retention = 500
//!
//! [[sources]]
//! name = "dummy_pv_3"
//! color = "#d62728"
//!
//! [sources.rolling_window]
//! enabled = true
//! window = 7
//!
//! [sources.ewm]
//! enabled = true
//! halflife = 4.0
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_EWM_COM, DEFAULT_PHASE_THRESHOLD, DEFAULT_POINTS_PER_PHASE, DEFAULT_RETENTION,
    DEFAULT_ROLLING_WINDOW, DEFAULT_SAMPLING_HZ,
};
use crate::error::{Result, TrendError};
use crate::estimators::Variant;

/// Sampling frequency of the clock
///
/// Can be specified as either a frequency in Hz or a period in
/// milliseconds.
///
/// # Parsing formats
/// - `20` - frequency in Hz (no suffix)
/// - `20hz` or `20Hz` - frequency in Hz (explicit)
/// - `50ms` - period in milliseconds
///
/// # Example
/// ```
/// use pvtrend::config::SamplingFrequency;
///
/// let freq: SamplingFrequency = "50ms".parse().unwrap();
/// assert!((freq.as_hz() - 20.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "FrequencyValue")]
pub struct SamplingFrequency(f64);

impl SamplingFrequency {
    /// Create from frequency in Hz
    pub fn from_hz(hz: f64) -> Result<Self> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(TrendError::InvalidConfig(format!(
                "sampling frequency must be positive, got {hz}"
            )));
        }
        if Duration::try_from_secs_f64(1.0 / hz).is_err() {
            return Err(TrendError::InvalidConfig(format!(
                "sampling frequency {hz} Hz is too low"
            )));
        }
        Ok(Self(hz))
    }

    /// Create from period in milliseconds
    pub fn from_period_ms(ms: f64) -> Result<Self> {
        if !ms.is_finite() || ms <= 0.0 {
            return Err(TrendError::InvalidConfig(format!(
                "sampling period must be positive, got {ms}ms"
            )));
        }
        Self::from_hz(1000.0 / ms)
    }

    pub fn as_hz(&self) -> f64 {
        self.0
    }

    /// Time between two ticks
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.0)
    }
}

impl Default for SamplingFrequency {
    fn default() -> Self {
        Self(DEFAULT_SAMPLING_HZ)
    }
}

impl fmt::Display for SamplingFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}hz", self.0)
    }
}

impl FromStr for SamplingFrequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();

        if let Some(num) = s.strip_suffix("ms") {
            let ms: f64 = num
                .trim()
                .parse()
                .map_err(|_| format!("invalid period: {}", s))?;
            return Self::from_period_ms(ms).map_err(|e| e.to_string());
        }

        let num = s
            .strip_suffix("hz")
            .or_else(|| s.strip_suffix("Hz"))
            .or_else(|| s.strip_suffix("HZ"))
            .unwrap_or(s);

        let hz: f64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid frequency: {}", s))?;
        Self::from_hz(hz).map_err(|e| e.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FrequencyValue {
    Hz(f64),
    Text(String),
}

impl TryFrom<FrequencyValue> for SamplingFrequency {
    type Error = String;

    fn try_from(value: FrequencyValue) -> std::result::Result<Self, Self::Error> {
        match value {
            FrequencyValue::Hz(hz) => Self::from_hz(hz).map_err(|e| e.to_string()),
            FrequencyValue::Text(text) => text.parse(),
        }
    }
}

/// Display color as `#rrggbb`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 0xff,
        g: 0xff,
        b: 0xff,
    };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let hex = s
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| format!("color must start with '#': {}", s))?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(format!("color must be #rrggbb: {}", s));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| format!("invalid color: {}", s))
        };
        Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// Decay setting for the exponentially weighted mean
///
/// Exactly one form is given; all of them resolve to a smoothing factor
/// `alpha` in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EwmDecay {
    /// Smoothing factor directly, 0 < alpha <= 1
    Alpha(f64),
    /// Center of mass, alpha = 1 / (1 + com), com >= 0
    CenterOfMass(f64),
    /// Span, alpha = 2 / (span + 1), span >= 1
    Span(f64),
    /// Half-life in samples, alpha = 1 - exp(-ln(2) / halflife), halflife > 0
    HalfLife(f64),
}

impl EwmDecay {
    /// Resolve to the smoothing factor, validating the parameter's domain
    pub fn alpha(&self) -> Result<f64> {
        let invalid = |what: &str| Err(TrendError::InvalidConfig(what.to_string()));
        let alpha = match *self {
            Self::Alpha(a) => {
                if !(a > 0.0 && a <= 1.0) {
                    return invalid(&format!("alpha must be in (0, 1], got {a}"));
                }
                a
            }
            Self::CenterOfMass(com) => {
                if !(com >= 0.0 && com.is_finite()) {
                    return invalid(&format!("com must be >= 0, got {com}"));
                }
                1.0 / (1.0 + com)
            }
            Self::Span(span) => {
                if !(span >= 1.0 && span.is_finite()) {
                    return invalid(&format!("span must be >= 1, got {span}"));
                }
                2.0 / (span + 1.0)
            }
            Self::HalfLife(halflife) => {
                if !(halflife > 0.0 && halflife.is_finite()) {
                    return invalid(&format!("halflife must be > 0, got {halflife}"));
                }
                1.0 - (-std::f64::consts::LN_2 / halflife).exp()
            }
        };
        Ok(alpha)
    }
}

impl Default for EwmDecay {
    fn default() -> Self {
        Self::CenterOfMass(DEFAULT_EWM_COM)
    }
}

/// Variant-specific estimator parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EstimatorParams {
    Original,
    RollingWindow {
        window: usize,
    },
    ExponentialWeighted {
        decay: EwmDecay,
    },
    AdaptiveAverage {
        phase_threshold: f64,
        points_per_phase: usize,
    },
}

impl EstimatorParams {
    pub fn variant(&self) -> Variant {
        match self {
            Self::Original => Variant::Original,
            Self::RollingWindow { .. } => Variant::RollingWindow,
            Self::ExponentialWeighted { .. } => Variant::ExponentialWeighted,
            Self::AdaptiveAverage { .. } => Variant::AdaptiveAverage,
        }
    }

    /// Default parameters of a variant
    pub fn default_for(variant: Variant) -> Self {
        match variant {
            Variant::Original => Self::Original,
            Variant::RollingWindow => Self::RollingWindow {
                window: DEFAULT_ROLLING_WINDOW,
            },
            Variant::ExponentialWeighted => Self::ExponentialWeighted {
                decay: EwmDecay::default(),
            },
            Variant::AdaptiveAverage => Self::AdaptiveAverage {
                phase_threshold: DEFAULT_PHASE_THRESHOLD,
                points_per_phase: DEFAULT_POINTS_PER_PHASE,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Original => Ok(()),
            Self::RollingWindow { window } => {
                if window < 1 {
                    return Err(TrendError::InvalidConfig(
                        "rolling window size must be >= 1".into(),
                    ));
                }
                Ok(())
            }
            Self::ExponentialWeighted { decay } => decay.alpha().map(|_| ()),
            Self::AdaptiveAverage {
                phase_threshold,
                points_per_phase,
            } => {
                if !(phase_threshold > 0.0 && phase_threshold.is_finite()) {
                    return Err(TrendError::InvalidConfig(format!(
                        "phase threshold must be positive, got {phase_threshold}"
                    )));
                }
                if points_per_phase < 1 {
                    return Err(TrendError::InvalidConfig(
                        "points per phase must be >= 1".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Settings of one estimator variant for one source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    pub enabled: bool,
    /// Subplot the derived curve is drawn on
    pub subplot: u32,
    /// Curve color; `None` uses the source color
    pub color: Option<Color>,
    pub params: EstimatorParams,
}

impl EstimatorConfig {
    /// Default settings; only the raw series is plotted out of the box
    pub fn default_for(variant: Variant) -> Self {
        Self {
            enabled: variant == Variant::Original,
            subplot: 0,
            color: None,
            params: EstimatorParams::default_for(variant),
        }
    }

    pub fn enabled(params: EstimatorParams) -> Self {
        Self {
            enabled: true,
            subplot: 0,
            color: None,
            params,
        }
    }

    pub fn variant(&self) -> Variant {
        self.params.variant()
    }

    pub fn validate(&self) -> Result<()> {
        self.params.validate()
    }
}

/// One configuration per variant, always all four
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorSet {
    configs: [EstimatorConfig; Variant::COUNT],
}

impl EstimatorSet {
    pub fn get(&self, variant: Variant) -> &EstimatorConfig {
        &self.configs[variant.index()]
    }

    /// Replace the configuration of `config`'s variant
    pub fn set(&mut self, config: EstimatorConfig) {
        self.configs[config.variant().index()] = config;
    }

    pub fn with(mut self, config: EstimatorConfig) -> Self {
        self.set(config);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &EstimatorConfig> {
        self.configs.iter()
    }

    pub fn validate(&self) -> Result<()> {
        self.configs.iter().try_for_each(EstimatorConfig::validate)
    }
}

impl Default for EstimatorSet {
    fn default() -> Self {
        Self {
            configs: Variant::ALL.map(EstimatorConfig::default_for),
        }
    }
}

/// Definition of a source to add at session start
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    /// `None` takes the next free palette color
    pub color: Option<Color>,
    pub sampling: bool,
    pub estimators: EstimatorSet,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
            sampling: true,
            estimators: EstimatorSet::default(),
        }
    }
}

/// Whole-session configuration
///
/// Use `SessionConfig::default()` for the application defaults, or
/// `SessionConfig::load()` to read a TOML session file.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub sampling: SamplingFrequency,
    /// Number of most recent samples kept per source
    pub retention: usize,
    /// Replay buffered history through estimators rebuilt by a reconfigure
    pub replay_on_reconfigure: bool,
    pub sources: Vec<SourceConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingFrequency::default(),
            retention: DEFAULT_RETENTION,
            replay_on_reconfigure: true,
            sources: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: SessionFile =
            toml::from_str(text).map_err(|e| TrendError::Config(e.to_string()))?;
        let config = Self::try_from(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TrendError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        validate_retention(self.retention)?;
        for source in &self.sources {
            source.estimators.validate()?;
        }
        Ok(())
    }
}

pub fn validate_retention(retention: usize) -> Result<()> {
    if retention < 1 {
        return Err(TrendError::InvalidConfig(
            "retention must keep at least 1 sample".into(),
        ));
    }
    Ok(())
}

// On-disk shape of a session file. Each estimator section is flat so a file
// only names the fields it changes.

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionFile {
    sampling: Option<SamplingFrequency>,
    retention: Option<usize>,
    replay_on_reconfigure: Option<bool>,
    #[serde(default)]
    sources: Vec<SourceSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourceSection {
    name: String,
    color: Option<Color>,
    sampling: Option<bool>,
    original: Option<DisplaySection>,
    rolling_window: Option<RollingWindowSection>,
    ewm: Option<EwmSection>,
    adaptive: Option<AdaptiveSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DisplaySection {
    enabled: Option<bool>,
    subplot: Option<u32>,
    color: Option<Color>,
}

// Display keys are listed inline: deny_unknown_fields does not work through
// #[serde(flatten)]

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RollingWindowSection {
    enabled: Option<bool>,
    subplot: Option<u32>,
    color: Option<Color>,
    window: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EwmSection {
    enabled: Option<bool>,
    subplot: Option<u32>,
    color: Option<Color>,
    alpha: Option<f64>,
    com: Option<f64>,
    span: Option<f64>,
    halflife: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AdaptiveSection {
    enabled: Option<bool>,
    subplot: Option<u32>,
    color: Option<Color>,
    phase_threshold: Option<f64>,
    points_per_phase: Option<usize>,
}

macro_rules! display_keys {
    ($($section:ty),*) => {
        $(impl $section {
            fn display(&self) -> DisplaySection {
                DisplaySection {
                    enabled: self.enabled,
                    subplot: self.subplot,
                    color: self.color,
                }
            }
        })*
    };
}

display_keys!(RollingWindowSection, EwmSection, AdaptiveSection);

impl DisplaySection {
    fn apply(&self, config: &mut EstimatorConfig) {
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(subplot) = self.subplot {
            config.subplot = subplot;
        }
        if self.color.is_some() {
            config.color = self.color;
        }
    }
}

impl EwmSection {
    fn decay(&self) -> Result<Option<EwmDecay>> {
        let given = [
            self.alpha.map(EwmDecay::Alpha),
            self.com.map(EwmDecay::CenterOfMass),
            self.span.map(EwmDecay::Span),
            self.halflife.map(EwmDecay::HalfLife),
        ];
        let mut given = given.into_iter().flatten();
        let decay = given.next();
        if given.next().is_some() {
            return Err(TrendError::Config(
                "ewm takes only one of alpha, com, span or halflife".into(),
            ));
        }
        Ok(decay)
    }
}

impl TryFrom<SourceSection> for SourceConfig {
    type Error = TrendError;

    fn try_from(section: SourceSection) -> Result<Self> {
        let mut estimators = EstimatorSet::default();

        if let Some(original) = &section.original {
            let mut config = *estimators.get(Variant::Original);
            original.apply(&mut config);
            estimators.set(config);
        }

        if let Some(rw) = &section.rolling_window {
            let mut config = *estimators.get(Variant::RollingWindow);
            rw.display().apply(&mut config);
            if let Some(window) = rw.window {
                config.params = EstimatorParams::RollingWindow { window };
            }
            estimators.set(config);
        }

        if let Some(ewm) = &section.ewm {
            let mut config = *estimators.get(Variant::ExponentialWeighted);
            ewm.display().apply(&mut config);
            if let Some(decay) = ewm.decay()? {
                config.params = EstimatorParams::ExponentialWeighted { decay };
            }
            estimators.set(config);
        }

        if let Some(aa) = &section.adaptive {
            let mut config = *estimators.get(Variant::AdaptiveAverage);
            aa.display().apply(&mut config);
            if let EstimatorParams::AdaptiveAverage {
                phase_threshold,
                points_per_phase,
            } = config.params
            {
                config.params = EstimatorParams::AdaptiveAverage {
                    phase_threshold: aa.phase_threshold.unwrap_or(phase_threshold),
                    points_per_phase: aa.points_per_phase.unwrap_or(points_per_phase),
                };
            }
            estimators.set(config);
        }

        Ok(Self {
            name: section.name,
            color: section.color,
            sampling: section.sampling.unwrap_or(true),
            estimators,
        })
    }
}

impl TryFrom<SessionFile> for SessionConfig {
    type Error = TrendError;

    fn try_from(file: SessionFile) -> Result<Self> {
        let defaults = SessionConfig::default();
        let sources = file
            .sources
            .into_iter()
            .map(SourceConfig::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            sampling: file.sampling.unwrap_or(defaults.sampling),
            retention: file.retention.unwrap_or(defaults.retention),
            replay_on_reconfigure: file
                .replay_on_reconfigure
                .unwrap_or(defaults.replay_on_reconfigure),
            sources,
        })
    }
}
