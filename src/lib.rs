pub mod buffer;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod estimators;
pub mod output;
pub mod registry;
pub mod sample;
pub mod series;
pub mod source;

#[cfg(feature = "simulation")]
pub mod simulation;

pub use buffer::RetentionBuffer;
pub use clock::{SamplingClock, TickReport};
pub use config::{
    Color, EstimatorConfig, EstimatorParams, EwmDecay, SamplingFrequency, SessionConfig,
    SourceConfig,
};
pub use error::{Result, TrendError};
pub use estimators::{DerivedSamples, Estimator, Variant};
pub use registry::{SourceRegistry, SourceUpdate};
pub use sample::Sample;
pub use series::{SeriesController, SeriesSnapshot};
pub use source::DataSource;
