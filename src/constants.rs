//! Application defaults shared by the configuration layer and the registry.

/// Palette handed out to new sources, in allocation order.
pub const DEFAULT_SOURCE_COLORS: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Default number of most recent samples kept per source.
pub const DEFAULT_RETENTION: usize = 1000;

/// Default sampling frequency in Hz.
pub const DEFAULT_SAMPLING_HZ: f64 = 1.0;

pub const DEFAULT_ROLLING_WINDOW: usize = 1;

/// Default EWM center of mass (alpha = 1, i.e. no smoothing).
pub const DEFAULT_EWM_COM: f64 = 0.0;

pub const DEFAULT_PHASE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_POINTS_PER_PHASE: usize = 8;

