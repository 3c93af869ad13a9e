pub mod generate;

pub use generate::{noisy, ramp, step, with_gaps};
