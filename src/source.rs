use std::collections::{HashMap, VecDeque};

/// Boundary toward the control system that provides process values
///
/// The sampling clock calls `fetch` once per sampling source per tick.
/// `Ok(None)` means the read produced no value; an error is logged and
/// recorded as a gap as well. Neither stops the clock.
pub trait DataSource: Send {
    fn fetch(&mut self, name: &str, timestamp: f64) -> anyhow::Result<Option<f64>>;
}

impl<F> DataSource for F
where
    F: FnMut(&str, f64) -> anyhow::Result<Option<f64>> + Send,
{
    fn fetch(&mut self, name: &str, timestamp: f64) -> anyhow::Result<Option<f64>> {
        self(name, timestamp)
    }
}

/// Source that plays back prerecorded readings per name
///
/// Each fetch pops the next reading for that name; an exhausted or unknown
/// name yields a missing value.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    readings: HashMap<String, VecDeque<Option<f64>>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_readings<I>(mut self, name: &str, readings: I) -> Self
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        self.readings
            .entry(name.to_string())
            .or_default()
            .extend(readings);
        self
    }

    /// Readings not fetched yet for `name`
    pub fn remaining(&self, name: &str) -> usize {
        self.readings.get(name).map_or(0, |r| r.len())
    }
}

impl DataSource for ScriptedSource {
    fn fetch(&mut self, name: &str, _timestamp: f64) -> anyhow::Result<Option<f64>> {
        Ok(self
            .readings
            .get_mut(name)
            .and_then(|r| r.pop_front())
            .flatten())
    }
}
