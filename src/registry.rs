use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;

use crate::config::{
    Color, EstimatorConfig, SessionConfig, SourceConfig, validate_retention,
};
use crate::constants::{DEFAULT_RETENTION, DEFAULT_SOURCE_COLORS};
use crate::error::{Result, TrendError};
use crate::estimators::{DerivedSamples, Variant};
use crate::series::{SeriesController, SeriesSnapshot};
use crate::source::DataSource;

type SharedSeries = Arc<Mutex<SeriesController>>;

struct SourceEntry {
    name: String,
    series: SharedSeries,
}

struct Inner {
    entries: Vec<SourceEntry>,
    retention: usize,
    replay_on_reconfigure: bool,
}

/// Result of sampling one source during a tick
#[derive(Debug, Clone, Serialize)]
pub struct SourceUpdate {
    pub name: String,
    /// Raw reading; `None` for a gap
    pub value: Option<f64>,
    #[serde(skip)]
    pub derived: DerivedSamples,
}

/// The set of active sources of a session
///
/// Every source is a `SeriesController` behind its own mutex, so work on
/// different sources proceeds in parallel while operations on one source
/// are serialized. The list itself sits behind an `RwLock` that is only
/// held to look sources up, add, remove or rename them; no source lock is
/// ever waited on while the list is read-locked for a tick.
pub struct SourceRegistry {
    inner: RwLock<Inner>,
}

fn lock(series: &SharedSeries) -> MutexGuard<'_, SeriesController> {
    series.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SourceRegistry {
    pub fn new(retention: usize) -> Result<Self> {
        validate_retention(retention)?;
        Ok(Self {
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                retention,
                replay_on_reconfigure: true,
            }),
        })
    }

    /// Build a registry holding the session's sources
    pub fn from_session(session: &SessionConfig) -> Result<Self> {
        session.validate()?;
        let registry = Self::new(session.retention)?;
        registry.set_replay_on_reconfigure(session.replay_on_reconfigure);
        for source in &session.sources {
            registry.add_configured(source)?;
        }
        Ok(registry)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn find(&self, name: &str) -> Result<SharedSeries> {
        self.read()
            .entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| Arc::clone(&e.series))
            .ok_or_else(|| TrendError::UnknownSource(name.to_string()))
    }

    /// Run `f` on one source while holding its lock
    pub fn with_source<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut SeriesController) -> R,
    ) -> Result<R> {
        let series = self.find(name)?;
        let mut guard = lock(&series);
        Ok(f(&mut guard))
    }

    /// Add a source with default estimator settings
    ///
    /// Without a color, the next free palette color is assigned.
    pub fn add_source(&self, name: &str, color: Option<Color>) -> Result<()> {
        self.add_configured(&SourceConfig {
            color,
            ..SourceConfig::new(name)
        })
    }

    /// Add a source from a full definition
    pub fn add_configured(&self, source: &SourceConfig) -> Result<()> {
        if source.name.trim().is_empty() {
            return Err(TrendError::InvalidConfig(
                "source name must not be empty".into(),
            ));
        }

        let mut inner = self.write();
        if inner.entries.iter().any(|e| e.name == source.name) {
            return Err(TrendError::DuplicateName(source.name.clone()));
        }

        let color = match source.color {
            Some(color) => color,
            None => next_palette_color(&inner.entries),
        };
        let series = SeriesController::from_config(
            source,
            color,
            inner.retention,
            inner.replay_on_reconfigure,
        )?;

        log::info!("Added source {} ({})", source.name, color);
        inner.entries.push(SourceEntry {
            name: source.name.clone(),
            series: Arc::new(Mutex::new(series)),
        });
        Ok(())
    }

    pub fn remove_source(&self, name: &str) -> Result<()> {
        let mut inner = self.write();
        let index = inner
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| TrendError::UnknownSource(name.to_string()))?;
        inner.entries.remove(index);
        log::info!("Removed source {}", name);
        Ok(())
    }

    /// Rename a source, keeping its data and estimator state
    pub fn rename(&self, name: &str, new_name: &str) -> Result<()> {
        if new_name.trim().is_empty() {
            return Err(TrendError::InvalidConfig(
                "source name must not be empty".into(),
            ));
        }

        let mut inner = self.write();
        let index = inner
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| TrendError::UnknownSource(name.to_string()))?;
        if name == new_name {
            return Ok(());
        }
        if inner.entries.iter().any(|e| e.name == new_name) {
            return Err(TrendError::DuplicateName(new_name.to_string()));
        }

        let entry = &mut inner.entries[index];
        lock(&entry.series).set_name(new_name.to_string());
        entry.name = new_name.to_string();
        log::info!("Renamed source {} to {}", name, new_name);
        Ok(())
    }

    pub fn ingest(&self, name: &str, value: Option<f64>, timestamp: f64) -> Result<DerivedSamples> {
        self.with_source(name, |s| s.ingest(value, timestamp))
    }

    pub fn reconfigure(&self, name: &str, variant: Variant, config: EstimatorConfig) -> Result<()> {
        self.with_source(name, |s| s.reconfigure(variant, config))?
    }

    pub fn set_retention_capacity(&self, name: &str, capacity: usize) -> Result<()> {
        self.with_source(name, |s| s.set_retention_capacity(capacity))?
    }

    /// Change the retention of every source and of sources added later
    pub fn set_retention_all(&self, capacity: usize) -> Result<()> {
        validate_retention(capacity)?;
        let mut inner = self.write();
        inner.retention = capacity;
        for entry in &inner.entries {
            lock(&entry.series).set_retention_capacity(capacity)?;
        }
        Ok(())
    }

    pub fn set_replay_on_reconfigure(&self, replay: bool) {
        let mut inner = self.write();
        inner.replay_on_reconfigure = replay;
        for entry in &inner.entries {
            lock(&entry.series).set_replay_on_reconfigure(replay);
        }
    }

    pub fn set_sampling(&self, name: &str, sampling: bool) -> Result<()> {
        self.with_source(name, |s| s.set_sampling(sampling))
    }

    pub fn set_color(&self, name: &str, color: Color) -> Result<()> {
        self.with_source(name, |s| s.set_color(color))
    }

    pub fn retention(&self) -> usize {
        self.read().retention
    }

    pub fn names(&self) -> Vec<String> {
        self.read().entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().entries.iter().any(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Most recent output of each enabled variant of a source
    pub fn latest(&self, name: &str) -> Result<DerivedSamples> {
        self.with_source(name, |s| s.latest())
    }

    pub fn snapshot(&self, name: &str) -> Result<SeriesSnapshot> {
        self.with_source(name, |s| s.snapshot())
    }

    /// Snapshots of every source, in the order they were added
    pub fn snapshot_all(&self) -> Vec<SeriesSnapshot> {
        self.shared()
            .iter()
            .map(|(_, series)| lock(series).snapshot())
            .collect()
    }

    fn shared(&self) -> Vec<(String, SharedSeries)> {
        self.read()
            .entries
            .iter()
            .map(|e| (e.name.clone(), Arc::clone(&e.series)))
            .collect()
    }

    /// Sample every source once
    ///
    /// Sources with sampling switched off are skipped. A failed fetch is
    /// logged and ingested as a gap.
    pub fn tick(&self, source: &mut dyn DataSource, timestamp: f64) -> Vec<SourceUpdate> {
        let mut updates = Vec::new();
        for (name, series) in self.shared() {
            if !lock(&series).sampling() {
                continue;
            }

            let value = match source.fetch(&name, timestamp) {
                Ok(value) => value,
                Err(e) => {
                    log::warn!("Fetching {} failed: {:#}", name, e);
                    None
                }
            };

            let derived = lock(&series).ingest(value, timestamp);
            updates.push(SourceUpdate {
                name,
                value,
                derived,
            });
        }
        updates
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                retention: DEFAULT_RETENTION,
                replay_on_reconfigure: true,
            }),
        }
    }
}

/// First palette color no source uses; starts over once all are taken
fn next_palette_color(entries: &[SourceEntry]) -> Color {
    let palette: Vec<Color> = DEFAULT_SOURCE_COLORS
        .iter()
        .filter_map(|c| c.parse().ok())
        .collect();

    let mut taken: Vec<Color> = Vec::new();
    for entry in entries {
        let color = lock(&entry.series).color();
        if palette.contains(&color) && !taken.contains(&color) {
            taken.push(color);
            if taken.len() == palette.len() {
                taken.clear();
            }
        }
    }

    palette
        .into_iter()
        .find(|c| !taken.contains(c))
        .unwrap_or(Color::WHITE)
}
