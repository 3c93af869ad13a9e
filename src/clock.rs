use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::Context;
use crossbeam_channel::{Sender, TrySendError, bounded, select};
use serde::Serialize;

use crate::config::SamplingFrequency;
use crate::registry::{SourceRegistry, SourceUpdate};
use crate::source::DataSource;

/// Everything sampled during one tick
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick: u64,
    /// Seconds since the clock was created
    pub timestamp: f64,
    pub updates: Vec<SourceUpdate>,
}

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<Box<dyn DataSource>>,
}

/// Periodic driver that samples every source of a registry
///
/// The data source is owned by the clock: while running it lives on the
/// sampling thread, while stopped it is parked here so `tick_once` can
/// drive it by hand.
pub struct SamplingClock {
    registry: Arc<SourceRegistry>,
    frequency: Arc<AtomicU64>,
    epoch: Instant,
    ticks: Arc<AtomicU64>,
    source: Option<Box<dyn DataSource>>,
    worker: Option<Worker>,
}

impl SamplingClock {
    pub fn new(
        registry: Arc<SourceRegistry>,
        source: Box<dyn DataSource>,
        frequency: SamplingFrequency,
    ) -> Self {
        Self {
            registry,
            frequency: Arc::new(AtomicU64::new(frequency.as_hz().to_bits())),
            epoch: Instant::now(),
            ticks: Arc::new(AtomicU64::new(0)),
            source: Some(source),
            worker: None,
        }
    }

    /// Change the sampling frequency; a running clock picks it up on its
    /// next wait
    pub fn set_frequency(&self, frequency: SamplingFrequency) {
        self.frequency
            .store(frequency.as_hz().to_bits(), Ordering::Relaxed);
        log::info!("Sampling frequency set to {}", frequency);
    }

    pub fn frequency(&self) -> SamplingFrequency {
        load_frequency(&self.frequency)
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// False once the sampling thread has exited, including on its own
    /// after the report consumer went away
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Ticks completed since creation
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Start the sampling thread
    ///
    /// The first tick happens one period after start. A report is sent on
    /// `reports` after every tick; if the consumer falls behind and the
    /// channel is full the report is dropped, the samples are still
    /// ingested. The thread ends on `stop` or when `reports` disconnects.
    pub fn start(&mut self, reports: Sender<TickReport>) -> anyhow::Result<()> {
        self.reap_finished();
        if self.worker.is_some() {
            anyhow::bail!("sampling clock is already running");
        }
        let mut source = self
            .source
            .take()
            .context("data source was lost by a previous sampling thread")?;

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let registry = Arc::clone(&self.registry);
        let frequency = Arc::clone(&self.frequency);
        let ticks = Arc::clone(&self.ticks);
        let epoch = self.epoch;

        let handle = thread::Builder::new()
            .name("sampling-clock".into())
            .spawn(move || {
                let mut next = Instant::now();
                loop {
                    next += load_frequency(&frequency).period();
                    let now = Instant::now();
                    if next < now {
                        // Overran; don't try to catch up with a burst of ticks
                        next = now;
                    }

                    select! {
                        recv(stop_rx) -> _ => break,
                        default(next - now) => {}
                    }

                    let report = run_tick(&registry, source.as_mut(), &ticks, epoch);
                    match reports.try_send(report) {
                        Ok(()) => {}
                        Err(TrySendError::Full(report)) => {
                            log::warn!("Report for tick {} dropped, consumer is behind", report.tick);
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            log::info!("Report consumer went away, stopping sampling");
                            break;
                        }
                    }
                }
                source
            })
            .context("failed to spawn sampling thread")?;

        self.worker = Some(Worker { stop_tx, handle });
        log::info!(
            "Sampling started at {} for {} sources",
            self.frequency(),
            self.registry.len()
        );
        Ok(())
    }

    /// Stop the sampling thread
    ///
    /// Returns once the thread has finished its in-flight tick and exited.
    /// Stopping a stopped clock does nothing.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        // The thread may already have exited on its own
        let _ = worker.stop_tx.try_send(());
        match worker.handle.join() {
            Ok(source) => self.source = Some(source),
            Err(_) => log::error!("Sampling thread panicked; data source lost"),
        }
        log::info!("Sampling stopped after {} ticks", self.tick_count());
    }

    /// Join a thread that exited on its own so its data source comes back
    fn reap_finished(&mut self) {
        if self.worker.is_some() && !self.is_running() {
            self.stop();
        }
    }

    /// Run a single tick on the calling thread
    ///
    /// Only possible while the clock is stopped.
    pub fn tick_once(&mut self) -> anyhow::Result<TickReport> {
        self.reap_finished();
        if self.worker.is_some() {
            anyhow::bail!("cannot tick by hand while the sampling clock is running");
        }
        let source = self
            .source
            .as_mut()
            .context("data source was lost by a previous sampling thread")?;
        Ok(run_tick(&self.registry, source.as_mut(), &self.ticks, self.epoch))
    }
}

impl Drop for SamplingClock {
    fn drop(&mut self) {
        self.stop();
    }
}

fn load_frequency(bits: &AtomicU64) -> SamplingFrequency {
    SamplingFrequency::from_hz(f64::from_bits(bits.load(Ordering::Relaxed))).unwrap_or_default()
}

fn run_tick(
    registry: &SourceRegistry,
    source: &mut dyn DataSource,
    ticks: &AtomicU64,
    epoch: Instant,
) -> TickReport {
    let timestamp = epoch.elapsed().as_secs_f64();
    let updates = registry.tick(source, timestamp);
    let tick = ticks.fetch_add(1, Ordering::Relaxed) + 1;
    log::trace!("Tick {} at t={:.3}: {} sources", tick, timestamp, updates.len());
    TickReport {
        tick,
        timestamp,
        updates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ScriptedSource;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    fn clock_with(source: impl DataSource + 'static, hz: f64) -> SamplingClock {
        let registry = Arc::new(SourceRegistry::default());
        registry.add_source("pv", None).unwrap();
        SamplingClock::new(
            registry,
            Box::new(source),
            SamplingFrequency::from_hz(hz).unwrap(),
        )
    }

    #[test]
    fn test_tick_once() {
        let mut clock = clock_with(ScriptedSource::new().with_readings("pv", [Some(3.0)]), 1.0);
        let report = clock.tick_once().unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.updates.len(), 1);
        assert_eq!(report.updates[0].value, Some(3.0));
        assert_eq!(clock.tick_count(), 1);
        assert!(report.timestamp >= 0.0);
    }

    #[test]
    fn test_start_stop_restart() {
        let mut clock = clock_with(
            |_: &str, t: f64| -> anyhow::Result<Option<f64>> { Ok(Some(t)) },
            200.0,
        );
        let (tx, rx) = unbounded();

        clock.start(tx.clone()).unwrap();
        assert!(clock.is_running());
        assert!(clock.start(tx.clone()).is_err());
        assert!(clock.tick_once().is_err());

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.tick, 1);
        clock.stop();
        assert!(!clock.is_running());

        // Every completed tick produced a report and was ingested
        let ticks = clock.tick_count();
        let reported = 1 + rx.try_iter().count() as u64;
        assert_eq!(reported, ticks);
        let retained = clock.registry().snapshot("pv").unwrap().retained as u64;
        assert_eq!(retained, ticks);

        // The source came back from the thread
        let report = clock.tick_once().unwrap();
        assert_eq!(report.tick, ticks + 1);

        clock.start(tx).unwrap();
        clock.stop();
    }

    #[test]
    fn test_stops_when_consumer_disconnects() {
        let mut clock = clock_with(
            |_: &str, _: f64| -> anyhow::Result<Option<f64>> { Ok(Some(1.0)) },
            500.0,
        );
        let (tx, rx) = bounded(1);
        clock.start(tx).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        drop(rx);
        clock.stop();
        assert!(clock.tick_once().is_ok());
    }

    #[test]
    fn test_restart_after_consumer_disconnects() {
        let mut clock = clock_with(
            |_: &str, _: f64| -> anyhow::Result<Option<f64>> { Ok(Some(1.0)) },
            500.0,
        );
        let (tx, rx) = bounded(1);
        clock.start(tx).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        drop(rx);

        // The thread notices on its next tick, no stop() needed
        let deadline = Instant::now() + Duration::from_secs(5);
        while clock.is_running() {
            assert!(Instant::now() < deadline, "sampling thread did not exit");
            thread::sleep(Duration::from_millis(2));
        }

        let ticks = clock.tick_count();
        let report = clock.tick_once().unwrap();
        assert_eq!(report.tick, ticks + 1);

        let (tx, rx) = unbounded();
        clock.start(tx).unwrap();
        assert!(clock.is_running());
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        clock.stop();
        assert!(!clock.is_running());
    }

    #[test]
    fn test_frequency_change() {
        let clock = clock_with(ScriptedSource::new(), 1.0);
        clock.set_frequency(SamplingFrequency::from_hz(20.0).unwrap());
        assert_eq!(clock.frequency().as_hz(), 20.0);
    }
}
