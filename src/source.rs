//! Mock power source.
//!
//! Emits simulated power readings on a fixed cadence into an `mpsc` channel,
//! which is the input a [`MovingWindow`](crate::timeseries::MovingWindow)
//! consumes.
//!
//! Characteristics:
//! - Base power: configurable, 1 kW by default
//! - Noise: uniform ±`noise` fraction of the base power
//! - Dropout: with `dropout_probability`, a reading is emitted without a value
//! - Seed: optional, for reproducible sequences

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument};

use crate::config::SourceConfig;
use crate::error::{WindowError, WindowResult};
use crate::supervisor::{join_task, TaskExit, TaskOutcome, TaskResult};
use crate::timeseries::Sample;

/// Simulated power meter producing [`Sample`]s.
#[derive(Debug, Clone)]
pub struct MockPowerSource {
    config: SourceConfig,
}

impl MockPowerSource {
    /// Create a source; fails if the emission period is zero.
    pub fn new(config: SourceConfig) -> WindowResult<Self> {
        if config.period.is_zero() {
            return Err(WindowError::Precondition(
                "The source period should be greater than zero.".into(),
            ));
        }
        Ok(Self { config })
    }

    /// Settings the source was created with.
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Generate one reading at the current time.
    fn reading(&self, rng: &mut StdRng) -> Sample {
        let now = Utc::now();
        if self.config.dropout_probability > 0.0 && rng.gen_bool(self.config.dropout_probability) {
            return Sample::absent(now);
        }
        let noise = if self.config.noise > 0.0 {
            rng.gen_range(-self.config.noise..self.config.noise)
        } else {
            0.0
        };
        Sample::new(now, self.config.base_power * (1.0 + noise))
    }

    /// Start emitting into `tx` until stopped or the receiver is dropped.
    pub fn spawn(&self, tx: mpsc::Sender<Sample>) -> SourceHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let source = self.clone();
        let span = tracing::info_span!("mock_power_source");

        let handle = tokio::spawn(
            async move {
                let mut rng = source.rng();
                let mut ticker = tokio::time::interval(source.config.period);
                info!(period = ?source.config.period, "Mock power source started");

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let sample = source.reading(&mut rng);
                            debug!(value = ?sample.value, "Emitting reading");
                            if tx.send(sample).await.is_err() {
                                info!("Sample receiver dropped, stopping source");
                                return Ok(TaskExit::Completed);
                            }
                        }
                        _ = &mut shutdown_rx => {
                            info!("Mock power source shutting down");
                            return Ok(TaskExit::Cancelled);
                        }
                    }
                }
            }
            .instrument(span),
        );

        SourceHandle {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

/// Control handle for a running source task.
#[derive(Debug)]
pub struct SourceHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<TaskResult>>,
}

impl SourceHandle {
    /// Whether the emitting task is still alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the task and wait for it; later calls report `Finished`.
    pub async fn stop(&mut self) -> TaskOutcome {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        match self.handle.take() {
            Some(handle) => join_task("mock_power_source", handle).await,
            None => TaskOutcome::Finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> SourceConfig {
        SourceConfig {
            period: Duration::from_millis(100),
            base_power: 1_000.0,
            noise: 0.05,
            dropout_probability: 0.0,
            seed: Some(7),
        }
    }

    #[test]
    fn zero_period_is_rejected() {
        let mut config = config();
        config.period = Duration::ZERO;
        assert!(MockPowerSource::new(config).is_err());
    }

    #[test]
    fn readings_stay_within_noise_band() {
        let source = MockPowerSource::new(config()).unwrap();
        let mut rng = source.rng();
        for _ in 0..100 {
            let value = source.reading(&mut rng).value.unwrap();
            assert!((950.0..=1_050.0).contains(&value), "value {value} outside band");
        }
    }

    #[test]
    fn full_dropout_yields_absent_samples() {
        let mut config = config();
        config.dropout_probability = 1.0;
        let source = MockPowerSource::new(config).unwrap();
        let mut rng = source.rng();
        assert!(source.reading(&mut rng).value.is_none());
    }

    #[test]
    fn seeded_sources_repeat() {
        let source = MockPowerSource::new(config()).unwrap();
        let (mut a, mut b) = (source.rng(), source.rng());
        for _ in 0..10 {
            assert_eq!(source.reading(&mut a).value, source.reading(&mut b).value);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn emits_on_cadence_and_stops() {
        let source = MockPowerSource::new(config()).unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let mut handle = source.spawn(tx);

        // first tick fires immediately, then one per period
        tokio::time::sleep(Duration::from_millis(250)).await;
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 3);

        assert_eq!(handle.stop().await, TaskOutcome::Cancelled);
        assert!(!handle.is_running());
        assert_eq!(handle.stop().await, TaskOutcome::Finished);
    }
}
