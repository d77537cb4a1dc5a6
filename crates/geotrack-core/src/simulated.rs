//! Simulated position source.
//!
//! Produces a random walk around an origin at the configured interval. Useful for
//! running the service on a machine without a GPS receiver, and for demos.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info};

use geotrack_types::Position;

use crate::error::{Availability, Error, Result};
use crate::events::{ProviderStatus, SourceDispatcher, SourceEvent, SourceReceiver};
use crate::traits::{PositionSource, SourceOptions};
use crate::worker::Worker;

/// Settings for [`SimulatedSource`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    /// Where the walk starts.
    pub origin: Position,
    /// Largest per-fix change of each coordinate, in degrees.
    pub step_degrees: f64,
    /// RNG seed for reproducible walks. Random when `None`.
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            origin: Position::new(4.6097, -74.0817),
            step_degrees: 0.0005,
            seed: None,
        }
    }
}

/// A position source that walks randomly around an origin.
pub struct SimulatedSource {
    settings: SimulationSettings,
    enabled: AtomicBool,
    dispatcher: SourceDispatcher,
    worker: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for SimulatedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedSource")
            .field("settings", &self.settings)
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .finish()
    }
}

impl SimulatedSource {
    /// Create a simulated source. Fails if the settings are out of range.
    pub fn new(settings: SimulationSettings) -> Result<Self> {
        settings
            .origin
            .validate()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if !settings.step_degrees.is_finite() || settings.step_degrees < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "step_degrees must be a non-negative number, got {}",
                settings.step_degrees
            )));
        }
        Ok(Self {
            settings,
            enabled: AtomicBool::new(true),
            dispatcher: SourceDispatcher::default(),
            worker: Mutex::new(None),
        })
    }

    /// Simulate the user switching the provider off.
    pub async fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.lock().await.take() {
            worker.shutdown().await;
        }
        self.dispatcher.send(SourceEvent::ProviderDisabled);
    }

    /// Simulate the user switching the provider back on.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
        self.dispatcher.send(SourceEvent::ProviderEnabled);
    }
}

/// Advance the walk one step, clamping to valid coordinates.
fn step(rng: &mut StdRng, from: Position, step_degrees: f64) -> Position {
    let (dlat, dlon) = if step_degrees > 0.0 {
        (
            rng.random_range(-step_degrees..=step_degrees),
            rng.random_range(-step_degrees..=step_degrees),
        )
    } else {
        (0.0, 0.0)
    };
    Position::new(
        (from.latitude + dlat).clamp(-90.0, 90.0),
        (from.longitude + dlon).clamp(-180.0, 180.0),
    )
}

#[async_trait]
impl PositionSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn availability(&self) -> Availability {
        Availability {
            permission_granted: true,
            provider_enabled: self.enabled.load(Ordering::Relaxed),
        }
    }

    async fn start(&self, options: &SourceOptions) -> Result<()> {
        let availability = self.availability().await;
        if !availability.is_available() {
            return Err(Error::Unavailable(availability));
        }

        let mut worker = self.worker.lock().await;
        if let Some(previous) = worker.take() {
            previous.shutdown().await;
        }

        let settings = self.settings;
        // A zero interval would spin; one fix per second is the floor.
        let period = options.min_interval.max(Duration::from_secs(1));
        let dispatcher = self.dispatcher.clone();
        info!("Starting simulated position source every {:?}", period);

        *worker = Some(Worker::spawn(move |cancel| async move {
            let mut rng = match settings.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            let mut position = settings.origin;
            let mut ticker = tokio::time::interval(period);
            dispatcher.send(SourceEvent::StatusChanged {
                status: ProviderStatus::Available,
            });

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Simulated source cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        position = step(&mut rng, position, settings.step_degrees)
                            .with_captured_at(OffsetDateTime::now_utc());
                        dispatcher.send(SourceEvent::Fix { position });
                    }
                }
            }
        }));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(worker) = self.worker.lock().await.take() {
            worker.shutdown().await;
            info!("Stopped simulated position source");
        }
        Ok(())
    }

    async fn is_started(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .is_some_and(Worker::is_running)
    }

    fn subscribe(&self) -> SourceReceiver {
        self.dispatcher.subscribe()
    }
}
