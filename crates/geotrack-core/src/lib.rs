//! Position sources for the geotrack session recorder.
//!
//! A position source wraps a location sensor behind the [`PositionSource`] trait:
//! it can be started and stopped, reports whether permission and provider are in
//! place, and publishes [`SourceEvent`]s (fixes and provider changes) on a
//! broadcast channel.
//!
//! # Sources
//!
//! | Source | Backing |
//! |--------|---------|
//! | [`NmeaSource`] | NMEA 0183 sentences from a serial device or log file |
//! | [`SimulatedSource`] | Seeded random walk, no hardware needed |
//! | [`MockPositionSource`] | Test double with failure injection |
//!
//! # Example
//!
//! ```no_run
//! use geotrack_core::{NmeaSource, PositionSource, SourceEvent, SourceOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = NmeaSource::new("/dev/ttyACM0");
//!     let mut events = source.subscribe();
//!     source.start(&SourceOptions::default()).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let SourceEvent::Fix { position } = event {
//!             println!("{:.5}, {:.5}", position.latitude, position.longitude);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod error;
pub mod events;
pub mod mock;
pub mod nmea;
pub mod simulated;
pub mod traits;
mod worker;

pub use device::NmeaSource;
pub use error::{Availability, Error, Result};
pub use events::{ProviderStatus, SourceDispatcher, SourceEvent, SourceReceiver, SourceSender};
pub use mock::MockPositionSource;
pub use simulated::{SimulatedSource, SimulationSettings};
pub use traits::{DEFAULT_MIN_INTERVAL, PositionSource, SourceOptions};

// Re-export types for convenience
pub use geotrack_types;
