//! Trait abstraction over position sources.
//!
//! The [`PositionSource`] trait lets the controller drive a real receiver, a
//! simulated one, or a mock in tests through the same calls.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Availability, Result};
use crate::events::SourceReceiver;

/// Minimum interval between fixes when none is configured.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(5000);

/// Options passed to [`PositionSource::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceOptions {
    /// Fixes closer together than this are dropped.
    pub min_interval: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

impl SourceOptions {
    /// Options with a specific minimum interval.
    pub fn with_interval(min_interval: Duration) -> Self {
        Self { min_interval }
    }
}

/// A location sensor that can be started and stopped.
///
/// # Example
///
/// ```
/// use geotrack_core::{MockPositionSource, PositionSource, SourceOptions};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> geotrack_core::Result<()> {
/// let source = MockPositionSource::new();
/// let mut events = source.subscribe();
///
/// source.start(&SourceOptions::default()).await?;
/// source.emit_fix(geotrack_types::Position::new(1.0, 2.0));
/// assert!(events.recv().await.is_ok());
/// source.stop().await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Short human-readable name for logs.
    fn name(&self) -> &str;

    /// Check permission and provider state. Never cached.
    async fn availability(&self) -> Availability;

    /// Start delivering fixes.
    ///
    /// Fails with [`Error::Unavailable`](crate::Error::Unavailable) when
    /// [`availability`](Self::availability) does not hold at the time of the call.
    /// Starting an already started source restarts it.
    async fn start(&self, options: &SourceOptions) -> Result<()>;

    /// Stop delivering fixes.
    ///
    /// Idempotent. Does nothing, and does not fail, when permission is missing.
    async fn stop(&self) -> Result<()>;

    /// Whether fixes are currently being delivered.
    async fn is_started(&self) -> bool;

    /// Subscribe to fixes and provider events.
    fn subscribe(&self) -> SourceReceiver;
}
