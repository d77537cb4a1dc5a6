//! Mock position source for testing.
//!
//! [`MockPositionSource`] implements [`PositionSource`] without any hardware.
//! Tests flip its permission and provider flags, push fixes into it and count
//! how often the controller started and stopped it.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use geotrack_types::Position;

use crate::error::{Availability, Error, Result};
use crate::events::{SourceDispatcher, SourceEvent, SourceReceiver};
use crate::traits::{PositionSource, SourceOptions};

/// A mock position source for testing.
pub struct MockPositionSource {
    permission_granted: AtomicBool,
    provider_enabled: AtomicBool,
    started: AtomicBool,
    start_calls: AtomicU32,
    stop_calls: AtomicU32,
    last_options: RwLock<Option<SourceOptions>>,
    dispatcher: SourceDispatcher,
}

impl std::fmt::Debug for MockPositionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPositionSource")
            .field("availability", &self.current_availability())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockPositionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPositionSource {
    /// Create an available, stopped mock source.
    pub fn new() -> Self {
        Self {
            permission_granted: AtomicBool::new(true),
            provider_enabled: AtomicBool::new(true),
            started: AtomicBool::new(false),
            start_calls: AtomicU32::new(0),
            stop_calls: AtomicU32::new(0),
            last_options: RwLock::new(None),
            dispatcher: SourceDispatcher::default(),
        }
    }

    /// Create a mock source with the given availability.
    pub fn with_availability(availability: Availability) -> Self {
        let source = Self::new();
        source.set_availability(availability);
        source
    }

    /// Grant or revoke permission.
    pub fn set_permission_granted(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::Relaxed);
    }

    /// Switch the provider on or off without emitting an event.
    pub fn set_provider_enabled(&self, enabled: bool) {
        self.provider_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Set both flags at once.
    pub fn set_availability(&self, availability: Availability) {
        self.set_permission_granted(availability.permission_granted);
        self.set_provider_enabled(availability.provider_enabled);
    }

    /// Switch the provider off and report it, like a user turning GPS off.
    pub fn disable_provider(&self) {
        self.set_provider_enabled(false);
        self.started.store(false, Ordering::Relaxed);
        self.emit(SourceEvent::ProviderDisabled);
    }

    /// Deliver a fix to subscribers.
    ///
    /// Fixes are delivered even when the mock is stopped, so tests can simulate
    /// a fix that was already in flight when the source was stopped.
    pub fn emit_fix(&self, position: Position) {
        self.emit(SourceEvent::Fix { position });
    }

    /// Deliver an arbitrary event to subscribers.
    pub fn emit(&self, event: SourceEvent) {
        self.dispatcher.send(event);
    }

    /// Number of successful `start` calls.
    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::Relaxed)
    }

    /// Number of effective `stop` calls.
    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::Relaxed)
    }

    /// Whether the mock is started, without going through the async trait.
    pub fn is_started_sync(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    /// Options passed to the most recent successful `start`.
    pub async fn last_options(&self) -> Option<SourceOptions> {
        *self.last_options.read().await
    }

    fn current_availability(&self) -> Availability {
        Availability {
            permission_granted: self.permission_granted.load(Ordering::Relaxed),
            provider_enabled: self.provider_enabled.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl PositionSource for MockPositionSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn availability(&self) -> Availability {
        self.current_availability()
    }

    async fn start(&self, options: &SourceOptions) -> Result<()> {
        let availability = self.current_availability();
        if !availability.is_available() {
            return Err(Error::Unavailable(availability));
        }
        *self.last_options.write().await = Some(*options);
        self.started.store(true, Ordering::Relaxed);
        self.start_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.permission_granted.load(Ordering::Relaxed) {
            debug!("Mock source stop ignored: permission missing");
            return Ok(());
        }
        self.started.store(false, Ordering::Relaxed);
        self.stop_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn is_started(&self) -> bool {
        self.is_started_sync()
    }

    fn subscribe(&self) -> SourceReceiver {
        self.dispatcher.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_mock_start_stop() {
        let source = MockPositionSource::new();
        assert!(!source.is_started().await);

        source.start(&SourceOptions::default()).await.unwrap();
        assert!(source.is_started().await);
        assert_eq!(source.start_calls(), 1);

        source.stop().await.unwrap();
        source.stop().await.unwrap();
        assert!(!source.is_started().await);
        assert_eq!(source.stop_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_start_fails_without_permission() {
        let source = MockPositionSource::new();
        source.set_permission_granted(false);

        let err = source.start(&SourceOptions::default()).await.unwrap_err();
        match err {
            Error::Unavailable(availability) => {
                assert!(!availability.permission_granted);
                assert!(availability.provider_enabled);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(source.start_calls(), 0);
    }

    #[tokio::test]
    async fn test_mock_availability_rechecked_each_call() {
        let source = MockPositionSource::new();
        source.set_provider_enabled(false);
        assert!(source.start(&SourceOptions::default()).await.is_err());

        source.set_provider_enabled(true);
        assert!(source.start(&SourceOptions::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_stop_without_permission_is_noop() {
        let source = MockPositionSource::new();
        source.start(&SourceOptions::default()).await.unwrap();
        source.set_permission_granted(false);

        source.stop().await.unwrap();
        assert_eq!(source.stop_calls(), 0);
        assert!(source.is_started_sync());
    }

    #[tokio::test]
    async fn test_mock_records_options() {
        let source = MockPositionSource::new();
        let options = SourceOptions::with_interval(Duration::from_secs(1));
        source.start(&options).await.unwrap();
        assert_eq!(source.last_options().await, Some(options));
    }

    #[tokio::test]
    async fn test_mock_disable_provider_emits_event() {
        let source = MockPositionSource::new();
        let mut events = source.subscribe();
        source.start(&SourceOptions::default()).await.unwrap();

        source.disable_provider();
        assert_eq!(events.recv().await.unwrap(), SourceEvent::ProviderDisabled);
        assert!(!source.is_started_sync());
        assert!(!source.availability().await.provider_enabled);
    }
}
