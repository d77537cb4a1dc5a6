//! Events reported by position sources.
//!
//! Sources publish on a broadcast channel. Anyone interested in fixes or
//! provider changes subscribes before starting the source.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use geotrack_types::Position;

/// Provider status as reported by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// Delivering fixes.
    Available,
    /// No fix for now, expected to come back (e.g. no satellites in view).
    TemporarilyUnavailable,
    /// Gone and not expected back.
    OutOfService,
}

/// Events that can be emitted by a position source.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SourceEvent {
    /// A new position fix.
    Fix { position: Position },
    /// The provider's status changed.
    StatusChanged { status: ProviderStatus },
    /// The provider was switched on.
    ProviderEnabled,
    /// The provider was switched off or went away.
    ProviderDisabled,
}

impl SourceEvent {
    /// Whether the event means the source can no longer deliver fixes.
    #[must_use]
    pub fn is_provider_loss(&self) -> bool {
        matches!(
            self,
            SourceEvent::ProviderDisabled
                | SourceEvent::StatusChanged {
                    status: ProviderStatus::OutOfService
                }
        )
    }
}

/// Sender for source events.
pub type SourceSender = broadcast::Sender<SourceEvent>;

/// Receiver for source events.
pub type SourceReceiver = broadcast::Receiver<SourceEvent>;

/// Event dispatcher for sending source events to multiple receivers.
#[derive(Debug, Clone)]
pub struct SourceDispatcher {
    sender: SourceSender,
}

impl SourceDispatcher {
    /// Create a new dispatcher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> SourceReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: SourceEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SourceDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_loss_classification() {
        assert!(SourceEvent::ProviderDisabled.is_provider_loss());
        assert!(
            SourceEvent::StatusChanged {
                status: ProviderStatus::OutOfService
            }
            .is_provider_loss()
        );
        assert!(
            !SourceEvent::StatusChanged {
                status: ProviderStatus::TemporarilyUnavailable
            }
            .is_provider_loss()
        );
        assert!(!SourceEvent::ProviderEnabled.is_provider_loss());
        assert!(
            !SourceEvent::Fix {
                position: Position::new(1.0, 2.0)
            }
            .is_provider_loss()
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = SourceEvent::Fix {
            position: Position::new(1.0, 2.0),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "fix");
        assert_eq!(json["position"]["latitude"], 1.0);

        let json = serde_json::to_string(&SourceEvent::ProviderDisabled).unwrap();
        assert_eq!(json, r#"{"type":"provider_disabled"}"#);
    }

    #[tokio::test]
    async fn test_dispatcher_fans_out() {
        let dispatcher = SourceDispatcher::default();
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        dispatcher.send(SourceEvent::ProviderEnabled);
        assert_eq!(a.recv().await.unwrap(), SourceEvent::ProviderEnabled);
        assert_eq!(b.recv().await.unwrap(), SourceEvent::ProviderEnabled);
    }

    #[test]
    fn test_send_without_receivers_is_ignored() {
        let dispatcher = SourceDispatcher::new(4);
        dispatcher.send(SourceEvent::ProviderDisabled);
        assert_eq!(dispatcher.receiver_count(), 0);
    }
}
