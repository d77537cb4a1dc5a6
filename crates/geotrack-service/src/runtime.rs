//! Serial runtime for the controller.
//!
//! [`spawn`] moves a [`Controller`] into a task that drains one bounded queue.
//! Client requests, source events and shutdown signals all go through that
//! queue, so a fix and an `EndSession` are handled strictly in arrival order.
//! A second task forwards the position source's broadcast events into the queue.
//!
//! When a snapshot was found at init, a resume event is queued before anything
//! else.

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use geotrack_types::Request;

use crate::controller::{Controller, ControllerStatus, Event, Flow, ShutdownReason};

/// Errors returned by [`ControllerHandle`].
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Controller is stopped")]
    Stopped,
}

/// Cloneable handle for talking to a running controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    events: mpsc::Sender<Event>,
    status: watch::Receiver<ControllerStatus>,
}

impl ControllerHandle {
    /// Queue a client request.
    pub async fn send(&self, request: Request) -> Result<(), ControllerError> {
        self.events
            .send(Event::Request(request))
            .await
            .map_err(|_| ControllerError::Stopped)
    }

    /// Queue a shutdown.
    pub async fn shutdown(&self, reason: ShutdownReason) -> Result<(), ControllerError> {
        self.events
            .send(Event::Shutdown(reason))
            .await
            .map_err(|_| ControllerError::Stopped)
    }

    /// Status as of the last handled event.
    pub fn status(&self) -> ControllerStatus {
        *self.status.borrow()
    }

    /// Whether the controller task is still accepting events.
    pub fn is_running(&self) -> bool {
        !self.events.is_closed()
    }

    /// Wait until the status changes.
    pub async fn changed(&mut self) -> Result<ControllerStatus, ControllerError> {
        self.status
            .changed()
            .await
            .map_err(|_| ControllerError::Stopped)?;
        Ok(*self.status.borrow_and_update())
    }
}

/// Start the controller task. It ends once the controller stops.
pub fn spawn(controller: Controller, queue_capacity: usize) -> (ControllerHandle, JoinHandle<()>) {
    let (events_tx, mut events_rx) = mpsc::channel(queue_capacity.max(1));
    let (status_tx, status_rx) = watch::channel(controller.status());

    if controller.has_snapshot() {
        // Fresh channel with room for at least one event.
        let _ = events_tx.try_send(Event::Resume);
    }

    let forwarder = {
        let mut source_rx = controller.subscribe_source();
        let events_tx = events_tx.clone();
        tokio::spawn(async move {
            loop {
                match source_rx.recv().await {
                    Ok(event) => {
                        if events_tx.send(Event::Source(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Dropped {} position source events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Source forwarder finished");
        })
    };

    let task = tokio::spawn(async move {
        let mut controller = controller;
        info!("Controller running");
        while let Some(event) = events_rx.recv().await {
            let flow = controller.process(event).await;
            status_tx.send_replace(controller.status());
            if flow == Flow::Stop {
                break;
            }
        }
        events_rx.close();
        forwarder.abort();
        info!("Controller task finished");
    });

    (
        ControllerHandle {
            events: events_tx,
            status: status_rx,
        },
        task,
    )
}
