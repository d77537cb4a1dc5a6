//! NMEA position source backed by a serial device or file.
//!
//! [`NmeaSource`] reads newline-delimited NMEA sentences from a path such as
//! `/dev/ttyACM0` (a USB GPS receiver) or a recorded log file. The provider counts
//! as enabled when the path exists and permission as granted when it can be opened
//! for reading; both are checked again on every [`start`](PositionSource::start).
//!
//! The reader stops and reports [`SourceEvent::ProviderDisabled`] when the stream
//! ends or fails, which is what an unplugged receiver looks like.
//!
//! A regular file is replayed one fix per minimum interval; a device delivers at
//! its own rate and fixes arriving faster than the interval are dropped.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Availability, Error, Result};
use crate::events::{ProviderStatus, SourceDispatcher, SourceEvent, SourceReceiver};
use crate::nmea;
use crate::traits::{PositionSource, SourceOptions};
use crate::worker::{Throttle, Worker};

/// A position source reading NMEA sentences from a path.
pub struct NmeaSource {
    path: PathBuf,
    dispatcher: SourceDispatcher,
    worker: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for NmeaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NmeaSource")
            .field("path", &self.path)
            .finish()
    }
}

impl NmeaSource {
    /// Create a source for the given device or file path. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dispatcher: SourceDispatcher::default(),
            worker: Mutex::new(None),
        }
    }

    /// The device or file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<File> {
        File::open(&self.path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::Unavailable(Availability {
                permission_granted: true,
                provider_enabled: false,
            }),
            io::ErrorKind::PermissionDenied => Error::Unavailable(Availability {
                permission_granted: false,
                provider_enabled: true,
            }),
            _ => Error::Io(e),
        })
    }
}

#[async_trait]
impl PositionSource for NmeaSource {
    fn name(&self) -> &str {
        "nmea"
    }

    async fn availability(&self) -> Availability {
        let provider_enabled = tokio::fs::try_exists(&self.path).await.unwrap_or(false);
        let permission_granted = match File::open(&self.path).await {
            Ok(_) => true,
            Err(e) => e.kind() != io::ErrorKind::PermissionDenied,
        };
        Availability {
            permission_granted,
            provider_enabled,
        }
    }

    async fn start(&self, options: &SourceOptions) -> Result<()> {
        let availability = self.availability().await;
        if !availability.is_available() {
            return Err(Error::Unavailable(availability));
        }
        let file = self.open().await?;
        let replay = file.metadata().await.is_ok_and(|m| m.is_file());

        let mut worker = self.worker.lock().await;
        if let Some(previous) = worker.take() {
            debug!("Restarting NMEA reader on {}", self.path.display());
            previous.shutdown().await;
        }

        info!(
            "Reading NMEA from {} (min interval {:?}, replay: {})",
            self.path.display(),
            options.min_interval,
            replay
        );
        let dispatcher = self.dispatcher.clone();
        let path = self.path.clone();
        let min_interval = options.min_interval;
        *worker = Some(Worker::spawn(move |cancel| async move {
            let mut lines = BufReader::new(file).lines();
            let mut throttle = Throttle::new(min_interval);
            let mut reported_available = false;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("NMEA reader cancelled");
                        break;
                    }
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => match nmea::parse_sentence(&line) {
                            Ok(Some(position)) => {
                                if !reported_available {
                                    reported_available = true;
                                    dispatcher.send(SourceEvent::StatusChanged {
                                        status: ProviderStatus::Available,
                                    });
                                }
                                if throttle.admit(Instant::now()) {
                                    dispatcher.send(SourceEvent::Fix { position });
                                    if replay {
                                        tokio::select! {
                                            _ = cancel.cancelled() => break,
                                            _ = tokio::time::sleep(min_interval) => {}
                                        }
                                    }
                                }
                            }
                            Ok(None) => {}
                            Err(e) => debug!("Skipping sentence: {}", e),
                        },
                        Ok(None) => {
                            warn!("NMEA stream {} ended", path.display());
                            dispatcher.send(SourceEvent::ProviderDisabled);
                            break;
                        }
                        Err(e) => {
                            warn!("NMEA stream {} failed: {}", path.display(), e);
                            dispatcher.send(SourceEvent::ProviderDisabled);
                            break;
                        }
                    }
                }
            }
        }));
        Ok(())
    }

    /// Cancels the reader. The device is never touched, so this also works
    /// (as a no-op on the device) when permission was revoked.
    async fn stop(&self) -> Result<()> {
        if let Some(worker) = self.worker.lock().await.take() {
            worker.shutdown().await;
            info!("Stopped NMEA reader on {}", self.path.display());
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
