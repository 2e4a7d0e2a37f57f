//! Background camera acquisition.
//!
//! A dedicated thread pulls frames from a [`FrameSource`], corrects them and
//! publishes them as [`AcquisitionEvent`]s. A capture request posted through
//! [`CaptureRequester`] is served with the next frame read and written to disk.

mod correction;
mod source;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use image::RgbImage;

pub use correction::{FrameCorrection, Rotation};
pub use source::ImageFolderSource;

/// A camera handle.
pub trait FrameSource: Send {
    fn open(&mut self) -> anyhow::Result<()>;
    /// `Ok(None)` when the source has no more frames.
    fn read_frame(&mut self) -> anyhow::Result<Option<RgbImage>>;
    fn close(&mut self);
    fn describe(&self) -> String {
        "camera".to_string()
    }
}

#[derive(Debug, Clone)]
pub enum AcquisitionEvent {
    CameraAvailable(bool),
    Frame(Arc<RgbImage>),
    CaptureComplete { session_id: i64, path: PathBuf },
    CaptureFailed { session_id: i64, reason: String },
    Error(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("Unable to open video capture")]
    NotOpened,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("capture for session {0} is still outstanding")]
pub struct CaptureBusy(pub i64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub session_id: i64,
    pub path: PathBuf,
}

/// One-shot capture handshake shared between the UI and the acquisition loop.
#[derive(Debug, Clone, Default)]
pub struct CaptureRequester {
    slot: Arc<Mutex<Option<CaptureRequest>>>,
}

impl CaptureRequester {
    /// Post a request. Fails while an earlier request has not been served.
    pub fn request(&self, request: CaptureRequest) -> Result<(), CaptureBusy> {
        let mut slot = lock(&self.slot);
        if let Some(pending) = slot.as_ref() {
            return Err(CaptureBusy(pending.session_id));
        }
        log::debug!("capture requested for session {}", request.session_id);
        *slot = Some(request);
        Ok(())
    }

    pub fn pending(&self) -> Option<CaptureRequest> {
        lock(&self.slot).clone()
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.slot).is_some()
    }

    fn clear(&self) -> Option<CaptureRequest> {
        lock(&self.slot).take()
    }
}

// The slot holds plain data, so a poisoned lock is still usable.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The loop body, usable on the current thread or through [`AcquisitionHandle`].
pub struct AcquisitionLoop<S: FrameSource> {
    source: S,
    correction: FrameCorrection,
    interval: Duration,
    running: Arc<AtomicBool>,
    requester: CaptureRequester,
    events: Sender<AcquisitionEvent>,
}

impl<S: FrameSource> AcquisitionLoop<S> {
    pub fn new(
        source: S,
        correction: FrameCorrection,
        interval: Duration,
    ) -> (Self, Receiver<AcquisitionEvent>) {
        let (events, receiver) = mpsc::channel();
        let this = Self {
            source,
            correction,
            interval,
            running: Arc::new(AtomicBool::new(true)),
            requester: CaptureRequester::default(),
            events,
        };
        (this, receiver)
    }

    pub fn requester(&self) -> CaptureRequester {
        self.requester.clone()
    }

    pub fn run_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// `false` once the receiving side is gone.
    fn emit(&self, event: AcquisitionEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn run(mut self) -> anyhow::Result<()> {
        if let Err(e) = self.source.open() {
            log::error!("failed to open {}: {:#}", self.source.describe(), e);
            self.emit(AcquisitionEvent::Error(CameraError::NotOpened.to_string()));
            self.emit(AcquisitionEvent::CameraAvailable(false));
            self.source.close();
            return Err(CameraError::NotOpened.into());
        }
        log::info!("acquisition started on {}", self.source.describe());
        self.emit(AcquisitionEvent::CameraAvailable(true));

        while self.running.load(Ordering::SeqCst) {
            // Only a request that exists before the read is served by it.
            let request = self.requester.pending();

            let frame = match self.source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("{} has no more frames", self.source.describe());
                    break;
                }
                Err(e) => {
                    log::error!("frame read failed: {:#}", e);
                    self.emit(AcquisitionEvent::Error(format!("{:#}", e)));
                    break;
                }
            };
            let frame = Arc::new(self.correction.apply(frame));

            // stop() may have withdrawn the request during the read
            let request = request.filter(|r| self.requester.pending().as_ref() == Some(r));
            if let Some(request) = request {
                let event = match save_frame(&frame, &request.path) {
                    Ok(()) => AcquisitionEvent::CaptureComplete {
                        session_id: request.session_id,
                        path: request.path,
                    },
                    Err(e) => {
                        log::warn!("capture for session {} failed: {:#}", request.session_id, e);
                        AcquisitionEvent::CaptureFailed {
                            session_id: request.session_id,
                            reason: format!("{:#}", e),
                        }
                    }
                };
                self.requester.clear();
                if !self.emit(event) {
                    break;
                }
            }

            if !self.emit(AcquisitionEvent::Frame(frame)) {
                log::debug!("event receiver dropped, stopping acquisition");
                break;
            }

            if !self.interval.is_zero() {
                std::thread::sleep(self.interval);
            }
        }

        self.source.close();
        self.emit(AcquisitionEvent::CameraAvailable(false));
        log::info!("acquisition stopped");
        Ok(())
    }
}

fn save_frame(frame: &RgbImage, path: &std::path::Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create capture directory {:?}", parent))?;
    }
    frame
        .save(path)
        .with_context(|| format!("Failed to write capture {:?}", path))
}

/// Owns the acquisition thread. Dropping the handle stops the loop.
pub struct AcquisitionHandle {
    running: Arc<AtomicBool>,
    requester: CaptureRequester,
    thread: Option<JoinHandle<anyhow::Result<()>>>,
}

impl AcquisitionHandle {
    pub fn spawn<S: FrameSource + 'static>(
        source: S,
        correction: FrameCorrection,
        interval: Duration,
    ) -> anyhow::Result<(Self, Receiver<AcquisitionEvent>)> {
        let (acquisition, events) = AcquisitionLoop::new(source, correction, interval);
        let running = acquisition.run_flag();
        let requester = acquisition.requester();
        let thread = std::thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || acquisition.run())
            .context("Failed to spawn acquisition thread")?;
        Ok((
            Self {
                running,
                requester,
                thread: Some(thread),
            },
            events,
        ))
    }

    pub fn requester(&self) -> CaptureRequester {
        self.requester.clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Clear the run and capture flags and wait for the thread to exit.
    /// Returns the loop's own result.
    pub fn stop(&mut self) -> anyhow::Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(dropped) = self.requester.clear() {
            log::debug!("dropping outstanding capture for session {}", dropped.session_id);
        }
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| anyhow::anyhow!("acquisition thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::debug!("acquisition ended with: {:#}", e);
        }
    }
}
