use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Duration;

use crate::capture::{AcquisitionEvent, AcquisitionHandle, CaptureRequester, ImageFolderSource};
use crate::classify::{CrackClassifier, LazyModel};
use crate::config::Config;
use crate::core::db::{Database, User};
use crate::core::storage::ImageStore;
use crate::scan::{ClassificationWorker, ScanController};

/// Running acquisition thread plus the receiving end of its events.
pub struct CameraFeed {
    handle: AcquisitionHandle,
    events: Receiver<AcquisitionEvent>,
    pub available: bool,
}

pub struct AppState {
    pub config: Config,
    pub store: ImageStore,
    pub classifier: CrackClassifier,
    pub db: Option<Database>,
    pub camera: Option<CameraFeed>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("db", &self.db)
            .field("camera", &self.camera.as_ref().map(|c| c.available))
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let model = LazyModel::new(
            config.classifier.model_path.clone(),
            config.classifier.input_layout,
            config.roi.width,
            config.roi.height,
        );
        Self {
            store: ImageStore::new(config.storage.image_root.clone()),
            classifier: CrackClassifier::new(Arc::new(model), config.classifier.threshold),
            db: None,
            camera: None,
            config,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.config.camera.frame_interval_ms.max(1))
    }

    pub fn start_camera(&mut self) {
        if self.camera.is_some() {
            return;
        }
        let Some(source) = self.config.camera.source.clone() else {
            log::warn!("no camera source configured, live view disabled");
            return;
        };
        match AcquisitionHandle::spawn(
            ImageFolderSource::new(source),
            self.config.camera.correction.clone(),
            self.frame_interval(),
        ) {
            Ok((handle, events)) => {
                self.camera = Some(CameraFeed {
                    handle,
                    events,
                    available: false,
                })
            }
            Err(e) => log::error!("failed to start camera: {:#}", e),
        }
    }

    pub fn stop_camera(&mut self) {
        if let Some(mut feed) = self.camera.take() {
            if let Err(e) = feed.handle.stop() {
                log::warn!("camera stopped with error: {:#}", e);
            }
        }
    }

    /// Pending acquisition events. Only the newest frame of the batch is kept.
    pub fn drain_events(&mut self) -> Vec<AcquisitionEvent> {
        let Some(feed) = self.camera.as_mut() else {
            return Vec::new();
        };
        let mut events = Vec::new();
        let mut latest_frame = None;
        loop {
            match feed.events.try_recv() {
                Ok(AcquisitionEvent::Frame(frame)) => latest_frame = Some(frame),
                Ok(event) => {
                    if let AcquisitionEvent::CameraAvailable(available) = event {
                        feed.available = available;
                    }
                    events.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    feed.available = false;
                    break;
                }
            }
        }
        events.extend(latest_frame.map(AcquisitionEvent::Frame));
        events
    }

    /// Controller for `user`, already told whether the camera is up.
    pub fn scan_controller(&self, db: Database, user: User) -> ScanController {
        let requester = self
            .camera
            .as_ref()
            .map(|feed| feed.handle.requester())
            .unwrap_or_else(CaptureRequester::default);
        let worker = ClassificationWorker::new(
            db.clone(),
            self.store.clone(),
            self.config.roi,
            self.config.pipeline.clone(),
            self.classifier.clone(),
        );
        let controller = ScanController::new(db, user, requester, worker);
        let available = self.camera.as_ref().is_some_and(|feed| feed.available);
        controller.on_event(&AcquisitionEvent::CameraAvailable(available));
        controller
    }
}
