//! Capture → record → classify coordination for one signed-in user.

mod worker;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::capture::{AcquisitionEvent, CaptureRequest, CaptureRequester};
use crate::core::db::{Database, ImageSession, SessionRepository, User};

pub use worker::{ClassificationOutcome, ClassificationWorker};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("a capture is already in progress")]
    CaptureInProgress,
    #[error("the camera is not available")]
    CameraUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outstanding {
    /// Session row and directories are being prepared.
    Reserving,
    Session(i64),
}

#[derive(Debug, Default)]
struct ScanState {
    camera_available: bool,
    outstanding: Option<Outstanding>,
    classifying: BTreeSet<i64>,
}

struct Inner {
    db: Database,
    user: User,
    requester: CaptureRequester,
    worker: ClassificationWorker,
    state: Mutex<ScanState>,
}

#[derive(Clone)]
pub struct ScanController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ScanController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanController")
            .field("user", &self.inner.user.email)
            .field("state", &*self.state())
            .finish()
    }
}

impl ScanController {
    pub fn new(
        db: Database,
        user: User,
        requester: CaptureRequester,
        worker: ClassificationWorker,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                user,
                requester,
                worker,
                state: Mutex::new(ScanState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ScanState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn user(&self) -> &User {
        &self.inner.user
    }

    pub fn can_capture(&self) -> bool {
        let state = self.state();
        state.camera_available && state.outstanding.is_none()
    }

    pub fn camera_available(&self) -> bool {
        self.state().camera_available
    }

    /// Id of the capture waiting for a frame, if any.
    pub fn outstanding_capture(&self) -> Option<i64> {
        match self.state().outstanding {
            Some(Outstanding::Session(id)) => Some(id),
            _ => None,
        }
    }

    /// A capture is being prepared or awaited, or a classification is running.
    pub fn is_busy(&self) -> bool {
        let state = self.state();
        state.outstanding.is_some() || !state.classifying.is_empty()
    }

    pub fn classifying(&self) -> Vec<i64> {
        self.state().classifying.iter().copied().collect()
    }

    /// Create a `Pending` session and ask the acquisition loop for its frame.
    pub async fn begin_capture(&self, image_name: Option<&str>) -> anyhow::Result<ImageSession> {
        {
            let mut state = self.state();
            if state.outstanding.is_some() {
                return Err(ScanError::CaptureInProgress.into());
            }
            if !state.camera_available {
                return Err(ScanError::CameraUnavailable.into());
            }
            state.outstanding = Some(Outstanding::Reserving);
        }

        let result = self.post_capture(image_name).await;
        if result.is_err() {
            self.state().outstanding = None;
        }
        result
    }

    async fn post_capture(&self, image_name: Option<&str>) -> anyhow::Result<ImageSession> {
        let uuid = &self.inner.user.uuid;
        let store = self.inner.worker.store();
        store.ensure_user_dirs(uuid).await?;
        let session = self.inner.db.add_session(uuid, image_name).await?;
        let request = CaptureRequest {
            session_id: session.session_id,
            path: store.raw_image_path(uuid, session.session_id),
        };
        // The completion may arrive as soon as the request is posted.
        self.state().outstanding = Some(Outstanding::Session(session.session_id));
        if let Err(busy) = self.inner.requester.request(request) {
            self.inner.db.delete_session(session.session_id).await?;
            return Err(busy.into());
        }
        Ok(session)
    }

    /// Feed an acquisition event. Returns the session to classify when its
    /// capture has just completed.
    pub fn on_event(&self, event: &AcquisitionEvent) -> Option<i64> {
        let mut state = self.state();
        match event {
            AcquisitionEvent::CameraAvailable(available) => {
                state.camera_available = *available;
                if let (false, Some(Outstanding::Session(id))) = (*available, state.outstanding) {
                    log::warn!("camera went away before session {} was captured", id);
                    state.outstanding = None;
                }
                None
            }
            AcquisitionEvent::CaptureComplete { session_id, .. } => {
                if state.outstanding == Some(Outstanding::Session(*session_id)) {
                    state.outstanding = None;
                    state.classifying.insert(*session_id);
                    Some(*session_id)
                } else {
                    log::warn!("ignoring capture for unexpected session {}", session_id);
                    None
                }
            }
            AcquisitionEvent::CaptureFailed { session_id, reason } => {
                log::warn!("capture for session {} failed: {}", session_id, reason);
                if state.outstanding == Some(Outstanding::Session(*session_id)) {
                    state.outstanding = None;
                }
                None
            }
            AcquisitionEvent::Frame(_) | AcquisitionEvent::Error(_) => None,
        }
    }

    /// Run the classification worker for a captured session.
    pub async fn classify(&self, session_id: i64) -> anyhow::Result<ClassificationOutcome> {
        let result = self
            .inner
            .worker
            .run(&self.inner.user.uuid, session_id)
            .await;
        self.state().classifying.remove(&session_id);
        if let Err(e) = &result {
            log::error!("classification of session {} failed: {:#}", session_id, e);
        }
        result
    }
}
