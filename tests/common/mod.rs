#![allow(dead_code)]
#![allow(unused_imports)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from crackcam for tests
pub use crackcam::capture::{
    AcquisitionEvent, AcquisitionHandle, AcquisitionLoop, CameraError, CaptureBusy, CaptureRequest,
    FrameCorrection, FrameSource,
};
pub use crackcam::core::db::{
    CrackStatus, Database, DbError, ImageSession, NewUser, SampleLabel, SampleRepository,
    SessionRepository, User, UserRepository,
};
pub use crackcam::core::storage::{DerivativeKind, ImageStore};
pub use crackcam::scan::{ClassificationWorker, ScanController, ScanError};
