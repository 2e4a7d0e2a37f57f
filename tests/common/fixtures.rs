use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use crackcam::capture::{AcquisitionEvent, FrameSource};
use crackcam::classify::{Classifier, CrackClassifier};
use crackcam::core::db::{Database, NewUser, User, UserRepository};
use crackcam::core::storage::ImageStore;
use crackcam::detection::CrackParams;
use crackcam::models::Roi;
use crackcam::scan::ClassificationWorker;
use image::{Rgb, RgbImage};

/// Creates a Database in a temporary directory.
/// Returns both the database and the temp directory (which must be kept alive).
pub async fn create_test_db() -> (Database, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let db = Database::open(dir.path().join("nml.db"))
        .await
        .expect("Failed to create test database");
    (db, dir)
}

pub fn make_new_user(first: &str, last: &str, email: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
    }
}

pub async fn add_test_user(db: &Database) -> User {
    db.add_user(make_new_user("Jane", "Doe", "jane@example.com"))
        .await
        .expect("Failed to add test user")
}

/// 640x480 light-grey frame with a dark diagonal "crack" through the
/// default region of interest.
pub fn crack_frame() -> RgbImage {
    let mut img = RgbImage::from_pixel(640, 480, Rgb([180, 180, 180]));
    for x in 150u32..420 {
        for t in 0..3u32 {
            let y = x + 50 + t;
            if y < 480 {
                img.put_pixel(x, y, Rgb([40, 40, 40]));
            }
        }
    }
    img
}

pub fn plain_frame(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
}

pub fn save_image(img: &RgbImage, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).expect("Failed to save test image");
    path
}

/// In-memory camera. Counts every read.
pub struct StubSource {
    pub frames: Vec<RgbImage>,
    pub fail_open: bool,
    pub looped: bool,
    pub reads: Arc<AtomicUsize>,
    next: usize,
}

impl StubSource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames,
            fail_open: false,
            looped: false,
            reads: Arc::new(AtomicUsize::new(0)),
            next: 0,
        }
    }

    pub fn looped(mut self) -> Self {
        self.looped = true;
        self
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }
}

impl FrameSource for StubSource {
    fn open(&mut self) -> anyhow::Result<()> {
        if self.fail_open {
            anyhow::bail!("no such device");
        }
        Ok(())
    }

    fn read_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.next >= self.frames.len() {
            if !self.looped || self.frames.is_empty() {
                return Ok(None);
            }
            self.next = 0;
        }
        let frame = self.frames[self.next].clone();
        self.next += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {}
}

/// Always answers the same probability.
pub struct FixedClassifier(pub f32);

impl Classifier for FixedClassifier {
    fn predict(&self, _input: &[f32]) -> anyhow::Result<f32> {
        Ok(self.0)
    }
}

pub fn make_worker(db: &Database, store: &ImageStore, probability: f32) -> ClassificationWorker {
    make_worker_with_roi(db, store, probability, Roi::default())
}

pub fn make_worker_with_roi(
    db: &Database,
    store: &ImageStore,
    probability: f32,
    roi: Roi,
) -> ClassificationWorker {
    ClassificationWorker::new(
        db.clone(),
        store.clone(),
        roi,
        CrackParams::default(),
        CrackClassifier::new(Arc::new(FixedClassifier(probability)), 0.5),
    )
}

/// Receive events until `pred` matches one, or panic after `timeout`.
pub fn wait_for(
    events: &Receiver<AcquisitionEvent>,
    timeout: Duration,
    mut pred: impl FnMut(&AcquisitionEvent) -> bool,
) -> Vec<AcquisitionEvent> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = events
            .recv_timeout(remaining)
            .expect("Timed out waiting for acquisition event");
        let done = pred(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}
