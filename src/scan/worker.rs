use std::path::PathBuf;

use anyhow::Context;

use crate::classify::{CrackClassifier, Verdict};
use crate::core::db::{CrackStatus, Database, ImageSession, SessionRepository};
use crate::core::storage::{DerivativeKind, ImageStore};
use crate::detection::{self, CrackParams};
use crate::models::Roi;

#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    pub session: ImageSession,
    pub verdict: Verdict,
    pub highlighted_path: PathBuf,
    pub cropped_path: PathBuf,
}

/// Crops, classifies and annotates one captured frame, then records the outcome.
#[derive(Debug, Clone)]
pub struct ClassificationWorker {
    db: Database,
    store: ImageStore,
    roi: Roi,
    params: CrackParams,
    classifier: CrackClassifier,
}

impl ClassificationWorker {
    pub fn new(
        db: Database,
        store: ImageStore,
        roi: Roi,
        params: CrackParams,
        classifier: CrackClassifier,
    ) -> Self {
        Self {
            db,
            store,
            roi,
            params,
            classifier,
        }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Any failure leaves the session `Pending`.
    pub async fn run(&self, user_uuid: &str, session_id: i64) -> anyhow::Result<ClassificationOutcome> {
        let raw_path = self.store.raw_image_path(user_uuid, session_id);
        let cropped_path = self
            .store
            .derivative_path(user_uuid, session_id, DerivativeKind::Cropped);
        let highlighted_path = self
            .store
            .derivative_path(user_uuid, session_id, DerivativeKind::Highlighted);

        let verdict = {
            let roi = self.roi;
            let params = self.params.clone();
            let classifier = self.classifier.clone();
            let cropped_path = cropped_path.clone();
            let highlighted_path = highlighted_path.clone();
            tokio::task::spawn_blocking(move || -> anyhow::Result<Verdict> {
                let raw = image::open(&raw_path)
                    .with_context(|| format!("Failed to open capture {:?}", raw_path))?;
                let crop = roi.crop(&raw)?;
                crop.to_rgb8()
                    .save(&cropped_path)
                    .with_context(|| format!("Failed to write {:?}", cropped_path))?;

                let verdict = classifier.classify(&crop)?;

                detection::highlight(&crop, &params)?
                    .to_rgb8()
                    .save(&highlighted_path)
                    .with_context(|| format!("Failed to write {:?}", highlighted_path))?;
                Ok(verdict)
            })
            .await??
        };

        let session = self
            .db
            .set_crack_status(session_id, CrackStatus::from_detection(verdict.crack))
            .await?;
        log::info!(
            "session {} classified as {} (p={:.3})",
            session_id,
            session.crack_status.as_str(),
            verdict.probability
        );
        Ok(ClassificationOutcome {
            session,
            verdict,
            highlighted_path,
            cropped_path,
        })
    }
}
