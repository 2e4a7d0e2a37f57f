//! On-disk layout of captured images.
//!
//! ```text
//! <root>/<user_uuid>/raw/<session_id>.jpg
//! <root>/<user_uuid>/complete/<session_id>.jpg          highlighted
//! <root>/<user_uuid>/complete/<session_id>-cropped.jpg  plain ROI crop
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::core::db::CrackStatus;

/// Which derivative of a capture to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeKind {
    Highlighted,
    Cropped,
}

impl DerivativeKind {
    pub fn toggled(self) -> Self {
        match self {
            DerivativeKind::Highlighted => DerivativeKind::Cropped,
            DerivativeKind::Cropped => DerivativeKind::Highlighted,
        }
    }

    /// Cracks open on the highlighted view, everything else on the crop.
    pub fn for_status(status: CrackStatus) -> Self {
        match status {
            CrackStatus::Crack => DerivativeKind::Highlighted,
            CrackStatus::NoCrack | CrackStatus::Pending => DerivativeKind::Cropped,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DerivativeKind::Highlighted => "highlighted",
            DerivativeKind::Cropped => "cropped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn user_dir(&self, user_uuid: &str) -> PathBuf {
        self.root.join(user_uuid)
    }

    pub fn raw_dir(&self, user_uuid: &str) -> PathBuf {
        self.user_dir(user_uuid).join("raw")
    }

    pub fn complete_dir(&self, user_uuid: &str) -> PathBuf {
        self.user_dir(user_uuid).join("complete")
    }

    /// Create `raw/` and `complete/` for a user. Existing directories are left as they are.
    pub async fn ensure_user_dirs(&self, user_uuid: &str) -> anyhow::Result<()> {
        for dir in [self.raw_dir(user_uuid), self.complete_dir(user_uuid)] {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create image directory {:?}", dir))?;
        }
        Ok(())
    }

    pub fn raw_image_path(&self, user_uuid: &str, session_id: i64) -> PathBuf {
        self.raw_dir(user_uuid).join(format!("{}.jpg", session_id))
    }

    pub fn derivative_path(&self, user_uuid: &str, session_id: i64, kind: DerivativeKind) -> PathBuf {
        let file_name = match kind {
            DerivativeKind::Highlighted => format!("{}.jpg", session_id),
            DerivativeKind::Cropped => format!("{}-cropped.jpg", session_id),
        };
        self.complete_dir(user_uuid).join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivative_names() {
        let store = ImageStore::new("nml_img");
        assert_eq!(
            store.derivative_path("u1", 42, DerivativeKind::Highlighted),
            PathBuf::from("nml_img/u1/complete/42.jpg")
        );
        assert_eq!(
            store.derivative_path("u1", 42, DerivativeKind::Cropped),
            PathBuf::from("nml_img/u1/complete/42-cropped.jpg")
        );
        assert_eq!(
            store.raw_image_path("u1", 42),
            PathBuf::from("nml_img/u1/raw/42.jpg")
        );
    }

    #[test]
    fn toggling_swaps_views() {
        assert_eq!(DerivativeKind::Highlighted.toggled(), DerivativeKind::Cropped);
        assert_eq!(DerivativeKind::Cropped.toggled().toggled(), DerivativeKind::Cropped);
        assert_eq!(
            DerivativeKind::for_status(CrackStatus::Crack),
            DerivativeKind::Highlighted
        );
    }
}
