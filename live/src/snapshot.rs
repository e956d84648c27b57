use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use firesight_common::frame::LiveFrame;
use firesight_common::models::CameraId;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to create snapshot directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("failed to write snapshot {0}: {1}")]
    Write(String, std::io::Error),
}

/// Mirrors the latest frame of each tile to `{dir}/camera-{id}.jpg`.
///
/// Each write goes to a temporary file that is renamed into place, so a
/// reader never sees a half-written frame.
#[derive(Debug, Clone)]
pub struct SnapshotSink {
    dir: PathBuf,
}

impl SnapshotSink {
    pub async fn create(dir: &Path) -> Result<Self, SnapshotError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| SnapshotError::CreateDir(dir.display().to_string(), e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, camera_id: CameraId) -> PathBuf {
        self.dir.join(format!("camera-{camera_id}.jpg"))
    }

    pub async fn write(&self, camera_id: CameraId, frame: &LiveFrame) -> Result<(), SnapshotError> {
        let path = self.path_for(camera_id);
        let tmp = path.with_extension("jpg.tmp");
        tokio::fs::write(&tmp, &frame.data)
            .await
            .map_err(|e| SnapshotError::Write(tmp.display().to_string(), e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| SnapshotError::Write(path.display().to_string(), e))?;
        debug!(%camera_id, seq = frame.seq, bytes = frame.len(), "snapshot written");
        Ok(())
    }

    /// Remove the snapshot of `camera_id`. A missing file is not an error.
    pub async fn release(&self, camera_id: CameraId) {
        let path = self.path_for(camera_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(%camera_id, "snapshot released"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove snapshot"),
        }
    }
}
