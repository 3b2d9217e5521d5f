use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::products::store::StoreState;

pub const SNAPSHOT_KEY: &str = "product-storage";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key: String,
    version: u32,
    state: StoreState,
}

/// Durable copy of the store state, one JSON file per key.
///
/// Saves are tagged with the generation of the state they carry. Only one
/// save touches the file at a time, and a save older than the last one
/// written is dropped, so the file never moves backwards.
#[derive(Debug)]
pub struct SnapshotMirror {
    path: PathBuf,
    written: Mutex<u64>,
}

impl SnapshotMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: Mutex::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last saved state, if there is a readable snapshot of the current version.
    pub async fn load(&self) -> Option<StoreState> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "snapshot read failed");
                return None;
            }
        };

        let envelope: Envelope = match serde_json::from_slice(&raw) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "snapshot is malformed; discarding");
                return None;
            }
        };

        if envelope.key != SNAPSHOT_KEY || envelope.version != SNAPSHOT_VERSION {
            warn!(
                key = %envelope.key,
                version = envelope.version,
                expected = SNAPSHOT_VERSION,
                "snapshot shape mismatch; discarding"
            );
            return None;
        }

        let mut state = envelope.state;
        // the request that set it did not survive the restart
        state.is_loading = false;
        debug!(products = state.products.len(), "snapshot rehydrated");
        Some(state)
    }

    pub async fn save(&self, generation: u64, state: &StoreState) -> Result<(), MirrorError> {
        let mut written = self.written.lock().await;
        if generation <= *written {
            debug!(generation, written = *written, "stale snapshot skipped");
            return Ok(());
        }

        let envelope = Envelope {
            key: SNAPSHOT_KEY.to_string(),
            version: SNAPSHOT_VERSION,
            state: state.clone(),
        };
        let bytes = serde_json::to_vec(&envelope)?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        *written = generation;
        debug!(generation, bytes = bytes.len(), path = %self.path.display(), "snapshot written");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn temp_snapshot_path() -> PathBuf {
    std::env::temp_dir().join(format!("storefront-{}.json", uuid::Uuid::new_v4()))
}
