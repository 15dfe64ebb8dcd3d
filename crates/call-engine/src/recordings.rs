//! Recording blob store
//!
//! Recordings are WAV files laid out as
//! `{tenant_id}/{campaign_id}/{call_id}.wav` under a base directory. Path
//! components are sanitised so an id can never escape its directory.
//! Writes are best-effort with bounded retries: a lost recording is
//! logged and accepted, it must never stall call finalisation.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{EngineError, EngineResult};

/// Write attempts before giving up
const WRITE_ATTEMPTS: u32 = 3;

/// Filesystem-backed recording store.
pub struct RecordingStore {
    base_dir: PathBuf,
}

impl RecordingStore {
    /// Store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Relative path a call's recording lives at.
    pub fn relative_path(tenant_id: &str, campaign_id: &str, call_id: &str) -> String {
        format!(
            "{}/{}/{}.wav",
            sanitize(tenant_id),
            sanitize(campaign_id),
            sanitize(call_id)
        )
    }

    /// Absolute path under the base directory.
    pub fn full_path(&self, tenant_id: &str, campaign_id: &str, call_id: &str) -> PathBuf {
        self.base_dir
            .join(Self::relative_path(tenant_id, campaign_id, call_id))
    }

    /// Persist WAV bytes, retrying transient failures.
    ///
    /// Returns the relative path on success.
    pub async fn store(
        &self,
        tenant_id: &str,
        campaign_id: &str,
        call_id: &str,
        wav_bytes: &[u8],
    ) -> EngineResult<String> {
        let relative = Self::relative_path(tenant_id, campaign_id, call_id);
        let full = self.base_dir.join(&relative);

        let mut last_error = None;
        for attempt in 1..=WRITE_ATTEMPTS {
            match write_file(&full, wav_bytes).await {
                Ok(()) => return Ok(relative),
                Err(e) => {
                    warn!(path = %full.display(), attempt, error = %e, "recording write failed");
                    last_error = Some(e);
                }
            }
        }
        Err(EngineError::Recording(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown write failure".to_string()),
        ))
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

/// Strip path separators and other hostile characters from an id.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '/' | '\\' | '.' | ':' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_scheme() {
        assert_eq!(
            RecordingStore::relative_path("t1", "c1", "call-9"),
            "t1/c1/call-9.wav"
        );
    }

    #[test]
    fn hostile_ids_are_sanitised() {
        let path = RecordingStore::relative_path("../evil", "c\\1", "call:1");
        assert_eq!(path, "___evil/c_1/call_1.wav");
        assert!(!path.contains('\\'));
        assert!(!path.contains(".."));
    }

    #[tokio::test]
    async fn stores_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::new(dir.path());

        let relative = store
            .store("t1", "c1", "call-1", b"RIFFfakewav")
            .await
            .unwrap();
        assert_eq!(relative, "t1/c1/call-1.wav");

        let full = store.full_path("t1", "c1", "call-1");
        let bytes = tokio::fs::read(full).await.unwrap();
        assert_eq!(bytes, b"RIFFfakewav");
    }
}
