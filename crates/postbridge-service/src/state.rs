//! Controller state kept on local disk between invocations.

use std::path::{Path, PathBuf};

use postbridge_core::CoreResult;

use crate::verifier::VerificationSummary;

const LAST_VERIFICATION_FILE: &str = "last_verification.json";

/// JSON files under `migration.state_dir`.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn last_verification_path(&self) -> PathBuf {
        self.dir.join(LAST_VERIFICATION_FILE)
    }

    /// Persists the summary of the latest verification.
    pub async fn save_verification(&self, summary: &VerificationSummary) -> CoreResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec_pretty(summary)?;
        let path = self.last_verification_path();
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(path = %path.display(), "verification summary saved");
        Ok(())
    }

    /// Loads the latest verification summary, `None` if none was saved.
    ///
    /// An unreadable file is reported and treated as absent.
    pub async fn load_verification(&self) -> CoreResult<Option<VerificationSummary>> {
        let path = self.last_verification_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(summary) => Ok(Some(summary)),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring corrupt verification state");
                Ok(None)
            }
        }
    }
}
