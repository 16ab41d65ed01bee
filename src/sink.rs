//! Export sinks persisting finished artifacts.

use crate::types::{CaptureError, ExportArtifact};
use std::path::PathBuf;
use tracing::info;

/// Accepts a finished artifact and persists it
#[async_trait::async_trait]
pub trait ExportSink: Send + Sync {
    async fn save(&self, artifact: &ExportArtifact, prompt_user: bool) -> Result<(), CaptureError>;
}

/// Writes artifacts into a fixed directory without prompting
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    pub fn path_for(&self, artifact: &ExportArtifact) -> PathBuf {
        self.directory.join(&artifact.suggested_filename)
    }
}

#[async_trait::async_trait]
impl ExportSink for DirectorySink {
    async fn save(&self, artifact: &ExportArtifact, _prompt_user: bool) -> Result<(), CaptureError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.path_for(artifact);
        tokio::fs::write(&path, &artifact.payload).await?;
        info!("Saved {} ({} bytes)", path.display(), artifact.payload.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("out"));
        let artifact = ExportArtifact::jpeg(vec![0xFF, 0xD8, 0xFF], "fullpage.jpg");

        sink.save(&artifact, true).await.unwrap();

        let written = std::fs::read(dir.path().join("out").join("fullpage.jpg")).unwrap();
        assert_eq!(written, vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn test_directory_sink_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().to_path_buf());

        sink.save(&ExportArtifact::pdf(vec![1], "screenshot.pdf"), false)
            .await
            .unwrap();
        sink.save(&ExportArtifact::pdf(vec![2, 2], "screenshot.pdf"), false)
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.path().join("screenshot.pdf")).unwrap(), vec![2, 2]);
    }
}
