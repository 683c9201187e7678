//! Artifact persistence
//!
//! Write-once sink for generated images. Files land in the configured
//! directory as `gen_{id}_{seed}.{ext}`; the returned location string is the
//! path the caller can surface as a URL. Nothing is written until the
//! upstream call has fully succeeded, so a partial artifact never exists.

use std::path::PathBuf;

use tracing::debug;
use uuid::Uuid;

/// Filesystem sink for generated images.
#[derive(Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Create the output directory if it does not exist yet.
    pub async fn init(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Persist one artifact and return its location string.
    ///
    /// The filename embeds a short random id plus the seed reported by
    /// upstream, so repeated generations never collide and the seed can be
    /// recovered from the file alone.
    pub async fn save(&self, bytes: &[u8], seed: u64, extension: &str) -> std::io::Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let filename = format!("gen_{}_{}.{}", &id[..10], seed, extension);
        let path = self.dir.join(&filename);
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "artifact saved");
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_writes_bytes_and_returns_location() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());

        let location = store.save(b"fake-png-bytes", 1234, "png").await.unwrap();

        let written = std::fs::read(&location).unwrap();
        assert_eq!(written, b"fake-png-bytes");
    }

    #[tokio::test]
    async fn filename_embeds_seed_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());

        let location = store.save(b"x", 98765, "webp").await.unwrap();
        let filename = location.rsplit('/').next().unwrap();

        assert!(filename.starts_with("gen_"), "got: {filename}");
        assert!(filename.ends_with("_98765.webp"), "got: {filename}");
        // gen_ + 10 hex chars + _seed.ext
        let id_part = &filename["gen_".len().."gen_".len() + 10];
        assert!(id_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn successive_saves_use_distinct_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());

        let first = store.save(b"a", 1, "png").await.unwrap();
        let second = store.save(b"b", 1, "png").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn save_into_missing_directory_fails() {
        let store = ArtifactStore::new(PathBuf::from("/nonexistent/art-proxy-test"));
        let result = store.save(b"x", 1, "png").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn init_creates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/static");
        let store = ArtifactStore::new(nested.clone());

        store.init().await.unwrap();
        assert!(nested.is_dir());
    }
}
