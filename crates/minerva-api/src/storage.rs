use anyhow::Result;
use rand::Rng;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

/// Manages the on-disk uploads directory for chat multimedia.
///
/// Files are stored flat under `{dir}/{millis}-{nonce}{ext}` and served back
/// at `/uploads/{filename}`.
#[derive(Clone)]
pub struct MediaStorage {
    dir: PathBuf,
}

/// Handle to a freshly written upload.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub url: String,
    pub path: PathBuf,
}

impl MediaStorage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Uploads directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Persist an upload under a collision-resistant generated name. The
    /// original extension is kept so MIME inference keeps working later.
    pub async fn save(&self, original_name: &str, data: &[u8]) -> Result<StoredFile> {
        let ext = std::path::Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();

        let millis = chrono::Utc::now().timestamp_millis();
        let nonce: u32 = rand::rng().random_range(100_000_000..1_000_000_000);
        let filename = format!("{}-{}{}", millis, nonce, ext);

        let path = self.dir.join(&filename);
        fs::write(&path, data).await?;
        info!("Stored upload {} ({} bytes)", filename, data.len());

        Ok(StoredFile {
            url: format!("/uploads/{}", filename),
            filename,
            path,
        })
    }

    /// Delete an upload, tolerating files that are already gone.
    pub async fn remove(&self, filename: &str) -> Result<()> {
        let path = self.dir.join(filename);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Upload {} already gone", filename);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_keeps_extension_and_roundtrips() {
        let dir = std::env::temp_dir().join(format!("minerva-storage-{}", std::process::id()));
        let storage = MediaStorage::new(dir.clone()).await.unwrap();

        let stored = storage.save("Foto de la Obra.JPG", b"not really a jpeg").await.unwrap();
        assert!(stored.filename.ends_with(".jpg"));
        assert_eq!(stored.url, format!("/uploads/{}", stored.filename));
        assert_eq!(fs::read(&stored.path).await.unwrap(), b"not really a jpeg");

        storage.remove(&stored.filename).await.unwrap();
        // second remove is a no-op
        storage.remove(&stored.filename).await.unwrap();

        fs::remove_dir_all(dir).await.unwrap();
    }
}
