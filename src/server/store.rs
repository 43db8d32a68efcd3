//! Per-request output storage.
//!
//! Every style request writes into its own `<root>/<uuid>/` directory, so
//! concurrent requests never collide. After each request the oldest request
//! directories beyond the retention count are removed.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::codec::OutputFormat;
use crate::EncodedVariant;

/// Route under which stored files are served.
pub const OUTPUTS_ROUTE: &str = "/outputs";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoredVariant {
    pub clusters: usize,
    pub path: String,
    pub palette: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct OutputStore {
    root: PathBuf,
    retained: usize,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>, retained: usize) -> Self {
        Self {
            root: root.into(),
            retained: retained.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    /// Write `variants` under a fresh directory for `request_id`.
    pub async fn persist(
        &self,
        request_id: Uuid,
        variants: &[EncodedVariant],
        format: OutputFormat,
    ) -> io::Result<Vec<StoredVariant>> {
        let dir = self.root.join(request_id.to_string());
        fs::create_dir_all(&dir).await?;

        let mut stored = Vec::with_capacity(variants.len());
        for variant in variants {
            let name = file_name(variant.clusters, format);
            fs::write(dir.join(&name), &variant.bytes).await?;
            stored.push(StoredVariant {
                clusters: variant.clusters,
                path: format!("{OUTPUTS_ROUTE}/{request_id}/{name}"),
                palette: variant.palette.clone(),
            });
        }
        debug!(%request_id, files = stored.len(), "stored variants");
        Ok(stored)
    }

    /// Write the re-encoded upload next to its variants and return its route.
    pub async fn persist_original(
        &self,
        request_id: Uuid,
        bytes: &[u8],
        format: OutputFormat,
    ) -> io::Result<String> {
        let dir = self.root.join(request_id.to_string());
        fs::create_dir_all(&dir).await?;

        let name = original_file_name(format);
        fs::write(dir.join(&name), bytes).await?;
        Ok(format!("{OUTPUTS_ROUTE}/{request_id}/{name}"))
    }

    /// Read a stored file. Anything that is not a `<uuid>/styled_<k>.<ext>`
    /// or `<uuid>/original.<ext>` name resolves to `None`, so no path outside
    /// the store can be reached.
    pub async fn load(
        &self,
        request_id: &str,
        file: &str,
    ) -> io::Result<Option<(Vec<u8>, &'static str)>> {
        let Ok(request_id) = Uuid::parse_str(request_id) else {
            return Ok(None);
        };
        let Some(content_type) = content_type_for(file) else {
            return Ok(None);
        };

        let path = self.root.join(request_id.to_string()).join(file);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some((bytes, content_type))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove the oldest request directories beyond the retention count.
    /// Returns how many were removed.
    pub async fn prune(&self) -> io::Result<usize> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut dirs: Vec<(SystemTime, PathBuf)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_dir() || Uuid::parse_str(&entry.file_name().to_string_lossy()).is_err() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            dirs.push((modified, entry.path()));
        }

        if dirs.len() <= self.retained {
            return Ok(0);
        }

        // Newest first.
        dirs.sort_by(|a, b| b.0.cmp(&a.0));
        let mut removed = 0;
        for (_, path) in dirs.into_iter().skip(self.retained) {
            match fs::remove_dir_all(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        debug!(removed, retained = self.retained, "pruned output directories");
        Ok(removed)
    }
}

pub fn file_name(clusters: usize, format: OutputFormat) -> String {
    format!("styled_{clusters}.{}", format.extension())
}

pub fn original_file_name(format: OutputFormat) -> String {
    format!("original.{}", format.extension())
}

fn content_type_for(file: &str) -> Option<&'static str> {
    let (stem, ext) = file.rsplit_once('.')?;
    if stem != "original" {
        let digits = stem.strip_prefix("styled_")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    OutputFormat::content_type_for_extension(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn variant(clusters: usize) -> EncodedVariant {
        EncodedVariant {
            clusters,
            bytes: vec![clusters as u8; 4],
            palette: vec!["000000".to_string()],
        }
    }

    #[test]
    fn file_names_follow_cluster_count() {
        assert_eq!(file_name(7, OutputFormat::Png), "styled_7.png");
        assert_eq!(content_type_for("styled_12.jpg"), Some("image/jpeg"));
        assert_eq!(content_type_for("styled_.png"), None);
        assert_eq!(content_type_for("../etc/passwd"), None);
        assert_eq!(content_type_for("styled_3.exe"), None);
        assert_eq!(content_type_for("original.png"), Some("image/png"));
        assert_eq!(content_type_for("originals.png"), None);
    }

    #[tokio::test]
    async fn original_is_stored_beside_variants() {
        let tmp = TempDir::new().unwrap();
        let store = OutputStore::new(tmp.path(), 4);
        store.prepare().await.unwrap();

        let id = Uuid::new_v4();
        let path = store
            .persist_original(id, b"raw", OutputFormat::default())
            .await
            .unwrap();
        assert_eq!(path, format!("/outputs/{id}/original.jpg"));

        let (bytes, content_type) = store
            .load(&id.to_string(), "original.jpg")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bytes, b"raw".to_vec());
        assert_eq!(content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn persist_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = OutputStore::new(tmp.path(), 4);
        store.prepare().await.unwrap();

        let id = Uuid::new_v4();
        let stored = store
            .persist(id, &[variant(2), variant(3)], OutputFormat::Png)
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].path, format!("/outputs/{id}/styled_2.png"));

        let (bytes, content_type) = store
            .load(&id.to_string(), "styled_3.png")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bytes, vec![3u8; 4]);
        assert_eq!(content_type, "image/png");
    }

    #[tokio::test]
    async fn load_refuses_foreign_names() {
        let tmp = TempDir::new().unwrap();
        let store = OutputStore::new(tmp.path(), 4);
        store.prepare().await.unwrap();

        assert!(store.load("not-a-uuid", "styled_2.png").await.unwrap().is_none());
        let id = Uuid::new_v4().to_string();
        assert!(store.load(&id, "..").await.unwrap().is_none());
        assert!(store.load(&id, "styled_2.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prune_keeps_retention_count() {
        let tmp = TempDir::new().unwrap();
        let store = OutputStore::new(tmp.path(), 2);
        store.prepare().await.unwrap();

        for _ in 0..5 {
            store
                .persist(Uuid::new_v4(), &[variant(2)], OutputFormat::Png)
                .await
                .unwrap();
        }
        std::fs::create_dir(tmp.path().join("keep-me")).unwrap();

        assert_eq!(store.prune().await.unwrap(), 3);
        let remaining = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(remaining, 3);
        assert!(tmp.path().join("keep-me").exists());
        assert_eq!(store.prune().await.unwrap(), 0);
    }
}
