//! Flat-file image storage under the uploads root.
//!
//! Originals land in `original/`, vendor output in `generated/`. Names carry
//! a millisecond timestamp plus a process-local sequence number, so
//! concurrent writes never collide.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::Utc;

pub const ORIGINAL_DIR: &str = "original";
pub const GENERATED_DIR: &str = "generated";

pub struct ImageStore {
    root: PathBuf,
    seq: AtomicU64,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the `original/` and `generated/` trees if they don't exist.
    pub async fn ensure_dirs(&self) -> Result<()> {
        for dir in [ORIGINAL_DIR, GENERATED_DIR] {
            let path = self.root.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .with_context(|| format!("creating uploads directory {}", path.display()))?;
        }
        Ok(())
    }

    fn unique_name(&self, suffix: &str) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", Utc::now().timestamp_millis(), seq, suffix)
    }

    /// Persist an uploaded image; returns its path relative to the root.
    pub async fn save_original(&self, file_name: &str, bytes: &[u8]) -> Result<String> {
        let name = self.unique_name(&sanitize_file_name(file_name));
        let rel = format!("{ORIGINAL_DIR}/{name}");
        tokio::fs::write(self.root.join(&rel), bytes)
            .await
            .with_context(|| format!("writing {rel}"))?;
        Ok(rel)
    }

    /// Persist vendor output for an item; returns its path relative to the root.
    pub async fn save_generated(&self, item_id: i64, bytes: &[u8]) -> Result<String> {
        let name = self.unique_name(&format!("generated-{item_id}.png"));
        let rel = format!("{GENERATED_DIR}/{name}");
        tokio::fs::write(self.root.join(&rel), bytes)
            .await
            .with_context(|| format!("writing {rel}"))?;
        Ok(rel)
    }

    pub async fn load(&self, rel_path: &str) -> Result<Vec<u8>> {
        tokio::fs::read(self.root.join(rel_path))
            .await
            .with_context(|| format!("reading {rel_path}"))
    }

    /// Resolve a `{folder}/{filename}` pair to a path inside the store.
    /// Rejects unknown folders and traversal attempts.
    pub fn resolve(&self, folder: &str, file_name: &str) -> Option<PathBuf> {
        if folder != ORIGINAL_DIR && folder != GENERATED_DIR {
            return None;
        }
        if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.contains("..") {
            return None;
        }
        Some(self.root.join(folder).join(file_name))
    }
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        let rel = store.save_original("shirt.jpg", b"jpeg-bytes").await.unwrap();
        assert!(rel.starts_with("original/"));
        assert!(rel.ends_with("shirt.jpg"));

        let bytes = store.load(&rel).await.unwrap();
        assert_eq!(bytes, b"jpeg-bytes");
    }

    #[tokio::test]
    async fn test_unique_names_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        let a = store.save_original("same.jpg", b"a").await.unwrap();
        let b = store.save_original("same.jpg", b"b").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_generated_name_carries_item_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        let rel = store.save_generated(42, b"png-bytes").await.unwrap();
        assert!(rel.starts_with("generated/"));
        assert!(rel.ends_with("generated-42.png"));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let store = ImageStore::new("/tmp/uploads");

        assert!(store.resolve("original", "ok.jpg").is_some());
        assert!(store.resolve("generated", "ok.png").is_some());
        assert!(store.resolve("original", "../secret").is_none());
        assert!(store.resolve("original", "a/b.jpg").is_none());
        assert!(store.resolve("original", "").is_none());
        assert!(store.resolve("elsewhere", "ok.jpg").is_none());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("shirt.jpg"), "shirt.jpg");
        assert_eq!(sanitize_file_name("my shirt (1).jpg"), "my_shirt__1_.jpg");
        assert_eq!(sanitize_file_name("äö"), "upload");
    }
}
