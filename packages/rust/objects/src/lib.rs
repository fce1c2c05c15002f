//! Read access to the training-content object store.
//!
//! Ingestion writes one prefix per course into the bucket:
//!
//! ```text
//! <course_id>/manifest.json
//! <course_id>/images/page_<n>.png
//! ```
//!
//! Graph sync only ever reads. [`FsObjectStore`] serves a plain directory
//! mirror of the bucket: one directory per bucket, one file per object.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use curricula_shared::{CurriculaError, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Read-only view over a bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Immediate child prefixes of `prefix`, each ending in `/`, sorted.
    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>>;

    /// All object keys under `prefix` (recursive), sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Fetch an object. `Ok(None)` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

/// A bucket stored as a directory tree.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    bucket_dir: PathBuf,
}

impl FsObjectStore {
    /// Open bucket `bucket` under `root`. The bucket directory must exist.
    pub fn open(root: &Path, bucket: &str) -> Result<Self> {
        let bucket_dir = root.join(bucket);
        if !bucket_dir.is_dir() {
            return Err(CurriculaError::ObjectStore(format!(
                "bucket directory not found: {}",
                bucket_dir.display()
            )));
        }
        Ok(Self { bucket_dir })
    }

    /// Resolve a key or prefix to a path inside the bucket.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(CurriculaError::ObjectStore(format!(
                "invalid object key: {key}"
            )));
        }
        Ok(self.bucket_dir.join(rel))
    }
}

/// Turn a filesystem path under the bucket into a `/`-separated key.
fn to_key(bucket_dir: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(bucket_dir).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix)?;
        let bucket_dir = self.bucket_dir.clone();

        tokio::task::spawn_blocking(move || {
            if !dir.is_dir() {
                return Ok(Vec::new());
            }
            let mut prefixes = Vec::new();
            for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).follow_links(false) {
                match entry {
                    Ok(entry) if entry.file_type().is_dir() => {
                        if let Some(key) = to_key(&bucket_dir, entry.path()) {
                            prefixes.push(format!("{key}/"));
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "skipping unreadable entry"),
                }
            }
            prefixes.sort();
            Ok(prefixes)
        })
        .await
        .map_err(|e| CurriculaError::ObjectStore(format!("listing task failed: {e}")))?
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix)?;
        let bucket_dir = self.bucket_dir.clone();

        let keys = tokio::task::spawn_blocking(move || {
            if !dir.exists() {
                return Vec::new();
            }
            let mut keys = Vec::new();
            for entry in WalkDir::new(&dir).follow_links(false) {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        if let Some(key) = to_key(&bucket_dir, entry.path()) {
                            keys.push(key);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "skipping unreadable entry"),
                }
            }
            keys.sort();
            keys
        })
        .await
        .map_err(|e| CurriculaError::ObjectStore(format!("listing task failed: {e}")))?;

        debug!(prefix, count = keys.len(), "listed objects");
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CurriculaError::io(path, e)),
        }
    }

    fn location(&self) -> String {
        self.bucket_dir.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn bucket() -> (PathBuf, FsObjectStore) {
        let root = std::env::temp_dir().join(format!("curricula_objects_{}", Uuid::now_v7()));
        let dir = root.join("training-content");
        std::fs::create_dir_all(dir.join("c1/images")).unwrap();
        std::fs::create_dir_all(dir.join("c2")).unwrap();
        std::fs::write(dir.join("c1/manifest.json"), b"{}").unwrap();
        std::fs::write(dir.join("c1/images/page_1.png"), b"png").unwrap();
        std::fs::write(dir.join("c1/images/page_2.png"), b"png").unwrap();
        std::fs::write(dir.join("c2/manifest.json"), b"{}").unwrap();
        std::fs::write(dir.join("stray.txt"), b"x").unwrap();
        let store = FsObjectStore::open(&root, "training-content").unwrap();
        (root, store)
    }

    #[test]
    fn missing_bucket_is_an_error() {
        let root = std::env::temp_dir().join(format!("curricula_objects_{}", Uuid::now_v7()));
        assert!(FsObjectStore::open(&root, "training-content").is_err());
    }

    #[tokio::test]
    async fn lists_course_prefixes() {
        let (_root, store) = bucket();
        assert_eq!(store.list_prefixes("").await.unwrap(), vec!["c1/", "c2/"]);
        assert_eq!(store.list_prefixes("c1/").await.unwrap(), vec!["c1/images/"]);
        assert!(store.list_prefixes("nope/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_keys_recursively() {
        let (_root, store) = bucket();
        assert_eq!(
            store.list("c1/").await.unwrap(),
            vec!["c1/images/page_1.png", "c1/images/page_2.png", "c1/manifest.json"]
        );
        assert_eq!(
            store.list("c1/images/").await.unwrap(),
            vec!["c1/images/page_1.png", "c1/images/page_2.png"]
        );
    }

    #[tokio::test]
    async fn get_returns_none_for_missing_key() {
        let (_root, store) = bucket();
        assert_eq!(store.get("c2/manifest.json").await.unwrap(), Some(b"{}".to_vec()));
        assert_eq!(store.get("c2/images/page_1.png").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let (_root, store) = bucket();
        assert!(store.get("../secret").await.is_err());
        assert!(store.list("c1/../../").await.is_err());
    }
}
