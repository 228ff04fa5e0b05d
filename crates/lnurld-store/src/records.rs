use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// File-backed record store.
///
/// Keys are `/`-separated relative paths such as `raffles/3vQB7/draw.csv`.
/// Each segment is restricted to ASCII alphanumerics plus `-`, `_` and `.`.
#[derive(Debug, Clone)]
pub struct RecordStore {
    base_path: PathBuf,
}

impl RecordStore {
    pub async fn new(base_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_path).await?;
        info!(path = %base_path.display(), "Record store initialized");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Append one line to the record at `key`, creating it if missing.
    ///
    /// The line is written with a single append so concurrent appenders never
    /// interleave within a line.
    pub async fn append_line(&self, key: &str, line: &str) -> Result<()> {
        if line.contains('\n') {
            return Err(StoreError::InvalidKey(format!(
                "line for {key} contains a newline"
            )));
        }
        let path = self.resolve(key)?;
        ensure_parent(&path).await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.sync_data().await?;

        debug!(key, "Appended line");
        Ok(())
    }

    /// Create the record at `key` with `lines`, failing with
    /// [`StoreError::AlreadyExists`] if it is already present.
    ///
    /// Content is written to a temporary file first and then hard-linked into
    /// place, so readers never observe a partially written record.
    pub async fn create_exclusive(&self, key: &str, lines: &[String]) -> Result<()> {
        let mut content = String::new();
        for line in lines {
            content.push_str(line);
            content.push('\n');
        }
        self.create_exclusive_bytes(key, content.as_bytes()).await
    }

    async fn create_exclusive_bytes(&self, key: &str, content: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        let parent = ensure_parent(&path).await?;
        let temp = parent.join(format!(".{}.tmp", Uuid::new_v4()));

        let result = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(content).await?;
            file.sync_all().await?;
            drop(file);
            fs::hard_link(&temp, &path).await
        }
        .await;

        if let Err(e) = fs::remove_file(&temp).await {
            warn!(path = %temp.display(), error = %e, "Failed to remove temporary record");
        }

        match result {
            Ok(()) => {
                debug!(key, "Created record");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Non-empty lines of the record at `key`; a missing record has none.
    pub async fn read_lines(&self, key: &str) -> Result<Vec<String>> {
        let path = self.resolve(key)?;
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    /// Exclusively create a JSON record.
    pub async fn create_object<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        self.create_exclusive_bytes(key, &json).await
    }

    pub async fn read_object<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of the sub-directories under `key`, sorted.
    pub async fn list_dirs(&self, key: &str) -> Result<Vec<String>> {
        let path = self.resolve(key)?;
        let mut entries = match fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_segment(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Map a key to a path inside the base directory.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || !key.split('/').all(is_valid_segment) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let path = self.base_path.join(key);
        let escapes = path
            .strip_prefix(&self.base_path)
            .map(|relative| {
                relative
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_)))
            })
            .unwrap_or(true);
        if escapes {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(path)
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

async fn ensure_parent(path: &Path) -> Result<PathBuf> {
    let parent = path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| StoreError::InvalidKey(path.display().to_string()))?;
    fs::create_dir_all(&parent).await?;
    Ok(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn test_store() -> (RecordStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path().to_path_buf()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_append_and_read() {
        let (store, _dir) = test_store().await;
        assert!(store.read_lines("a/log.csv").await.unwrap().is_empty());
        assert!(!store.exists("a/log.csv").await.unwrap());

        store.append_line("a/log.csv", "one").await.unwrap();
        store.append_line("a/log.csv", "two").await.unwrap();

        assert!(store.exists("a/log.csv").await.unwrap());
        assert_eq!(store.read_lines("a/log.csv").await.unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_append_rejects_newline() {
        let (store, _dir) = test_store().await;
        assert!(store.append_line("log.csv", "a\nb").await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_every_line() {
        let (store, _dir) = test_store().await;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.append_line("log.csv", &format!("line-{i}")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut lines = store.read_lines("log.csv").await.unwrap();
        lines.sort();
        lines.dedup();
        assert_eq!(lines.len(), 32);
    }

    #[tokio::test]
    async fn test_create_exclusive() {
        let (store, dir) = test_store().await;
        let lines = vec!["first".to_string()];
        store.create_exclusive("r/draw.csv", &lines).await.unwrap();

        let err = store
            .create_exclusive("r/draw.csv", &["second".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(store.read_lines("r/draw.csv").await.unwrap(), lines);

        // no temporary files left behind
        let mut entries = std::fs::read_dir(dir.path().join("r")).unwrap();
        assert_eq!(entries.next().unwrap().unwrap().file_name(), "draw.csv");
        assert!(entries.next().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_create_exclusive_has_one_winner() {
        let (store, _dir) = test_store().await;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .create_exclusive("once.csv", &[format!("writer-{i}")])
                        .await
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => winners += 1,
                Err(e) => assert!(e.is_already_exists()),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.read_lines("once.csv").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_objects() {
        let (store, _dir) = test_store().await;
        let missing: Option<Vec<u32>> = store.read_object("obj.json").await.unwrap();
        assert!(missing.is_none());

        store.create_object("obj.json", &vec![1u32, 2, 3]).await.unwrap();
        let value: Option<Vec<u32>> = store.read_object("obj.json").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
        assert!(store.create_object("obj.json", &vec![4u32]).await.is_err());
    }

    #[tokio::test]
    async fn test_list_dirs() {
        let (store, _dir) = test_store().await;
        assert!(store.list_dirs("raffles").await.unwrap().is_empty());
        store.append_line("raffles/b/x", "1").await.unwrap();
        store.append_line("raffles/a/x", "1").await.unwrap();
        store.append_line("raffles/file", "1").await.unwrap();
        assert_eq!(store.list_dirs("raffles").await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_invalid_keys() {
        let (store, _dir) = test_store().await;
        for key in ["", "../escape", "a/../../b", "/etc/passwd", "a//b", "a\\b", "a b"] {
            assert!(
                matches!(store.read_lines(key).await, Err(StoreError::InvalidKey(_))),
                "key {key:?} should be rejected"
            );
        }
    }
}
