use std::path::Path;

use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Ids double as file names, so anything that could escape the directory is refused.
pub(crate) fn validate_id(id: &str) -> Result<()> {
    let bad = id.is_empty()
        || id == "."
        || id.contains("..")
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0');
    if bad {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

pub(crate) async fn exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| StoreError::storage(path, e))
}

/// Read and parse a JSON document. A missing file is `Ok(None)`.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::storage(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::corrupt(path, e))
}

/// Replace `path` in one step: write a sibling temp file, then rename over the target.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::storage(path, std::io::ErrorKind::InvalidInput.into()))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| StoreError::storage(parent, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");
    let tmp = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));
    if let Err(e) = tokio::fs::write(&tmp, contents).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::storage(&tmp, e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::storage(path, e));
    }
    Ok(())
}

pub(crate) async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| StoreError::corrupt(path, e))?;
    write_atomic(path, &json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_ids_that_escape_the_directory() {
        for bad in ["", ".", "..", "../x", "a/b", "a\\b", "x..y"] {
            assert!(validate_id(bad).is_err(), "{bad:?} should be rejected");
        }
        for good in ["2024-sess1", "abc", "20240101T000000000-deadbeef"] {
            assert!(validate_id(good).is_ok(), "{good:?} should be accepted");
        }
    }

    #[tokio::test]
    async fn write_atomic_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/doc.json");
        write_atomic(&path, b"[1]").await.unwrap();
        write_atomic(&path, b"[1,2]").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1,2]");
        let names: Vec<_> = std::fs::read_dir(tmp.path().join("nested"))
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["doc.json".to_string()]);
    }

    #[tokio::test]
    async fn read_json_distinguishes_missing_and_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.json");
        let missing: Option<serde_json::Value> = read_json(&path).await.unwrap();
        assert!(missing.is_none());

        std::fs::write(&path, "{not json").unwrap();
        let err = read_json::<serde_json::Value>(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptState { .. }));
    }
}
