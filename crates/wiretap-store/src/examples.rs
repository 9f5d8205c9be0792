use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::fs::{read_json, validate_id, write_json};

/// Example request bodies recorded by the UI, one JSON array per request id.
#[derive(Debug, Clone)]
pub struct ExampleStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl ExampleStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn path(&self, request_id: &str) -> PathBuf {
        self.dir.join(format!("{request_id}.json"))
    }

    pub async fn list(&self, request_id: &str) -> Result<Vec<serde_json::Value>> {
        validate_id(request_id)?;
        let path = self.path(request_id);
        match read_json::<serde_json::Value>(&path).await? {
            None => Ok(Vec::new()),
            Some(serde_json::Value::Array(items)) => Ok(items),
            Some(_) => Err(StoreError::corrupt(path, "expected a JSON array of examples")),
        }
    }

    /// Push one example onto the request's array and rewrite it.
    pub async fn append(&self, request_id: &str, example: serde_json::Value) -> Result<()> {
        validate_id(request_id)?;
        let _guard = self.write_lock.lock().await;
        let mut examples = self.list(request_id).await?;
        examples.push(example);
        write_json(&self.path(request_id), &examples).await
    }
}
