use std::path::{Path, PathBuf};

pub const DATA_DIR_NAME: &str = ".wiretap";

/// Where a project's persisted state lives, all under `<project>/.wiretap/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub project_root: PathBuf,
    pub data_dir: PathBuf,
    pub spec_store_path: PathBuf,
    pub sessions_dir: PathBuf,
    pub captures_dir: PathBuf,
    pub example_requests_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl ProjectPaths {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        let project_root = project_root.as_ref().to_path_buf();
        let data_dir = project_root.join(DATA_DIR_NAME);
        Self {
            spec_store_path: data_dir.join("api").join("specification.json"),
            sessions_dir: data_dir.join("sessions"),
            captures_dir: data_dir.join("captures"),
            example_requests_dir: data_dir.join("example-requests"),
            logs_dir: data_dir.join("logs"),
            data_dir,
            project_root,
        }
    }

    pub fn capture_dir(&self, capture_id: &str) -> PathBuf {
        self.captures_dir.join(capture_id)
    }
}
