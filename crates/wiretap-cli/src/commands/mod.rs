pub mod capture;
pub mod spec;

use anyhow::Result;
use wiretap_schema::{ConfigError, ProjectConfig, CONFIG_FILE_NAME};
use wiretap_store::{ProjectPaths, SessionStore};

/// Load `wiretap.yml`. When it is missing, write a starter file, tell the user
/// what to fill in, and return `None`.
pub fn load_or_setup(paths: &ProjectPaths) -> Result<Option<ProjectConfig>> {
    match ProjectConfig::load(&paths.project_root) {
        Ok(config) => Ok(Some(config)),
        Err(ConfigError::Missing { .. }) => {
            let written =
                ProjectConfig::write_skeleton(&paths.project_root, &default_name(paths))?;
            if let Some(path) = written {
                println!("No {CONFIG_FILE_NAME} found, created {}", path.display());
            }
            println!("Set the service host and port (and optionally `command`) there, then run again.");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn init(paths: &ProjectPaths, name: Option<&str>) -> Result<()> {
    let name = name.map(str::to_string).unwrap_or_else(|| default_name(paths));
    match ProjectConfig::write_skeleton(&paths.project_root, &name)? {
        Some(path) => println!("Created {}", path.display()),
        None => println!("{CONFIG_FILE_NAME} already exists, leaving it alone"),
    }
    Ok(())
}

pub async fn sessions(paths: &ProjectPaths) -> Result<()> {
    let store = SessionStore::new(&paths.sessions_dir);
    let ids = store.list_sessions().await?;
    if ids.is_empty() {
        println!("No capture sessions yet. Run `wiretap capture` to record one.");
        return Ok(());
    }
    for id in ids {
        println!("{id}");
    }
    Ok(())
}

fn default_name(paths: &ProjectPaths) -> String {
    paths
        .project_root
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("my-api")
        .to_string()
}
