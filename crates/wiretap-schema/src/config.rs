use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

pub const CONFIG_FILE_NAME: &str = "wiretap.yml";

pub const ENV_ENABLE_CHROME: &str = "WIRETAP_ENABLE_CHROME";
pub const ENV_ENABLE_CAPTURE_BODY: &str = "WIRETAP_ENABLE_CAPTURE_BODY";
pub const ENV_ENABLE_TRANSPARENT_PROXY: &str = "WIRETAP_ENABLE_TRANSPARENT_PROXY";

/// Injected into the subprocess so the service under test knows where to bind.
pub const ENV_API_HOST: &str = "WIRETAP_API_HOST";
pub const ENV_API_PORT: &str = "WIRETAP_API_PORT";

pub const DEFAULT_IGNORE_RULES: &[&str] = &[
    "OPTIONS (.*)",
    "HEAD (.*)",
    "GET (.*).htm",
    "GET (.*).html",
    "GET (.*).ico",
    "GET (.*).css",
    "GET (.*).js",
    "GET (.*).woff",
    "GET (.*).woff2",
    "GET (.*).png",
    "GET (.*).jpg",
    "GET (.*).jpeg",
    "GET (.*).svg",
    "GET (.*).gif",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no {file} found in {}", dir.display())]
    Missing { file: &'static str, dir: PathBuf },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

impl ServiceConfig {
    pub fn url(&self) -> Result<Url, ConfigError> {
        let raw = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&raw).map_err(|e| ConfigError::Invalid(format!("service target {raw}: {e}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub command: Option<String>,
    pub service: ServiceConfig,
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub ignore_requests: Option<Vec<String>>,
}

impl ProjectConfig {
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let path = project_root.join(CONFIG_FILE_NAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::Missing {
                    file: CONFIG_FILE_NAME,
                    dir: project_root.to_path_buf(),
                })
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        let config: ProjectConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.service.url()?;
        if self.proxy.port == self.service.port && self.proxy.host == self.service.host {
            return Err(ConfigError::Invalid(format!(
                "proxy and service both use {}:{}",
                self.proxy.host, self.proxy.port
            )));
        }
        if let Some(command) = &self.command {
            if command.trim().is_empty() {
                return Err(ConfigError::Invalid("command must not be blank".into()));
            }
        }
        Ok(())
    }

    pub fn ignore_rules(&self) -> Vec<String> {
        match &self.ignore_requests {
            Some(rules) => rules.clone(),
            None => DEFAULT_IGNORE_RULES.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Write a starter `wiretap.yml` unless one exists. Returns the path when written.
    pub fn write_skeleton(project_root: &Path, name: &str) -> Result<Option<PathBuf>, ConfigError> {
        let path = project_root.join(CONFIG_FILE_NAME);
        if path.exists() {
            return Ok(None);
        }
        let name = serde_yaml::to_string(name)
            .map_err(|e| ConfigError::Invalid(format!("api name {name:?}: {e}")))?;
        let name = name.trim_end();
        let skeleton = format!(
            "name: {name}\n\n# command to start your API, it will receive {ENV_API_HOST} and {ENV_API_PORT}\n# command: npm start\n\nservice:\n  host: localhost\n  port: 3005\n  protocol: http\n\nproxy:\n  host: localhost\n  port: 3000\n"
        );
        std::fs::write(&path, skeleton).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Some(path))
    }
}

/// Capture behavior toggled through the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureFlags {
    pub chrome: bool,
    pub include_text_body: bool,
    pub include_json_body: bool,
    pub transparent_proxy: bool,
}

impl CaptureFlags {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = |key: &str| lookup(key).as_deref() == Some("yes");
        let capture_body = enabled(ENV_ENABLE_CAPTURE_BODY);
        Self {
            chrome: enabled(ENV_ENABLE_CHROME),
            include_text_body: capture_body,
            include_json_body: capture_body,
            transparent_proxy: enabled(ENV_ENABLE_TRANSPARENT_PROXY),
        }
    }
}
