use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Raised when an environment variable holds an unusable value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Directory holding one sub-directory per project.
    pub projects_dir: PathBuf,
    /// COLMAP executable.
    pub colmap_bin: String,
    /// Checkout of the neural surface trainer.
    pub neuralangelo_dir: PathBuf,
    /// Python interpreter used to run the trainer and mesh extraction.
    pub python_bin: String,
    /// Mesh post-processing tool.
    pub mesh_tool_bin: String,
    /// Seconds between heartbeat events on the progress stream.
    pub heartbeat_interval_secs: u64,
    /// Seconds a stopped trainer gets to exit before it is killed.
    pub stop_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            cors_origins: split_origins("http://localhost:3000,http://localhost:5173"),
            request_timeout_secs: 30,
            projects_dir: PathBuf::from("./projects"),
            colmap_bin: "colmap".into(),
            neuralangelo_dir: PathBuf::from("./neuralangelo"),
            python_bin: "python".into(),
            mesh_tool_bin: "sculpt-mesh-tool".into(),
            heartbeat_interval_secs: 30,
            stop_grace_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                                        |
    /// |---------------------------|------------------------------------------------|
    /// | `HOST`                    | `0.0.0.0`                                      |
    /// | `PORT`                    | `8000`                                         |
    /// | `CORS_ORIGINS`            | `http://localhost:3000,http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                                           |
    /// | `PROJECTS_DIR`            | `./projects`                                   |
    /// | `COLMAP_BIN`              | `colmap`                                       |
    /// | `NEURALANGELO_DIR`        | `./neuralangelo`                               |
    /// | `PYTHON_BIN`              | `python`                                       |
    /// | `MESH_TOOL_BIN`           | `sculpt-mesh-tool`                             |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`                                           |
    /// | `STOP_GRACE_SECS`         | `10`                                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cors_origins = match lookup("CORS_ORIGINS") {
            Some(raw) => split_origins(&raw),
            None => defaults.cors_origins,
        };

        let heartbeat_interval_secs = parse(&lookup, "HEARTBEAT_INTERVAL_SECS", "u64", defaults.heartbeat_interval_secs)?;
        if heartbeat_interval_secs == 0 {
            return Err(ConfigError::Zero("HEARTBEAT_INTERVAL_SECS"));
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT", "u16", defaults.port)?,
            cors_origins,
            request_timeout_secs: parse(&lookup, "REQUEST_TIMEOUT_SECS", "u64", defaults.request_timeout_secs)?,
            projects_dir: lookup("PROJECTS_DIR").map(PathBuf::from).unwrap_or(defaults.projects_dir),
            colmap_bin: lookup("COLMAP_BIN").unwrap_or(defaults.colmap_bin),
            neuralangelo_dir: lookup("NEURALANGELO_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.neuralangelo_dir),
            python_bin: lookup("PYTHON_BIN").unwrap_or(defaults.python_bin),
            mesh_tool_bin: lookup("MESH_TOOL_BIN").unwrap_or(defaults.mesh_tool_bin),
            heartbeat_interval_secs,
            stop_grace_secs: parse(&lookup, "STOP_GRACE_SECS", "u64", defaults.stop_grace_secs)?,
        })
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value: raw,
        }),
        None => Ok(default),
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
