//! System configuration parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// System-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Write retry policy for the job store.
    pub retry: RetryConfig,
    /// Outbound HTTP settings shared by all executors.
    pub http: HttpConfig,
    /// Hades backend; the Hades route is disabled when absent.
    pub hades: Option<HadesConfig>,
    /// Jenkins defaults; requests may override each field.
    pub jenkins: JenkinsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "benchmark.db".to_string(),
            max_connections: 4,
            busy_timeout: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HadesConfig {
    pub url: String,
    /// "docker" or "kubernetes".
    pub backend: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JenkinsConfig {
    pub url: Option<String>,
    pub user: Option<String>,
    pub api_token: Option<String>,
    pub job_path: Option<String>,
    pub use_parameters: bool,
}

impl SystemConfig {
    /// Load the configuration file (if it exists) and apply process environment overrides.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let mut config = if path.exists() {
            debug!(path = %path.display(), "Reading configuration file");
            let text = std::fs::read_to_string(path)?;
            parse_system_config(&text)?
        } else {
            warn!(path = %path.display(), "Configuration file not found, using defaults");
            SystemConfig::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(address) = get("SERVER_ADDRESS") {
            self.server.address = normalize_address(&address);
        }
        if let Some(path) = get("DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(url) = get("HADES_HOST") {
            let backend = self
                .hades
                .as_ref()
                .map(|h| h.backend.clone())
                .unwrap_or_else(|| "docker".to_string());
            self.hades = Some(HadesConfig { url, backend });
        }
        if let Some(backend) = get("HADES_BACKEND") {
            match self.hades.as_mut() {
                Some(hades) => hades.backend = backend,
                None => warn!("HADES_BACKEND set without a Hades URL, ignoring"),
            }
        }
        if let Some(url) = get("JENKINS_URL") {
            self.jenkins.url = Some(url);
        }
        if let Some(user) = get("JENKINS_USER") {
            self.jenkins.user = Some(user);
        }
        if let Some(token) = get("JENKINS_API_TOKEN") {
            self.jenkins.api_token = Some(token);
        }
        if let Some(job_path) = get("JENKINS_JOB_PATH") {
            self.jenkins.job_path = Some(job_path);
        }
        if let Some(flag) = get("JENKINS_USE_PARAMETERS") {
            self.jenkins.use_parameters = parse_bool("JENKINS_USE_PARAMETERS", &flag)?;
        }
        Ok(())
    }
}

/// A bare port such as `8080` binds on all interfaces.
fn normalize_address(address: &str) -> String {
    let address = address.trim().trim_start_matches(':');
    if address.chars().all(|c| c.is_ascii_digit()) {
        format!("0.0.0.0:{}", address)
    } else {
        address.to_string()
    }
}

fn parse_bool(field: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("expected a boolean, got '{}'", other),
        }),
    }
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "server" => {
                if let Some(address) = get_child_string(node, "address") {
                    config.server.address = normalize_address(&address);
                }
            }
            "database" => {
                if let Some(path) = get_child_string(node, "path") {
                    config.database.path = path;
                }
                if let Some(n) = get_child_u32(node, "max-connections")? {
                    if n == 0 {
                        return Err(ConfigError::InvalidValue {
                            field: "database.max-connections".to_string(),
                            message: "must be at least 1".to_string(),
                        });
                    }
                    config.database.max_connections = n;
                }
                if let Some(ms) = get_child_u64(node, "busy-timeout-ms")? {
                    config.database.busy_timeout = Duration::from_millis(ms);
                }
            }
            "retry" => {
                if let Some(n) = get_child_u32(node, "max-attempts")? {
                    if n == 0 {
                        return Err(ConfigError::InvalidValue {
                            field: "retry.max-attempts".to_string(),
                            message: "must be at least 1".to_string(),
                        });
                    }
                    config.retry.max_attempts = n;
                }
                if let Some(ms) = get_child_u64(node, "base-delay-ms")? {
                    config.retry.base_delay = Duration::from_millis(ms);
                }
                if let Some(ms) = get_child_u64(node, "attempt-timeout-ms")? {
                    config.retry.attempt_timeout = Duration::from_millis(ms);
                }
            }
            "http" => {
                if let Some(ms) = get_child_u64(node, "timeout-ms")? {
                    config.http.timeout = Duration::from_millis(ms);
                }
            }
            "hades" => {
                let url = get_child_string(node, "url")
                    .ok_or_else(|| ConfigError::MissingField("hades url".to_string()))?;
                let backend =
                    get_child_string(node, "backend").unwrap_or_else(|| "docker".to_string());
                config.hades = Some(HadesConfig { url, backend });
            }
            "jenkins" => {
                config.jenkins.url = get_child_string(node, "url");
                config.jenkins.user = get_child_string(node, "user");
                config.jenkins.api_token = get_child_string(node, "api-token");
                config.jenkins.job_path = get_child_string(node, "job-path");
                config.jenkins.use_parameters =
                    get_child_bool(node, "use-parameters").unwrap_or(false);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

// Helper functions for extracting values from KDL nodes

fn find_child<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlNode> {
    node.children()?
        .nodes()
        .iter()
        .find(|child| child.name().value() == name)
}

fn get_first_arg(node: &KdlNode) -> Option<&kdl::KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn get_child_string(node: &KdlNode, name: &str) -> Option<String> {
    find_child(node, name)
        .and_then(get_first_arg)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_child_bool(node: &KdlNode, name: &str) -> Option<bool> {
    find_child(node, name)
        .and_then(get_first_arg)
        .and_then(|v| v.as_bool())
}

fn get_child_u64(node: &KdlNode, name: &str) -> ConfigResult<Option<u64>> {
    let Some(value) = find_child(node, name).and_then(get_first_arg) else {
        return Ok(None);
    };
    let field = format!("{}.{}", node.name().value(), name);
    let n = value.as_integer().ok_or_else(|| ConfigError::InvalidValue {
        field: field.clone(),
        message: "expected an integer".to_string(),
    })?;
    u64::try_from(n)
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            field,
            message: format!("{} is out of range", n),
        })
}

fn get_child_u32(node: &KdlNode, name: &str) -> ConfigResult<Option<u32>> {
    let Some(n) = get_child_u64(node, name)? else {
        return Ok(None);
    };
    u32::try_from(n)
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            field: format!("{}.{}", node.name().value(), name),
            message: format!("{} is out of range", n),
        })
}
