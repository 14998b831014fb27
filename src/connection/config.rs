//! Connection configuration
//!
//! Declarative description of one named connection, loaded from JSON.
//! `host` accepts a single host or a list of hosts for replica sets.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::{ConfigError, ConfigResult};

/// One host or several
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostList {
    One(String),
    Many(Vec<String>),
}

impl HostList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            HostList::One(host) => vec![host.clone()],
            HostList::Many(hosts) => hosts.clone(),
        }
    }
}

impl Default for HostList {
    fn default() -> Self {
        HostList::One(default_host())
    }
}

/// Host and port used by the read handle instead of the primary ones
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOverride {
    #[serde(default)]
    pub host: Option<HostList>,

    #[serde(default)]
    pub port: Option<u16>,
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection name (default: "mongodb")
    #[serde(default = "default_name")]
    pub name: String,

    /// Driver name, only "mongodb" is accepted
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Explicit DSN, used verbatim when non-empty
    #[serde(default)]
    pub dsn: Option<String>,

    /// Host or hosts (default: "localhost")
    #[serde(default)]
    pub host: HostList,

    #[serde(default)]
    pub port: Option<u16>,

    pub database: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Client options; `database` here names the authentication database
    #[serde(default)]
    pub options: Map<String, Value>,

    #[serde(default)]
    pub driver_options: Map<String, Value>,

    /// Optional read handle target
    #[serde(default)]
    pub read: Option<ReadOverride>,
}

fn default_name() -> String {
    "mongodb".to_string()
}

fn default_driver() -> String {
    "mongodb".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

impl ConnectionConfig {
    /// Configuration for `database` on localhost with defaults elsewhere
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            name: default_name(),
            driver: default_driver(),
            dsn: None,
            host: HostList::default(),
            port: None,
            database: database.into(),
            username: None,
            password: None,
            options: Map::new(),
            driver_options: Map::new(),
            read: None,
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.driver != "mongodb" {
            return Err(ConfigError::invalid(format!(
                "unsupported driver '{}'",
                self.driver
            )));
        }
        if self.database.trim().is_empty() {
            return Err(ConfigError::invalid("database must not be empty"));
        }
        if self.has_dsn() {
            return Ok(());
        }
        let hosts = self.hosts();
        if hosts.is_empty() || hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(ConfigError::invalid("host must not be empty"));
        }
        if self.port == Some(0) {
            return Err(ConfigError::invalid("port must be non-zero"));
        }
        Ok(())
    }

    fn has_dsn(&self) -> bool {
        self.dsn.as_deref().map_or(false, |dsn| !dsn.is_empty())
    }

    /// Hosts with the port appended where a host does not carry one
    pub fn hosts(&self) -> Vec<String> {
        self.host
            .to_vec()
            .into_iter()
            .map(|host| match self.port {
                Some(port) if !host.contains(':') => format!("{}:{}", host, port),
                _ => host,
            })
            .collect()
    }

    /// Connection string for the client
    pub fn dsn(&self) -> String {
        if let Some(dsn) = self.dsn.as_deref().filter(|dsn| !dsn.is_empty()) {
            return dsn.to_string();
        }
        let auth_database = self
            .options
            .get("database")
            .and_then(Value::as_str)
            .filter(|db| !db.is_empty());
        match auth_database {
            Some(db) => format!("mongodb://{}/{}", self.hosts().join(","), db),
            None => format!("mongodb://{}", self.hosts().join(",")),
        }
    }

    /// Client options with credentials merged in unless already present
    pub fn client_options(&self) -> Map<String, Value> {
        let mut options = self.options.clone();
        let credentials = [("username", &self.username), ("password", &self.password)];
        for (key, value) in credentials {
            if options.contains_key(key) {
                continue;
            }
            if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
                options.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        options
    }

    /// Configuration for the read handle, when a read override is present
    pub fn read_config(&self) -> Option<Self> {
        let read = self.read.as_ref()?;
        let mut config = self.clone();
        config.read = None;
        config.dsn = None;
        if let Some(host) = &read.host {
            config.host = host.clone();
        }
        if read.port.is_some() {
            config.port = read.port;
        }
        Some(config)
    }
}
