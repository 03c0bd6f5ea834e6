//! Configuration loading and validation.
//!
//! The configuration is a single structured document (YAML by default,
//! JSON and TOML by extension) describing the served zones, the
//! upstream forwarder and the listening sockets. Loading is atomic:
//! any structural problem fails the whole load and nothing is applied.
//! Record values are validated against their types when the zone table
//! is built from this structure, before any socket is bound.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod watch;

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML syntax or structure error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON syntax or structure error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML syntax or structure error.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The configuration file does not exist.
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    /// A semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl ConfigError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Result alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the UDP (and TCP) listeners bind to.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Whether the TCP listener is enabled.
    #[serde(default = "default_true")]
    pub tcp: bool,

    /// Upstream forwarder, `ip` or `ip:port`.
    #[serde(default = "default_upstream")]
    pub upstream: String,

    /// Address substituted for the record value `server`; `auto`
    /// detects the host's outbound address.
    #[serde(default = "default_server_ip")]
    pub server_ip: String,

    /// Reload automatically when the configuration file changes.
    #[serde(default = "default_true")]
    pub watch_config: bool,

    /// Served zones.
    #[serde(default)]
    pub zones: Vec<ZoneSection>,

    /// Banned-domain blocklist.
    #[serde(default)]
    pub banned: BannedSection,

    /// Forwarder tuning.
    #[serde(default)]
    pub forward: ForwardSection,

    /// Forward cache tuning.
    #[serde(default)]
    pub cache: CacheSection,

    /// Logging options.
    #[serde(default)]
    pub logging: LoggingSection,
}

/// One authoritative zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneSection {
    /// Authoritative suffix, e.g. `camp.local`.
    pub suffix: String,

    /// Default TTL for records in this zone that omit one.
    #[serde(default = "default_zone_ttl")]
    pub ttl: u32,

    /// Records served under the suffix.
    #[serde(default)]
    pub records: Vec<RecordSection>,
}

/// One configured record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordSection {
    /// Owner name: `@` for the apex, a relative label sequence, or a
    /// fully-qualified name ending in a dot.
    pub name: String,

    /// Record type name, e.g. `A`, `AAAA`, `CNAME`, `TXT`.
    #[serde(rename = "type")]
    pub rtype: String,

    /// Record value in the type's textual form. For A records the
    /// special value `server` resolves to the configured or detected
    /// host address.
    pub value: String,

    /// TTL in seconds; the zone default applies when omitted.
    #[serde(default)]
    pub ttl: Option<u32>,
}

/// Banned-domain blocklist settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BannedSection {
    /// Paths to list files, one domain per line with `#` comments.
    pub lists: Vec<String>,

    /// Match mode: `exact` or `suffix` (the name and everything under
    /// it).
    pub mode: String,

    /// Address answered for banned names.
    pub ip: Ipv4Addr,

    /// TTL of the redirect answer.
    pub ttl: u32,
}

impl Default for BannedSection {
    fn default() -> Self {
        Self {
            lists: Vec::new(),
            mode: "suffix".to_string(),
            ip: Ipv4Addr::LOCALHOST,
            ttl: 60,
        }
    }
}

/// Forwarder tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ForwardSection {
    /// Per-attempt upstream timeout in milliseconds.
    pub timeout_ms: u64,

    /// Retries after the first attempt.
    pub retries: u32,
}

impl ForwardSection {
    /// Per-attempt timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ForwardSection {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            retries: 2,
        }
    }
}

/// Forward cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheSection {
    /// Floor applied to cached TTLs, avoiding zero-TTL thrash.
    pub min_ttl: u64,

    /// Ceiling applied to cached TTLs.
    pub max_ttl: u64,

    /// Maximum number of cached entries.
    pub max_entries: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            min_ttl: 1,
            max_ttl: 3600,
            max_entries: 10_000,
        }
    }
}

/// Logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingSection {
    /// Log level: trace, debug, info, warn or error.
    pub level: String,

    /// Output format: `text` or `json`.
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 53))
}

fn default_upstream() -> String {
    "8.8.8.8".to_string()
}

fn default_server_ip() -> String {
    "auto".to_string()
}

fn default_zone_ttl() -> u32 {
    300
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Loads configuration from a file, dispatching on the extension
    /// (`.json`, `.toml`, anything else is treated as YAML).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") => toml::from_str(&contents)?,
            _ => serde_yaml::from_str(&contents)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a YAML string. Used by tests and the
    /// validate subcommand.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation. Record value shapes are checked when the
    /// zone table is built; both run before any socket binds.
    pub fn validate(&self) -> Result<()> {
        if self.forward.timeout_ms == 0 {
            return Err(ConfigError::validation("forward.timeout_ms must be positive"));
        }
        if self.cache.min_ttl > self.cache.max_ttl {
            return Err(ConfigError::validation(
                "cache.min_ttl must not exceed cache.max_ttl",
            ));
        }
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::validation(format!(
                    "unknown log level {other:?}"
                )));
            }
        }
        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(ConfigError::validation(format!(
                    "unknown log format {other:?}"
                )));
            }
        }
        for zone in &self.zones {
            if zone.suffix.trim().is_empty() {
                return Err(ConfigError::validation("zone suffix must not be empty"));
            }
        }
        match self.banned.mode.as_str() {
            "exact" | "suffix" => {}
            other => {
                return Err(ConfigError::validation(format!(
                    "unknown banned mode {other:?}"
                )));
            }
        }
        if self.server_ip != "auto" && self.server_ip.parse::<Ipv4Addr>().is_err() {
            return Err(ConfigError::validation(format!(
                "server_ip must be \"auto\" or an IPv4 address, got {:?}",
                self.server_ip
            )));
        }
        self.upstream_addr()?;
        Ok(())
    }

    /// Upstream address with the default DNS port applied to bare IPs.
    pub fn upstream_addr(&self) -> Result<SocketAddr> {
        if let Ok(addr) = self.upstream.parse::<SocketAddr>() {
            return Ok(addr);
        }
        if let Ok(ip) = self.upstream.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, 53));
        }
        Err(ConfigError::validation(format!(
            "upstream must be an address, got {:?}",
            self.upstream
        )))
    }

    /// The address substituted for the record value `server`.
    ///
    /// `auto` detects the host's outbound address by connecting a UDP
    /// socket; no packet is sent. Detection failure falls back to the
    /// loopback address so a disconnected host still serves itself.
    pub fn resolve_server_ip(&self) -> Ipv4Addr {
        if self.server_ip != "auto" {
            // validate() already checked the syntax.
            return self.server_ip.parse().unwrap_or(Ipv4Addr::LOCALHOST);
        }
        match detect_outbound_ipv4() {
            Some(ip) => ip,
            None => {
                warn!("could not detect host address, using 127.0.0.1");
                Ipv4Addr::LOCALHOST
            }
        }
    }
}

fn detect_outbound_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(_) => None,
    }
}
