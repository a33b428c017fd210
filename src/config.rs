// src/config.rs

//! Control service configuration: TOML-backed, with serde defaults and a
//! validation pass (load the raw file, resolve/validate, produce the value
//! the rest of the crate depends on).

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::warn;

/// The agent-facing port agents dial to reach the control service.
/// Overridable by configuration; this is only the default.
pub const DEFAULT_AGENT_PORT: u16 = 4524;

/// The external REST API port for human operators. Named here for
/// documentation only — no REST server is implemented by this crate.
pub const REST_API_PORT: u16 = 4523;

/// TLS material for the agent-facing listener: mutual authentication against
/// the cluster CA.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ca_path")]
    pub ca_path: String,
    #[serde(default = "default_cert_path")]
    pub cert_path: String,
    #[serde(default = "default_key_path")]
    pub key_path: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ca_path: default_ca_path(),
            cert_path: default_cert_path(),
            key_path: default_key_path(),
        }
    }
}

fn default_ca_path() -> String {
    "cluster.crt".to_string()
}
fn default_cert_path() -> String {
    "control-service.crt".to_string()
}
fn default_key_path() -> String {
    "control-service.key".to_string()
}

impl TlsConfig {
    pub fn as_material(&self) -> crate::tls::TlsMaterial {
        crate::tls::TlsMaterial {
            ca_path: self.ca_path.clone(),
            cert_path: self.cert_path.clone(),
            key_path: self.key_path.clone(),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: false, port: default_metrics_port() }
    }
}

fn default_metrics_port() -> u16 {
    8878
}

/// A raw representation of the config file before defaults are resolved.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_agent_port")]
    agent_port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_ping_interval_secs")]
    ping_interval_secs: u64,
    #[serde(default)]
    tls: TlsConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_agent_port() -> u16 {
    DEFAULT_AGENT_PORT
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_ping_interval_secs() -> u64 {
    crate::pinger::PING_INTERVAL.as_secs()
}

/// The resolved, validated control service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub agent_port: u16,
    pub log_level: String,
    pub ping_interval_secs: u64,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            agent_port: default_agent_port(),
            log_level: default_log_level(),
            ping_interval_secs: default_ping_interval_secs(),
            tls: TlsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Reads and parses a TOML config file, then validates it.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at '{path}'"))?;
        let raw: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse TOML from '{path}'"))?;

        let config = Config {
            host: raw.host,
            agent_port: raw.agent_port,
            log_level: raw.log_level,
            ping_interval_secs: raw.ping_interval_secs,
            tls: raw.tls,
            metrics: raw.metrics,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.agent_port == 0 {
            return Err(anyhow!("agent_port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.ping_interval_secs == 0 {
            return Err(anyhow!("ping_interval_secs cannot be 0"));
        }
        if self.tls.enabled {
            if self.tls.ca_path.trim().is_empty() {
                return Err(anyhow!("tls.ca_path cannot be empty when TLS is enabled"));
            }
            if self.tls.cert_path.trim().is_empty() {
                return Err(anyhow!("tls.cert_path cannot be empty when TLS is enabled"));
            }
            if self.tls.key_path.trim().is_empty() {
                return Err(anyhow!("tls.key_path cannot be empty when TLS is enabled"));
            }
        } else {
            warn!("TLS is disabled; agents will connect over plaintext TCP. Do not use this in production.");
        }
        if self.metrics.enabled && self.metrics.port == self.agent_port {
            return Err(anyhow!("metrics.port must differ from agent_port"));
        }
        Ok(())
    }
}
