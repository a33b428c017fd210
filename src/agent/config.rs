// src/agent/config.rs

//! Configuration for the `convergence-agentd` demo binary: where the control
//! service lives and which TLS identity to dial it with. Same
//! TOML-plus-serde-defaults shape as `crate::config::Config`, scoped to what
//! an agent (rather than the control service) needs.

use crate::config::TlsConfig;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Deserialize)]
struct RawAgentConfig {
    #[serde(default = "default_control_host")]
    control_host: String,
    #[serde(default = "default_control_port")]
    control_port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    tls: TlsConfig,
}

fn default_control_host() -> String {
    "127.0.0.1".to_string()
}
fn default_control_port() -> u16 {
    crate::config::DEFAULT_AGENT_PORT
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub control_host: String,
    pub control_port: u16,
    pub log_level: String,
    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            control_host: default_control_host(),
            control_port: default_control_port(),
            log_level: default_log_level(),
            tls: TlsConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at '{path}'"))?;
        let raw: RawAgentConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse TOML from '{path}'"))?;
        let config = AgentConfig {
            control_host: raw.control_host,
            control_port: raw.control_port,
            log_level: raw.log_level,
            tls: raw.tls,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.control_host.trim().is_empty() {
            return Err(anyhow!("control_host cannot be empty"));
        }
        if self.control_port == 0 {
            return Err(anyhow!("control_port cannot be 0"));
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
        }
        Ok(())
    }
}
