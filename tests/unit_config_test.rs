use convergence_control::config::{Config, DEFAULT_AGENT_PORT};
use std::fs;
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "convergence-control-test-{name}-{}-{:?}.toml",
        std::process::id(),
        std::thread::current().id()
    ))
}

fn load(name: &str, toml: &str) -> anyhow::Result<Config> {
    let path = temp_path(name);
    fs::write(&path, toml).unwrap();
    let result = Config::from_file(path.to_str().unwrap());
    let _ = fs::remove_file(&path);
    result
}

#[test]
fn defaults_pass_validation() {
    let config = load("defaults", "").unwrap();
    assert_eq!(config.agent_port, DEFAULT_AGENT_PORT);
}

#[test]
fn zero_agent_port_is_rejected() {
    assert!(load("zero-port", "agent_port = 0\n").is_err());
}

#[test]
fn tls_enabled_requires_paths() {
    assert!(load("tls-missing-paths", "[tls]\nenabled = true\nca_path = \"\"\n").is_err());
}

#[test]
fn metrics_port_must_differ_from_agent_port() {
    let toml = "agent_port = 4524\n[metrics]\nenabled = true\nport = 4524\n";
    assert!(load("metrics-collision", toml).is_err());
}
