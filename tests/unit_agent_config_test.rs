use convergence_control::agent::AgentConfig;
use convergence_control::config::DEFAULT_AGENT_PORT;
use std::fs;
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "convergence-agentd-test-{name}-{}-{:?}.toml",
        std::process::id(),
        std::thread::current().id()
    ))
}

fn load(name: &str, toml: &str) -> anyhow::Result<AgentConfig> {
    let path = temp_path(name);
    fs::write(&path, toml).unwrap();
    let result = AgentConfig::from_file(path.to_str().unwrap());
    let _ = fs::remove_file(&path);
    result
}

#[test]
fn defaults_pass_validation() {
    let config = load("defaults", "").unwrap();
    assert_eq!(config.control_port, DEFAULT_AGENT_PORT);
}

#[test]
fn empty_host_is_rejected() {
    assert!(load("empty-host", "control_host = \"\"\n").is_err());
}
