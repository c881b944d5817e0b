use serde::Deserialize;
use std::path::Path;

use crate::types::Rule;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub windows: WindowsConfig,
    #[serde(default)]
    pub flusher: FlusherConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    #[serde(default = "default_node_id")]
    pub id: String,
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            health_port: default_health_port(),
        }
    }
}

fn default_node_id() -> String {
    "node-1".to_string()
}
fn default_health_port() -> u16 {
    8080
}

/// Default bucket windows, injected as a group when a rule is created with
/// any window unset.
#[derive(Debug, Deserialize, Clone)]
pub struct WindowsConfig {
    #[serde(default = "default_wait_window_ms")]
    pub default_wait_window_ms: u64,
    #[serde(default = "default_wait_window_threshold_ms")]
    pub default_wait_window_threshold_ms: u64,
    #[serde(default = "default_max_wait_window_ms")]
    pub default_max_wait_window_ms: u64,
}

impl Default for WindowsConfig {
    fn default() -> Self {
        Self {
            default_wait_window_ms: default_wait_window_ms(),
            default_wait_window_threshold_ms: default_wait_window_threshold_ms(),
            default_max_wait_window_ms: default_max_wait_window_ms(),
        }
    }
}

fn default_wait_window_ms() -> u64 {
    30_000
}
fn default_wait_window_threshold_ms() -> u64 {
    60_000
}
fn default_max_wait_window_ms() -> u64 {
    300_000
}

impl WindowsConfig {
    pub fn defaults(&self) -> WindowDefaults {
        WindowDefaults {
            wait_window_ms: self.default_wait_window_ms,
            wait_window_threshold_ms: self.default_wait_window_threshold_ms,
            max_wait_window_ms: self.default_max_wait_window_ms,
        }
    }
}

/// The three configured windows as one substitutable group.
#[derive(Debug, Clone, Copy)]
pub struct WindowDefaults {
    pub wait_window_ms: u64,
    pub wait_window_threshold_ms: u64,
    pub max_wait_window_ms: u64,
}

impl WindowDefaults {
    /// Replace all three rule windows at once. Partial substitution is
    /// never performed: either the rule keeps its own complete set of
    /// windows or it gets the complete configured set.
    pub fn inject(&self, rule: &mut Rule) {
        rule.wait_window_ms = self.wait_window_ms;
        rule.wait_window_threshold_ms = self.wait_window_threshold_ms;
        rule.max_wait_window_ms = self.max_wait_window_ms;
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FlusherConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for FlusherConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutorConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_expire_interval_secs")]
    pub expire_interval_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            expire_interval_secs: default_expire_interval_secs(),
        }
    }
}

fn default_max_history() -> usize {
    1_000
}
fn default_expire_interval_secs() -> u64 {
    3_600
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_gets_all_defaults() {
        let config: AppConfig = toml::from_str("").expect("parse empty config");
        assert_eq!(config.node.id, "node-1");
        assert_eq!(config.windows.default_wait_window_ms, 30_000);
        assert_eq!(config.flusher.tick_interval_ms, 1_000);
        assert_eq!(config.executor.queue_capacity, 1_000);
        assert_eq!(config.history.max_history, 1_000);
    }

    #[test]
    fn load_reads_partial_overrides_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp config");
        write!(
            file,
            r#"
            [node]
            id = "node-7"

            [windows]
            default_max_wait_window_ms = 90000

            [history]
            max_history = 50
            "#
        )
        .expect("write config");

        let config = AppConfig::load(file.path()).expect("load config");
        assert_eq!(config.node.id, "node-7");
        assert_eq!(config.windows.default_max_wait_window_ms, 90_000);
        assert_eq!(config.windows.default_wait_window_ms, 30_000);
        assert_eq!(config.history.max_history, 50);
        assert_eq!(config.history.expire_interval_secs, 3_600);
    }

    #[test]
    fn inject_replaces_all_three_windows_as_a_group() {
        let defaults = WindowsConfig::default().defaults();
        let mut rule = Rule {
            id: "r1".to_string(),
            event_types: vec![],
            script_id: None,
            hook_endpoint: String::new(),
            hook_retry: 0,
            wait_window_ms: 1,
            wait_window_threshold_ms: 0,
            max_wait_window_ms: 7,
        };
        assert!(rule.windows_unset());
        defaults.inject(&mut rule);
        assert_eq!(rule.wait_window_ms, 30_000);
        assert_eq!(rule.wait_window_threshold_ms, 60_000);
        assert_eq!(rule.max_wait_window_ms, 300_000);
    }
}
