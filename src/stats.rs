//! Typed counters served over the stats control channel.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// One counter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl StatValue {
    fn step(&mut self, key: &str, delta: i64) -> Result<()> {
        match self {
            Self::Integer(value) => *value = value.saturating_add(delta),
            Self::Float(value) => *value += delta as f64,
            Self::Text(_) => {
                return Err(Error::Stat(format!("key '{}' is not numeric", key)));
            }
        }
        Ok(())
    }
}

impl From<i64> for StatValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for StatValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for StatValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StatValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Process and runtime figures included in every snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStats {
    pub pid: u32,
    pub cpus: usize,
    /// Tokio worker threads, when called inside a runtime
    pub runtime_workers: Option<usize>,
    /// OS threads of this process (Linux only)
    pub threads: Option<u64>,
    /// Resident set size in bytes (Linux only)
    pub resident_bytes: Option<u64>,
}

impl ProcessStats {
    pub fn collect() -> Self {
        let (threads, resident_bytes) = read_proc_status();
        Self {
            pid: std::process::id(),
            cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            runtime_workers: tokio::runtime::Handle::try_current()
                .ok()
                .map(|handle| handle.metrics().num_workers()),
            threads,
            resident_bytes,
        }
    }
}

#[cfg(target_os = "linux")]
fn read_proc_status() -> (Option<u64>, Option<u64>) {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return (None, None);
    };

    let field = |name: &str| {
        status
            .lines()
            .find_map(|line| line.strip_prefix(name))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|value| value.parse::<u64>().ok())
    };

    (field("Threads:"), field("VmRSS:").map(|kb| kb * 1024))
}

#[cfg(not(target_os = "linux"))]
fn read_proc_status() -> (Option<u64>, Option<u64>) {
    (None, None)
}

#[derive(Debug, Serialize)]
struct StatsSnapshot<'a> {
    module: &'a str,
    host: String,
    timestamp: String,
    counters: BTreeMap<String, StatValue>,
    process: ProcessStats,
}

/// Named counters of one module
#[derive(Debug)]
pub struct StatsCollector {
    module: String,
    values: DashMap<String, StatValue>,
}

impl StatsCollector {
    pub fn new(module: impl Into<String>) -> Result<Self> {
        let module = module.into();
        if module.trim().is_empty() {
            return Err(Error::Configuration("Required module name".to_string()));
        }
        Ok(Self {
            module,
            values: DashMap::new(),
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Register a new key. Empty and already registered keys are rejected.
    pub fn add_key(&self, key: &str, initial: impl Into<StatValue>) -> Result<()> {
        if key.trim().is_empty() {
            return Err(Error::Stat("key must not be empty".to_string()));
        }
        match self.values.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(Error::Stat(format!("key '{}' already registered", key)))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(initial.into());
                Ok(())
            }
        }
    }

    pub fn update(&self, key: &str, value: impl Into<StatValue>) -> Result<()> {
        let mut entry = self
            .values
            .get_mut(key)
            .ok_or_else(|| Error::Stat(format!("unknown key '{}'", key)))?;
        *entry = value.into();
        Ok(())
    }

    pub fn increment(&self, key: &str) -> Result<()> {
        self.step(key, 1)
    }

    pub fn decrement(&self, key: &str) -> Result<()> {
        self.step(key, -1)
    }

    pub fn get(&self, key: &str) -> Option<StatValue> {
        self.values.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &str) -> Option<StatValue> {
        self.values.remove(key).map(|(_, value)| value)
    }

    /// Pretty JSON with the module, every counter and process figures
    pub fn snapshot(&self) -> Result<String> {
        let counters = self
            .values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let snapshot = StatsSnapshot {
            module: &self.module,
            host: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_default(),
            timestamp: Utc::now().to_rfc3339(),
            counters,
            process: ProcessStats::collect(),
        };

        serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::Stat(format!("snapshot encoding failed: {}", e)))
    }

    fn step(&self, key: &str, delta: i64) -> Result<()> {
        let mut entry = self
            .values
            .get_mut(key)
            .ok_or_else(|| Error::Stat(format!("unknown key '{}'", key)))?;
        entry.step(key, delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_key_rules() {
        let stats = StatsCollector::new("svc").unwrap();
        stats.add_key("requests", 0i64).unwrap();
        assert!(stats.add_key("requests", 5i64).is_err());
        assert!(stats.add_key("", 0i64).is_err());
        assert!(StatsCollector::new("").is_err());
    }

    #[test]
    fn test_increment_and_decrement() {
        let stats = StatsCollector::new("svc").unwrap();
        stats.add_key("requests", 0i64).unwrap();
        stats.add_key("load", 0.5).unwrap();
        stats.add_key("state", "ready").unwrap();

        stats.increment("requests").unwrap();
        stats.increment("requests").unwrap();
        stats.decrement("requests").unwrap();
        stats.increment("load").unwrap();

        assert_eq!(stats.get("requests"), Some(StatValue::Integer(1)));
        assert_eq!(stats.get("load"), Some(StatValue::Float(1.5)));
        assert!(matches!(stats.increment("state"), Err(Error::Stat(_))));
        assert!(matches!(stats.increment("missing"), Err(Error::Stat(_))));
    }

    #[test]
    fn test_update_replaces_value() {
        let stats = StatsCollector::new("svc").unwrap();
        stats.add_key("state", "starting").unwrap();
        stats.update("state", "ready").unwrap();
        assert_eq!(stats.get("state"), Some(StatValue::Text("ready".to_string())));
        assert!(stats.update("missing", 1i64).is_err());
        assert_eq!(stats.remove("state"), Some(StatValue::Text("ready".to_string())));
    }

    #[tokio::test]
    async fn test_snapshot_contents() {
        let stats = StatsCollector::new("svc").unwrap();
        stats.add_key("requests", 7i64).unwrap();

        let json: serde_json::Value = serde_json::from_str(&stats.snapshot().unwrap()).unwrap();
        assert_eq!(json["module"], "svc");
        assert_eq!(json["counters"]["requests"], 7);
        assert!(json["process"]["cpus"].as_u64().unwrap() >= 1);
        assert!(json["process"]["runtime_workers"].is_number());
    }
}
