use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WorkloadsConfig {
    pub workloads: Vec<Workload>,
}

/// A number of clients requesting the same key at once.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Workload {
    pub name: String,
    pub clients: usize,
    pub key: String,
    /// Request the key once before the clients are started.
    #[serde(default)]
    pub warmup: bool,
    /// How long to wait after this workload before starting the next one.
    #[serde(default = "default_pause", with = "humantime_serde")]
    pub pause: Duration,
}

fn default_pause() -> Duration {
    Duration::from_secs(1)
}

impl Workload {
    fn new(name: &str, clients: usize, key: &str) -> Self {
        Self {
            name: name.into(),
            clients,
            key: key.into(),
            warmup: false,
            pause: default_pause(),
        }
    }
}

impl Default for WorkloadsConfig {
    /// A cold stampede, the same key once it is cached, and a cold stampede on another key.
    fn default() -> Self {
        Self {
            workloads: vec![
                Workload::new("cold cache stampede", 5, "stampede_key"),
                Workload::new("warm cache", 5, "stampede_key"),
                Workload::new("another cold cache stampede", 8, "another_stampede_key"),
            ],
        }
    }
}

impl WorkloadsConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).context("failed to open workloads file")?;
        let config: Self =
            serde_yaml::from_reader(file).context("failed to parse workloads YAML")?;
        if config.workloads.iter().any(|workload| workload.clients == 0) {
            anyhow::bail!("every workload needs at least one client");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_workloads() {
        let config = WorkloadsConfig::default();
        let summary: Vec<_> = config
            .workloads
            .iter()
            .map(|w| (w.clients, w.key.as_str()))
            .collect();
        assert_eq!(
            summary,
            [
                (5, "stampede_key"),
                (5, "stampede_key"),
                (8, "another_stampede_key")
            ]
        );
    }

    #[test]
    fn test_parse_workloads() {
        let yaml = r#"
            workloads:
              - name: big stampede
                clients: 100
                key: big_key
              - name: prewarmed
                clients: 10
                key: warm_key
                warmup: true
                pause: 250ms
        "#;
        let config: WorkloadsConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.workloads[0], Workload::new("big stampede", 100, "big_key"));
        assert_eq!(
            config.workloads[1],
            Workload {
                warmup: true,
                pause: Duration::from_millis(250),
                ..Workload::new("prewarmed", 10, "warm_key")
            }
        );
    }
}
