//! Configuration for QuantaLista.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agent::Agent;
use crate::coordination::{CoordinatorConfig, SchedulerConfig};

/// QuantaLista configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Root of the pending/in_progress/completed/failed directories.
    pub queue_dir: PathBuf,
    /// Coordinator loop settings.
    pub coordinator: CoordinatorSettings,
    /// Scheduler settings.
    pub scheduler: SchedulerSettings,
    /// Agents registered at daemon start.
    pub agents: Vec<AgentSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_dir: PathBuf::from("queue"),
            coordinator: CoordinatorSettings::default(),
            scheduler: SchedulerSettings::default(),
            agents: vec![
                AgentSettings {
                    id: "agent-001".to_string(),
                    name: "Researcher".to_string(),
                },
                AgentSettings {
                    id: "agent-002".to_string(),
                    name: "Writer".to_string(),
                },
            ],
        }
    }
}

impl Config {
    /// Load configuration with fallback chain.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/quantalista/quantalista.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join("quantalista").join("quantalista.yml");
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./quantalista.yml
        let fallback_config = PathBuf::from("quantalista.yml");
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Reject settings the coordinator cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.coordinator.poll_interval_ms == 0 {
            return Err(crate::Error::Config("coordinator.poll_interval_ms must be positive".to_string()));
        }
        let mut ids: Vec<&str> = self.agents.iter().map(|a| a.id.as_str()).collect();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(crate::Error::Config(format!("duplicate agent id: {}", pair[0])));
        }
        Ok(())
    }

    /// Convert to CoordinatorConfig.
    pub fn to_coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            poll_interval: Duration::from_millis(self.coordinator.poll_interval_ms),
            stall_ticks: self.coordinator.stall_ticks,
            max_ticks: self.coordinator.max_ticks,
        }
    }

    /// Convert to SchedulerConfig.
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            strict_dependencies: self.scheduler.strict_dependencies,
        }
    }

    /// Agents to register, in configuration order.
    pub fn to_agents(&self) -> Vec<Agent> {
        self.agents.iter().map(|a| Agent::new(a.id.as_str(), a.name.as_str())).collect()
    }
}

/// Coordinator loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    /// Wait between ticks in milliseconds.
    pub poll_interval_ms: u64,
    /// Ticks without possible progress before giving up (null = never).
    pub stall_ticks: Option<u64>,
    /// Hard tick bound (null = unbounded).
    pub max_ticks: Option<u64>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            stall_ticks: Some(10),
            max_ticks: None,
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Reject tasks naming dependencies that were not submitted first.
    pub strict_dependencies: bool,
}

/// An agent entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentSettings {
    pub id: String,
    pub name: String,
}
