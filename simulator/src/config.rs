use anyhow::{Context, Result, bail};
use models::device::Inventory;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PLACEHOLDER_TENANT_TOKEN: &str = "YOUR_TENANT_TOKEN_HERE";
const MIN_POLL_INTERVAL: u64 = 5;
const DEFAULT_ERROR_MESSAGE: &str = "Unknown error during update";
/// Longest any single simulated stage may be configured to take.
const MAX_STAGE_SECS: f64 = 86_400.0;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub error_messages: Vec<String>,
    pub server: ServerConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tenant_token: String,
    /// Seconds between poll cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            success_rate: default_success_rate(),
            log_file: None,
            log_level: default_log_level(),
            database_path: default_database_path(),
            shutdown_grace_secs: default_shutdown_grace(),
            report_interval_secs: default_report_interval(),
            timing: TimingConfig::default(),
        }
    }
}

/// Bounds of the simulated deployment stages, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_min_download")]
    pub min_download_secs: f64,
    #[serde(default = "default_install_secs")]
    pub install_secs: [f64; 2],
    #[serde(default = "default_reboot_secs")]
    pub reboot_secs: [f64; 2],
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_download_secs: default_min_download(),
            install_secs: default_install_secs(),
            reboot_secs: default_reboot_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_bandwidth")]
    pub bandwidth_kbps: u64,
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
    pub device_type: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
    /// Advisory only. Deployment outcomes use `simulator.success_rate`.
    pub success_probability: Option<f64>,
    #[serde(default)]
    pub manufacturers: Vec<String>,
    #[serde(default)]
    pub oui_prefixes: Vec<String>,
    #[serde(default)]
    pub device_classes: Vec<String>,
    #[serde(default)]
    pub plants: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    /// Extra static attributes copied into every device's inventory.
    #[serde(default)]
    pub inventory: Inventory,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            count: default_count(),
            bandwidth_kbps: default_bandwidth(),
            id_prefix: default_id_prefix(),
            device_type: None,
            version: default_version(),
            success_probability: None,
            manufacturers: Vec::new(),
            oui_prefixes: Vec::new(),
            device_classes: Vec::new(),
            plants: Vec::new(),
            regions: Vec::new(),
            inventory: Inventory::new(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    10
}

fn default_success_rate() -> f64 {
    0.8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("devices.db")
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_report_interval() -> u64 {
    60
}

fn default_min_download() -> f64 {
    2.0
}

fn default_install_secs() -> [f64; 2] {
    [5.0, 15.0]
}

fn default_reboot_secs() -> [f64; 2] {
    [3.0, 8.0]
}

fn default_count() -> usize {
    10
}

fn default_bandwidth() -> u64 {
    500
}

fn default_id_prefix() -> String {
    "DEV".to_string()
}

fn default_version() -> String {
    "v1.0.0".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Configuration file not found: {}", path.display());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        if self.server.url.trim().is_empty() {
            bail!("Server URL is required");
        }
        let url = url::Url::parse(&self.server.url)
            .with_context(|| format!("Server URL '{}' is not a valid URL", self.server.url))?;
        if url.cannot_be_a_base() {
            bail!("Server URL '{}' must be an absolute http(s) URL", self.server.url);
        }

        if self.server.poll_interval < MIN_POLL_INTERVAL {
            bail!(
                "Poll interval must be at least {} seconds, got {}",
                MIN_POLL_INTERVAL,
                self.server.poll_interval
            );
        }

        if !(0.0..=1.0).contains(&self.simulator.success_rate) {
            bail!(
                "Success rate must be between 0 and 1, got {}",
                self.simulator.success_rate
            );
        }

        let timing = &self.simulator.timing;
        if !(0.0..=MAX_STAGE_SECS).contains(&timing.min_download_secs) {
            bail!(
                "min_download_secs must be between 0 and {MAX_STAGE_SECS}, got {}",
                timing.min_download_secs
            );
        }
        check_bounds("install_secs", timing.install_secs)?;
        check_bounds("reboot_secs", timing.reboot_secs)?;

        for (name, profile) in &self.profiles {
            if let Some(probability) = profile.success_probability {
                if !(0.0..=1.0).contains(&probability) {
                    bail!("Profile '{name}' success_probability must be between 0 and 1");
                }
            }
        }

        self.error_messages.retain(|message| !message.trim().is_empty());
        if self.error_messages.is_empty() {
            self.error_messages.push(DEFAULT_ERROR_MESSAGE.to_string());
        }

        Ok(())
    }

    /// Problems that do not stop the simulator but are worth logging.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.server.tenant_token.is_empty()
            || self.server.tenant_token == PLACEHOLDER_TENANT_TOKEN
        {
            warnings.push(
                "Tenant token is not configured, hosted servers will not accept devices"
                    .to_string(),
            );
        }
        if self.enabled_profiles().next().is_none() {
            warnings.push("No profiles are enabled, no devices will be simulated".to_string());
        }
        warnings
    }

    pub fn enabled_profiles(&self) -> impl Iterator<Item = (&String, &ProfileConfig)> {
        self.profiles.iter().filter(|(_, profile)| profile.enabled)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.server.poll_interval)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.simulator.shutdown_grace_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.simulator.report_interval_secs.max(1))
    }
}

fn check_bounds(name: &str, [low, high]: [f64; 2]) -> Result<()> {
    let in_range = |secs: f64| (0.0..=MAX_STAGE_SECS).contains(&secs);
    if !in_range(low) || !in_range(high) || low > high {
        bail!(
            "{name} must be two numbers between 0 and {MAX_STAGE_SECS} with min <= max, \
             got [{low}, {high}]"
        );
    }
    Ok(())
}
