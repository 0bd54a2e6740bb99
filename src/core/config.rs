use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::params::{Param, Parameters};

pub const DEFAULT_CONFIG_FILE: &str = "shipwright.json";

/// Root configuration structure for shipwright.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ShipwrightConfig {
    #[serde(default)]
    pub params: BTreeMap<String, Value>,

    #[serde(default)]
    pub service_plans: ServicePlanConfig,

    #[serde(default)]
    pub service_ready: ServiceReadyConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

/// Maps the platform API endpoint to a service plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePlanConfig {
    #[serde(default = "default_trial_hosts")]
    pub trial_hosts: Vec<String>,

    #[serde(default = "default_trial_plan")]
    pub trial_plan: String,

    #[serde(default = "default_standard_plan")]
    pub standard_plan: String,

    #[serde(default = "default_offering")]
    pub offering: String,

    #[serde(default = "default_instance_name")]
    pub instance_name: String,
}

impl Default for ServicePlanConfig {
    fn default() -> Self {
        Self {
            trial_hosts: default_trial_hosts(),
            trial_plan: default_trial_plan(),
            standard_plan: default_standard_plan(),
            offering: default_offering(),
            instance_name: default_instance_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReadyConfig {
    #[serde(default = "default_ready_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_ready_interval")]
    pub interval_secs: u64,
}

impl Default for ServiceReadyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_ready_timeout(),
            interval_secs: default_ready_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathsConfig {
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,

    #[serde(default = "default_project")]
    pub project: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: default_artifacts_dir(),
            project: default_project(),
        }
    }
}

impl PathsConfig {
    pub fn artifacts(&self) -> PathBuf {
        PathBuf::from(&self.artifacts_dir)
    }

    pub fn publish_dir(&self) -> PathBuf {
        self.artifacts().join("publish")
    }
}

fn default_trial_hosts() -> Vec<String> {
    vec!["api.run.pivotal.io".to_string()]
}

fn default_trial_plan() -> String {
    "trial".to_string()
}

fn default_standard_plan() -> String {
    "standard".to_string()
}

fn default_offering() -> String {
    "p-service-registry".to_string()
}

fn default_instance_name() -> String {
    "eureka".to_string()
}

fn default_ready_timeout() -> u64 {
    300
}

fn default_ready_interval() -> u64 {
    5
}

fn default_artifacts_dir() -> String {
    "artifacts".to_string()
}

fn default_project() -> String {
    ".".to_string()
}

impl ShipwrightConfig {
    /// Reject values that deserialize fine but cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.service_ready.interval_secs == 0 {
            return Err(Error::config_invalid_value(
                "serviceReady.intervalSecs",
                Some("0".to_string()),
                "polling interval must be at least 1 second",
            ));
        }
        Ok(())
    }

    /// Parameters declared in the `params` table. Scalars are stringified, other
    /// JSON values are rejected.
    pub fn parameters(&self) -> Result<Parameters> {
        let mut params = Parameters::new();
        for (key, value) in &self.params {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Null => continue,
                other => {
                    return Err(Error::config_invalid_value(
                        format!("params.{}", key),
                        Some(other.to_string()),
                        "parameter values must be strings, numbers or booleans",
                    ))
                }
            };
            params = params.with(key.clone(), rendered);
        }
        Ok(params)
    }
}

/// Layer parameters: defaults, then the config file, then `SHIPWRIGHT_*`
/// variables, then `Key=Value` assignments from the command line.
pub fn layered_parameters(config: &ShipwrightConfig, assignments: &[String]) -> Result<Parameters> {
    layered_parameters_with(config, assignments, |var| std::env::var(var).ok())
}

pub(crate) fn layered_parameters_with(
    config: &ShipwrightConfig,
    assignments: &[String],
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Parameters> {
    let mut names: Vec<&str> = Param::ALL.to_vec();
    names.extend(
        config
            .params
            .keys()
            .map(String::as_str)
            .filter(|k| !Param::ALL.iter().any(|known| known == k)),
    );

    Ok(Parameters::defaults()
        .merge(config.parameters()?)
        .merge(Parameters::from_lookup(names, lookup))
        .merge(Parameters::from_assignments(assignments)?))
}

/// Load configuration. An explicit path must exist; the default file is optional.
pub fn load(explicit: Option<&str>) -> Result<ShipwrightConfig> {
    match explicit {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw).to_string();
            read_config(Path::new(&expanded))
        }
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            if path.exists() {
                read_config(path)
            } else {
                Ok(ShipwrightConfig::default())
            }
        }
    }
}

fn read_config(path: &Path) -> Result<ShipwrightConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;
    let config: ShipwrightConfig = serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?;
    config.validate()?;
    Ok(config)
}
