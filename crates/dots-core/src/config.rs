//! Calculation service configuration
//!
//! Values are layered: built-in defaults, then an optional TOML or JSON
//! file, then environment variables. Environment variable names are matched
//! case-insensitively against the field names (`SIMULATION_ID`,
//! `mqtt_qos`, ...).
//!
//! Broker and database endpoints belong to the transport and sink that are
//! handed to the service, not to this struct.

use crate::errors::{DotsError, DotsResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const LOG_LEVELS: &[&str] = &[
    "debug", "info", "warning", "warn", "error", "fatal", "critical",
];

/// Configuration of one calculation service instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Log level name (`debug`, `info`, `warning`, `error`, `critical`, ...)
    pub log_level: String,
    /// Run id assigned by the orchestrator
    pub simulation_id: String,
    /// Instance id of this service within the run
    pub model_id: String,
    /// Quality of service level used for subscriptions (0..=2)
    pub mqtt_qos: u8,
    /// Maximum number of inbound messages handled concurrently
    pub max_workers: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            simulation_id: String::new(),
            model_id: String::new(),
            mqtt_qos: 0,
            max_workers: 16,
        }
    }
}

impl ServiceConfig {
    /// Load defaults, an optional file and the process environment, then validate
    pub fn load(path: Option<&Path>) -> DotsResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML or JSON file
    pub fn load_from_file(path: &Path) -> DotsResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DotsError::config(format!("Failed to read config file: {e}")))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| DotsError::config(format!("Invalid TOML: {e}"))),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| DotsError::config(format!("Invalid JSON: {e}"))),
            _ => Err(DotsError::config("Unsupported file format")),
        }
    }

    /// Merge values from the process environment
    pub fn merge_with_env(&mut self) -> DotsResult<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Merge values from `(name, value)` pairs; unknown names are ignored
    pub fn merge_with_vars<I, K, V>(&mut self, vars: I) -> DotsResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let key = key.as_ref().to_ascii_lowercase();
            if self.has_key(&key) {
                self.set_from_string(&key, value.as_ref())?;
                debug!(key = %key, "Configuration value taken from environment");
            }
        }
        Ok(())
    }

    fn has_key(&self, key: &str) -> bool {
        matches!(
            key,
            "log_level"
                | "simulation_id"
                | "model_id"
                | "mqtt_qos"
                | "max_workers"
        )
    }

    /// Set one value from its string form
    pub fn set_from_string(&mut self, key: &str, value: &str) -> DotsResult<()> {
        match key {
            "log_level" => self.log_level = value.to_string(),
            "simulation_id" => self.simulation_id = value.to_string(),
            "model_id" => self.model_id = value.to_string(),
            "mqtt_qos" => self.mqtt_qos = parse_value(key, value)?,
            "max_workers" => self.max_workers = parse_value(key, value)?,
            _ => {
                return Err(DotsError::config(format!(
                    "Unknown configuration key: {key}"
                )))
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> DotsResult<()> {
        if self.simulation_id.is_empty() {
            return Err(DotsError::config("simulation_id is required"));
        }
        if self.model_id.is_empty() {
            return Err(DotsError::config("model_id is required"));
        }
        if self.mqtt_qos > 2 {
            return Err(DotsError::config(format!(
                "mqtt_qos must be 0, 1 or 2, got {}",
                self.mqtt_qos
            )));
        }
        if self.max_workers == 0 {
            return Err(DotsError::config("max_workers must be greater than 0"));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(DotsError::config(format!(
                "Unknown log level: {}",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Tracing filter directive for the configured log level
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.to_ascii_lowercase().as_str() {
            "debug" => "debug",
            "warning" | "warn" => "warn",
            "error" | "fatal" | "critical" => "error",
            _ => "info",
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> DotsResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DotsError::config(format!("Invalid value for {key}: '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn test_defaults_need_run_identity() {
        let config = ServiceConfig::default();
        assert_eq!(config.mqtt_qos, 0);
        assert_eq!(config.max_workers, 16);
        assert_matches!(config.validate(), Err(DotsError::Config(_)));
    }

    #[test]
    fn test_env_names_are_case_insensitive() {
        let mut config = ServiceConfig::default();
        config
            .merge_with_vars([
                ("SIMULATION_ID", "sim-1"),
                ("Model_Id", "model-a"),
                ("MAX_WORKERS", "2"),
                ("UNRELATED", "ignored"),
            ])
            .unwrap();

        assert_eq!(config.simulation_id, "sim-1");
        assert_eq!(config.model_id, "model-a");
        assert_eq!(config.max_workers, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let mut config = ServiceConfig::default();
        assert_matches!(
            config.merge_with_vars([("MQTT_QOS", "high")]),
            Err(DotsError::Config(_))
        );
    }

    #[test]
    fn test_qos_out_of_range() {
        let mut config = ServiceConfig::default();
        config
            .merge_with_vars([("simulation_id", "s"), ("model_id", "m"), ("mqtt_qos", "3")])
            .unwrap();
        assert_matches!(config.validate(), Err(DotsError::Config(_)));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "simulation_id = \"sim-9\"\nmodel_id = \"model-z\"\nlog_level = \"DEBUG\"\nmax_workers = 4"
        )
        .unwrap();

        let config = ServiceConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.simulation_id, "sim-9");
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.mqtt_qos, 0);
        assert_eq!(config.log_filter(), "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_broker_endpoint_variables_are_ignored() {
        let mut config = ServiceConfig::default();
        config
            .merge_with_vars([("MQTT_HOST", "broker"), ("INFLUXDB_PASSWORD", "hunter2")])
            .unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_matches!(
            config.set_from_string("mqtt_host", "broker"),
            Err(DotsError::Config(_))
        );
    }
}
