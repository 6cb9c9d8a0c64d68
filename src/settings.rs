//! Layered settings for the `measure` command.
//!
//! Values are merged as defaults < settings file < environment < command line,
//! then validated once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::buffer::OverflowPolicy;
use crate::error::{HarnessError, Result};
use crate::stream::{Selector, SyntheticConfig};

pub const SETTINGS_FILE_ENV: &str = "STREAM_HARNESS_SETTINGS_FILE";

const ENV_STREAM_KEY: &str = "STREAM_HARNESS_STREAM_KEY";
const ENV_STREAM_VALUE: &str = "STREAM_HARNESS_STREAM_VALUE";
const ENV_DURATION: &str = "STREAM_HARNESS_DURATION_SECONDS";
const ENV_CHUNK_SIZE: &str = "STREAM_HARNESS_CHUNK_SIZE";
const ENV_NOMINAL_RATE: &str = "STREAM_HARNESS_NOMINAL_SAMPLE_RATE";
const ENV_OUTPUT_DIRECTORY: &str = "STREAM_HARNESS_OUTPUT_DIRECTORY";
const ENV_RING_CAPACITY: &str = "STREAM_HARNESS_RING_CAPACITY";
const ENV_OVERFLOW_POLICY: &str = "STREAM_HARNESS_OVERFLOW_POLICY";
const ENV_RESOURCE_INTERVAL: &str = "STREAM_HARNESS_RESOURCE_INTERVAL_SECONDS";
const ENV_SUMMARY: &str = "STREAM_HARNESS_SUMMARY";
const ENV_VERBOSE_SUMMARY: &str = "STREAM_HARNESS_VERBOSE_SUMMARY";
const ENV_JSON_SUMMARY: &str = "STREAM_HARNESS_JSON_SUMMARY";

/// Fully resolved configuration for one measurement run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureSettings {
    pub stream_key: String,
    pub stream_value: String,
    pub duration_seconds: f64,
    pub chunk_size: usize,
    pub nominal_sample_rate: f64,
    pub output_directory: PathBuf,
    pub ring_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub resource_sample_interval_seconds: f64,
    pub print_summary: bool,
    pub verbose_summary: bool,
    pub json_summary: bool,
    pub synthetic: SyntheticConfig,
}

impl Default for MeasureSettings {
    fn default() -> Self {
        Self {
            stream_key: "type".to_string(),
            stream_value: "EEG".to_string(),
            duration_seconds: 10.0,
            chunk_size: 32,
            nominal_sample_rate: 1000.0,
            output_directory: PathBuf::from("results/run_001"),
            ring_capacity: 256,
            overflow_policy: OverflowPolicy::DropOldest,
            resource_sample_interval_seconds: 0.5,
            print_summary: true,
            verbose_summary: false,
            json_summary: false,
            synthetic: SyntheticConfig::default(),
        }
    }
}

impl MeasureSettings {
    pub fn selector(&self) -> Result<Selector> {
        Selector::new(self.stream_key.clone(), self.stream_value.clone())
    }

    pub fn duration(&self) -> Result<Duration> {
        seconds("duration_seconds", self.duration_seconds)
    }

    pub fn resource_sample_interval(&self) -> Result<Duration> {
        seconds(
            "resource_sample_interval_seconds",
            self.resource_sample_interval_seconds,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream_key.trim().is_empty() {
            return Err(invalid("stream_key must not be empty"));
        }
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size must be at least 1"));
        }
        if self.ring_capacity == 0 {
            return Err(invalid("ring_capacity must be at least 1"));
        }
        if !(self.duration_seconds > 0.0) || !self.duration_seconds.is_finite() {
            return Err(invalid("duration_seconds must be positive"));
        }
        if !(self.nominal_sample_rate > 0.0) {
            return Err(invalid("nominal_sample_rate must be positive"));
        }
        if !(self.resource_sample_interval_seconds > 0.0)
            || !self.resource_sample_interval_seconds.is_finite()
        {
            return Err(invalid("resource_sample_interval_seconds must be positive"));
        }
        if Instant::now().checked_add(self.duration()?).is_none() {
            return Err(invalid("duration_seconds is too large"));
        }
        self.resource_sample_interval()?;
        self.synthetic.validate()
    }

    /// Merge every layer using the process environment.
    pub fn from_sources(cli: SettingsOverrides, settings_file: Option<PathBuf>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_sources_with_env(cli, settings_file, &env)
    }

    /// Merge every layer with an explicit environment map.
    pub fn from_sources_with_env(
        cli: SettingsOverrides,
        settings_file: Option<PathBuf>,
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(path) = resolve_settings_path(settings_file, env) {
            if !path.exists() {
                return Err(HarnessError::SettingsNotFound(path));
            }
            debug!("Loading settings from {}", path.display());
            let file = SettingsFile::load(&path)?;
            file.measure.apply_to(&mut settings);
            if let Some(synthetic) = file.synthetic {
                settings.synthetic = synthetic;
            }
        }

        SettingsOverrides::from_env(env)?.apply_to(&mut settings);
        cli.apply_to(&mut settings);

        settings.validate()?;
        Ok(settings)
    }
}

/// One partial layer of settings. `None` leaves the lower layer's value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SettingsOverrides {
    pub stream_key: Option<String>,
    pub stream_value: Option<String>,
    pub duration_seconds: Option<f64>,
    pub chunk_size: Option<usize>,
    pub nominal_sample_rate: Option<f64>,
    pub output_directory: Option<PathBuf>,
    pub ring_capacity: Option<usize>,
    pub overflow_policy: Option<OverflowPolicy>,
    pub resource_sample_interval_seconds: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub print_summary: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub verbose_summary: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub json_summary: Option<bool>,
}

impl SettingsOverrides {
    /// Read the supported variables. Unset and empty variables are skipped.
    pub fn from_env(env: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| env_value(env, key);

        Ok(Self {
            stream_key: get(ENV_STREAM_KEY).map(str::to_string),
            stream_value: get(ENV_STREAM_VALUE).map(str::to_string),
            duration_seconds: get(ENV_DURATION).map(|v| parse_number(ENV_DURATION, v)).transpose()?,
            chunk_size: get(ENV_CHUNK_SIZE).map(|v| parse_number(ENV_CHUNK_SIZE, v)).transpose()?,
            nominal_sample_rate: get(ENV_NOMINAL_RATE)
                .map(|v| parse_number(ENV_NOMINAL_RATE, v))
                .transpose()?,
            output_directory: get(ENV_OUTPUT_DIRECTORY).map(PathBuf::from),
            ring_capacity: get(ENV_RING_CAPACITY)
                .map(|v| parse_number(ENV_RING_CAPACITY, v))
                .transpose()?,
            overflow_policy: get(ENV_OVERFLOW_POLICY)
                .map(str::parse::<OverflowPolicy>)
                .transpose()?,
            resource_sample_interval_seconds: get(ENV_RESOURCE_INTERVAL)
                .map(|v| parse_number(ENV_RESOURCE_INTERVAL, v))
                .transpose()?,
            print_summary: get(ENV_SUMMARY).map(parse_bool).transpose()?,
            verbose_summary: get(ENV_VERBOSE_SUMMARY).map(parse_bool).transpose()?,
            json_summary: get(ENV_JSON_SUMMARY).map(parse_bool).transpose()?,
        })
    }

    pub fn apply_to(self, settings: &mut MeasureSettings) {
        if let Some(v) = self.stream_key {
            settings.stream_key = v;
        }
        if let Some(v) = self.stream_value {
            settings.stream_value = v;
        }
        if let Some(v) = self.duration_seconds {
            settings.duration_seconds = v;
        }
        if let Some(v) = self.chunk_size {
            settings.chunk_size = v;
        }
        if let Some(v) = self.nominal_sample_rate {
            settings.nominal_sample_rate = v;
        }
        if let Some(v) = self.output_directory {
            settings.output_directory = expand_home(&v);
        }
        if let Some(v) = self.ring_capacity {
            settings.ring_capacity = v;
        }
        if let Some(v) = self.overflow_policy {
            settings.overflow_policy = v;
        }
        if let Some(v) = self.resource_sample_interval_seconds {
            settings.resource_sample_interval_seconds = v;
        }
        if let Some(v) = self.print_summary {
            settings.print_summary = v;
        }
        if let Some(v) = self.verbose_summary {
            settings.verbose_summary = v;
        }
        if let Some(v) = self.json_summary {
            settings.json_summary = v;
        }
    }
}

struct SettingsFile {
    measure: SettingsOverrides,
    synthetic: Option<SyntheticConfig>,
}

impl SettingsFile {
    fn load(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let text = std::fs::read_to_string(path)?;

        let document: serde_json::Value = match extension.as_str() {
            "json" => serde_json::from_str(&text)
                .map_err(|e| HarnessError::SettingsParse(e.to_string()))?,
            "toml" => {
                let value: toml::Value =
                    toml::from_str(&text).map_err(|e| HarnessError::SettingsParse(e.to_string()))?;
                serde_json::to_value(value)?
            }
            _ => {
                return Err(HarnessError::UnsupportedSettingsFormat(format!(".{}", extension)))
            }
        };

        let serde_json::Value::Object(root) = document else {
            return Err(HarnessError::SettingsParse(
                "settings file must contain a top-level mapping".to_string(),
            ));
        };

        let synthetic = match root.get("synthetic") {
            Some(section) => Some(
                serde_json::from_value(section.clone())
                    .map_err(|e| HarnessError::SettingsParse(format!("[synthetic]: {}", e)))?,
            ),
            None => None,
        };

        let measure_section = match root.get("measure").cloned() {
            Some(section @ serde_json::Value::Object(_)) => section,
            Some(_) => {
                return Err(HarnessError::SettingsParse(
                    "'measure' section must be a mapping".to_string(),
                ))
            }
            None => serde_json::Value::Object(root),
        };
        let measure = serde_json::from_value(measure_section)
            .map_err(|e| HarnessError::SettingsParse(e.to_string()))?;

        Ok(Self { measure, synthetic })
    }
}

/// Settings path from the command line, else from the environment.
pub fn resolve_settings_path(
    cli_path: Option<PathBuf>,
    env: &HashMap<String, String>,
) -> Option<PathBuf> {
    if cli_path.is_some() {
        return cli_path;
    }
    env.get(SETTINGS_FILE_ENV)
        .filter(|v| !v.is_empty())
        .map(|v| expand_home(Path::new(v)))
}

/// Replace a leading `~` with the home directory when one is known.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

/// Accepts `1/true/t/yes/y/on` and `0/false/f/no/n/off`, any case.
pub fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        _ => Err(invalid(&format!("cannot interpret '{}' as a boolean", raw))),
    }
}

fn env_value<'a>(env: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    env.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| invalid(&format!("{} has an invalid value '{}'", key, raw)))
}

fn invalid(message: &str) -> HarnessError {
    HarnessError::InvalidConfig(message.to_string())
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| HarnessError::InvalidConfig(format!("{} is out of range: {}", name, e)))
}

fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
        Float(f64),
        Text(String),
    }

    let raw: Option<Raw> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(Raw::Bool(b)) => Ok(Some(b)),
        Some(Raw::Int(n)) => Ok(Some(n != 0)),
        Some(Raw::Float(n)) => Ok(Some(n != 0.0)),
        Some(Raw::Text(s)) => parse_bool(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_variants() {
        for raw in ["1", "TRUE", " yes ", "on", "t", "Y"] {
            assert!(parse_bool(raw).unwrap(), "{raw}");
        }
        for raw in ["0", "False", "no", "OFF", "f", "n"] {
            assert!(!parse_bool(raw).unwrap(), "{raw}");
        }
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = MeasureSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.selector().unwrap().to_string(), "type==EEG");
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home(Path::new("results/x")), PathBuf::from("results/x"));
    }
}
