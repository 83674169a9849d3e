use crate::core::config::data::{path_display, Config, CONFIG_VERSION};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Errors that can occur when loading or saving configuration.
///
/// Only unreadable files and TOML syntax errors fail a load; bad fields and
/// records are defaulted or skipped with a warning.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid TOML at all.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Failed to write the configuration file.
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ConfigError {
    fn display_path(path: &Path) -> String {
        path_display(path)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(
                    f,
                    "Failed to read config at {}: {}",
                    Self::display_path(path),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse config at {}: {}",
                    Self::display_path(path),
                    source
                )
            }
            ConfigError::Write { path, source } => {
                write!(
                    f,
                    "Failed to write config at {}: {}",
                    Self::display_path(path),
                    source
                )
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Write { source, .. } => Some(source),
        }
    }
}

const SECTIONS: &[&str] = &["general", "hud", "tabs", "suggestions"];
const RECORDS: &[&str] = &["rules", "channels", "formatters", "suggestors"];

impl Config {
    /// Load from `config_path`, or defaults when the file does not exist.
    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if !config_path.exists() {
            debug!(path = %path_display(config_path), "no config file; using defaults");
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        Config::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })
    }

    /// Parse TOML, falling back to defaults field by field.
    pub fn from_toml_str(contents: &str) -> Result<Config, toml::de::Error> {
        let table: toml::Table = toml::from_str(contents)?;

        let config_version = match table.get("config_version") {
            None => CONFIG_VERSION,
            Some(value) => match value.as_integer().and_then(|v| u32::try_from(v).ok()) {
                Some(version) => version,
                None => {
                    warn!(value = %value, "config_version is not a version number; assuming {CONFIG_VERSION}");
                    CONFIG_VERSION
                }
            },
        };
        if config_version > CONFIG_VERSION {
            warn!(
                found = config_version,
                supported = CONFIG_VERSION,
                "config was written by a newer version; unknown settings are ignored"
            );
        }

        for key in table.keys() {
            let known = key == "config_version"
                || SECTIONS.contains(&key.as_str())
                || RECORDS.contains(&key.as_str());
            if !known {
                debug!(key = %key, "ignoring unknown config key");
            }
        }

        let config = Config {
            config_version: CONFIG_VERSION,
            general: lenient_section(&table, "general"),
            hud: lenient_section(&table, "hud"),
            tabs: lenient_section(&table, "tabs"),
            suggestions: lenient_section(&table, "suggestions"),
            rules: lenient_records(&table, "rules"),
            channels: lenient_records(&table, "channels"),
            formatters: lenient_records(&table, "formatters"),
            suggestors: lenient_records(&table, "suggestors"),
        };
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Write atomically through a temporary file in the same directory.
    pub fn save_to_path(&self, config_path: &Path) -> Result<(), ConfigError> {
        let write_error = |source: std::io::Error| ConfigError::Write {
            path: config_path.to_path_buf(),
            source,
        };
        let parent = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(write_error)?;
        }

        let contents = self
            .to_toml_string()
            .map_err(|err| write_error(std::io::Error::other(err)))?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(write_error)?;

        temp_file
            .write_all(contents.as_bytes())
            .map_err(write_error)?;
        temp_file.as_file_mut().sync_all().map_err(write_error)?;
        temp_file
            .persist(config_path)
            .map_err(|err| write_error(err.error))?;
        Ok(())
    }

    /// `<config dir>/chatdeck/config.toml` for the current user.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "chatdeck", "chatdeck")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Read one `[section]`, keeping the default for any field that is missing
/// or has the wrong type.
fn lenient_section<T>(table: &toml::Table, key: &str) -> T
where
    T: Serialize + DeserializeOwned + Default,
{
    let Some(value) = table.get(key) else {
        return T::default();
    };
    let Some(incoming) = value.as_table() else {
        warn!(section = key, "config section is not a table; using defaults");
        return T::default();
    };
    let mut merged = match toml::Value::try_from(T::default()) {
        Ok(toml::Value::Table(defaults)) => defaults,
        _ => return T::default(),
    };

    for (field, field_value) in incoming {
        if !merged.contains_key(field) {
            debug!(section = key, field = %field, "ignoring unknown config field");
            continue;
        }
        let mut candidate = merged.clone();
        candidate.insert(field.clone(), field_value.clone());
        if toml::Value::Table(candidate.clone()).try_into::<T>().is_ok() {
            merged = candidate;
        } else {
            warn!(section = key, field = %field, value = %field_value, "invalid config value; using default");
        }
    }

    toml::Value::Table(merged).try_into().unwrap_or_default()
}

/// Read a `[[records]]` array, skipping records that do not deserialise.
fn lenient_records<T: DeserializeOwned>(table: &toml::Table, key: &str) -> Vec<T> {
    let Some(value) = table.get(key) else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        warn!(section = key, "config records are not an array; ignoring");
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match item.clone().try_into::<T>() {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(section = key, index, error = %err, "skipping corrupt config record");
                None
            }
        })
        .collect()
}
