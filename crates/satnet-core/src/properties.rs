//! Flat `key=value` run configuration files
//!
//! Blank lines and lines starting with `#` are skipped. Values may be wrapped
//! in double quotes, which are stripped.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::ConfigError;

/// Parsed key/value properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut values = BTreeMap::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::MalformedLine {
                    line: index + 1,
                    content: raw.to_string(),
                });
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::MalformedLine {
                    line: index + 1,
                    content: raw.to_string(),
                });
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            values.insert(key.to_string(), value.to_string());
        }
        Ok(Self { values })
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Parse a required value
    pub fn require<T: FromStr>(&self, key: &str) -> Result<T, ConfigError> {
        let raw = self
            .get(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;
        raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        })
    }

    /// Parse an optional value, falling back to `default` when absent
    pub fn get_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        if self.contains(key) {
            self.require(key)
        } else {
            Ok(default)
        }
    }

    /// Boolean flags are written as `true`/`false`
    pub fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        self.get_or(key, false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
