//! Build configuration document.
//!
//! The document is TOML. Known top-level keys configure the image; any other
//! key holding a table is a per-package configuration. Every top-level value
//! is classified once into a [`TopLevelValue`] while loading.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use staves_common::StavesError;

/// Parsed build configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConfig {
    /// Image name.
    pub name: Option<String>,
    /// Entrypoint of the image.
    pub command: Vec<String>,
    /// Packages to install.
    pub packages: Vec<String>,
    /// Portage environment.
    pub env: Environment,
    /// Repositories to enable or add.
    pub repositories: Vec<Repository>,
    /// Locale generated for glibc images.
    pub locale: Locale,
    /// Image labels.
    pub annotations: BTreeMap<String, String>,
    /// Per-package configuration keyed by package atom.
    pub package_configs: BTreeMap<String, PackageConfig>,
}

/// Global variables and named environment profiles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// Variables written to `make.conf`.
    pub global: BTreeMap<String, String>,
    /// Named profiles written to `env/<name>`.
    pub profiles: BTreeMap<String, BTreeMap<String, String>>,
}

impl Environment {
    /// Returns true if there is nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.profiles.is_empty()
    }
}

/// A package repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Repository {
    /// Repository name.
    pub name: String,
    /// Sync type (`git`, `rsync`, ...).
    #[serde(default, rename = "type")]
    pub sync_type: Option<String>,
    /// Sync URI.
    #[serde(default)]
    pub uri: Option<String>,
}

/// Locale definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    /// Locale name.
    pub name: String,
    /// Character set.
    pub charset: String,
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            name: "C".to_string(),
            charset: "UTF-8".to_string(),
        }
    }
}

/// Per-package Portage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    /// Environment profiles applied to the package.
    #[serde(default)]
    pub env: Vec<String>,
    /// Accepted keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// USE flags.
    #[serde(default, rename = "use")]
    pub use_flags: Vec<String>,
}

/// A top-level value of the configuration document.
#[derive(Debug, Clone, PartialEq)]
pub enum TopLevelValue {
    /// `name`
    Name(String),
    /// `command`
    Command(Vec<String>),
    /// `packages`
    Packages(Vec<String>),
    /// `env`
    Env(Environment),
    /// `repositories`
    Repositories(Vec<Repository>),
    /// `locale`
    Locale(Locale),
    /// `annotations`
    Annotations(BTreeMap<String, String>),
    /// Any other key holding a table.
    Package(PackageConfig),
    /// Any other key holding a scalar or array.
    Ignored(toml::Value),
}

impl TopLevelValue {
    /// Classify the value stored under `key`.
    pub fn classify(key: &str, value: toml::Value) -> Result<Self, ConfigError> {
        let invalid = |e: toml::de::Error| ConfigError::Invalid {
            key: key.to_string(),
            message: e.message().to_string(),
        };

        Ok(match key {
            "name" => Self::Name(value.try_into().map_err(invalid)?),
            "command" => Self::Command(match value.try_into().map_err(invalid)? {
                CommandSpec::Single(cmd) if cmd.is_empty() => Vec::new(),
                CommandSpec::Single(cmd) => vec![cmd],
                CommandSpec::Argv(argv) => argv,
            }),
            "packages" => Self::Packages(value.try_into().map_err(invalid)?),
            "env" => Self::Env(parse_environment(value)?),
            "repositories" => Self::Repositories(value.try_into().map_err(invalid)?),
            "locale" => Self::Locale(value.try_into().map_err(invalid)?),
            "annotations" => Self::Annotations(string_map(key, value)?),
            _ => match value {
                toml::Value::Table(_) => Self::Package(value.try_into().map_err(invalid)?),
                other => Self::Ignored(other),
            },
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandSpec {
    Single(String),
    Argv(Vec<String>),
}

impl BuildConfig {
    /// Parse a configuration document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(content)?;
        let mut config = Self::default();

        for (key, value) in table {
            match TopLevelValue::classify(&key, value)? {
                TopLevelValue::Name(name) => config.name = Some(name),
                TopLevelValue::Command(command) => config.command = command,
                TopLevelValue::Packages(packages) => config.packages = packages,
                TopLevelValue::Env(env) => config.env = env,
                TopLevelValue::Repositories(repos) => config.repositories = repos,
                TopLevelValue::Locale(locale) => config.locale = locale,
                TopLevelValue::Annotations(annotations) => config.annotations = annotations,
                TopLevelValue::Package(package) => {
                    config.package_configs.insert(key, package);
                }
                TopLevelValue::Ignored(_) => {
                    tracing::warn!(key = %key, "Ignoring unknown configuration key");
                }
            }
        }

        Ok(config)
    }
}

fn parse_environment(value: toml::Value) -> Result<Environment, ConfigError> {
    let toml::Value::Table(table) = value else {
        return Err(ConfigError::Invalid {
            key: "env".to_string(),
            message: "expected a table".to_string(),
        });
    };

    let mut env = Environment::default();
    for (name, value) in table {
        match value {
            toml::Value::Table(_) => {
                let profile = string_map(&format!("env.{name}"), value)?;
                env.profiles.insert(name, profile);
            }
            other => {
                let value = scalar_to_string(&format!("env.{name}"), &other)?;
                env.global.insert(name, value);
            }
        }
    }
    Ok(env)
}

fn string_map(key: &str, value: toml::Value) -> Result<BTreeMap<String, String>, ConfigError> {
    let toml::Value::Table(table) = value else {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            message: "expected a table".to_string(),
        });
    };

    table
        .iter()
        .map(|(k, v)| Ok((k.clone(), scalar_to_string(&format!("{key}.{k}"), v)?)))
        .collect()
}

fn scalar_to_string(key: &str, value: &toml::Value) -> Result<String, ConfigError> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        toml::Value::Datetime(d) => Ok(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => Err(ConfigError::Invalid {
            key: key.to_string(),
            message: "expected a scalar value".to_string(),
        }),
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ConfigError {
    /// Syntax error.
    #[error("Failed to parse configuration: {0}")]
    #[diagnostic(code(staves::config::parse))]
    Parse(#[from] toml::de::Error),
    /// A key has the wrong shape.
    #[error("Invalid value for '{key}': {message}")]
    #[diagnostic(code(staves::config::invalid))]
    Invalid {
        /// Offending key.
        key: String,
        /// What is wrong with it.
        message: String,
    },
}

impl From<ConfigError> for StavesError {
    fn from(err: ConfigError) -> Self {
        Self::config(err.to_string())
    }
}
