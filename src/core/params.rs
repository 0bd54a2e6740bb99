//! Named parameters handed to every target.
//!
//! Values are layered from lowest to highest precedence: declared defaults,
//! the config file, `SHIPWRIGHT_*` environment variables and `--param` pairs.
//! Once built, a `Parameters` value is never mutated.

use std::collections::BTreeMap;
use std::str::FromStr;

use heck::ToShoutySnakeCase;
use serde::Serialize;

use crate::error::{Error, Result};

pub const ENV_PREFIX: &str = "SHIPWRIGHT_";

/// Well-known parameter names.
pub struct Param;

impl Param {
    pub const CONFIGURATION: &'static str = "Configuration";
    pub const VERSION: &'static str = "Version";
    pub const PUBLISH_COMMAND: &'static str = "PublishCommand";
    pub const PACKAGE_NAME: &'static str = "PackageName";
    pub const GITHUB_TOKEN: &'static str = "GitHubToken";
    pub const APPS_COUNT: &'static str = "AppsCount";
    pub const APP_NAME_PREFIX: &'static str = "AppNamePrefix";
    pub const CF_SKIP_LOGIN: &'static str = "CfSkipLogin";
    pub const CF_USERNAME: &'static str = "CfUsername";
    pub const CF_PASSWORD: &'static str = "CfPassword";
    pub const CF_API_ENDPOINT: &'static str = "CfApiEndpoint";
    pub const CF_ORG: &'static str = "CfOrg";
    pub const CF_SPACE: &'static str = "CfSpace";
    pub const CF_DOMAIN: &'static str = "CfDomain";
    pub const SERVICE_PLAN: &'static str = "ServicePlan";

    /// Every well-known name, in the order `SHIPWRIGHT_*` variables are read.
    pub const ALL: [&'static str; 15] = [
        Self::CONFIGURATION,
        Self::VERSION,
        Self::PUBLISH_COMMAND,
        Self::PACKAGE_NAME,
        Self::GITHUB_TOKEN,
        Self::APPS_COUNT,
        Self::APP_NAME_PREFIX,
        Self::CF_SKIP_LOGIN,
        Self::CF_USERNAME,
        Self::CF_PASSWORD,
        Self::CF_API_ENDPOINT,
        Self::CF_ORG,
        Self::CF_SPACE,
        Self::CF_DOMAIN,
        Self::SERVICE_PLAN,
    ];
}

pub const DEFAULT_APPS_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Configuration {
    Debug,
    Release,
}

impl Configuration {
    /// Release on CI servers, Debug for local runs.
    pub fn detect() -> Self {
        if std::env::var_os("CI").is_some_and(|v| !v.is_empty()) {
            Configuration::Release
        } else {
            Configuration::Debug
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Configuration::Debug => "Debug",
            Configuration::Release => "Release",
        }
    }
}

impl FromStr for Configuration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Configuration::Debug),
            "release" => Ok(Configuration::Release),
            _ => Err(Error::config_invalid_value(
                Param::CONFIGURATION,
                Some(s.to_string()),
                "expected Debug or Release",
            )),
        }
    }
}

/// Environment variable consulted for a parameter, e.g. `AppsCount` -> `SHIPWRIGHT_APPS_COUNT`.
pub fn env_var_name(param: &str) -> String {
    format!("{}{}", ENV_PREFIX, param.to_shouty_snake_case())
}

/// Split a `Key=Value` CLI pair.
pub fn parse_assignment(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(Error::validation_invalid_argument(
            "param",
            format!("Expected Key=Value, got '{}'", raw),
            None,
        )),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Parameters {
    values: BTreeMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used for layering and in tests.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merge(mut self, other: Parameters) -> Self {
        self.values.extend(other.values);
        self
    }

    /// Defaults that apply before any user input.
    pub fn defaults() -> Self {
        Self::new()
            .with(Param::CONFIGURATION, Configuration::detect().as_str())
            .with(Param::APPS_COUNT, DEFAULT_APPS_COUNT.to_string())
    }

    /// Pick up `SHIPWRIGHT_*` variables for every name in `names`.
    pub fn from_env<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self::from_lookup(names, |var| std::env::var(var).ok())
    }

    pub(crate) fn from_lookup<'a>(
        names: impl IntoIterator<Item = &'a str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut params = Self::new();
        for name in names {
            if let Some(value) = lookup(&env_var_name(name)) {
                params.values.insert(name.to_string(), value);
            }
        }
        params
    }

    pub fn from_assignments(pairs: &[String]) -> Result<Self> {
        let mut params = Self::new();
        for pair in pairs {
            let (key, value) = parse_assignment(pair)?;
            params.values.insert(key, value);
        }
        Ok(params)
    }

    /// Value of `key`, treating empty strings as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Required value; absent keys surface as a missing parameter of `target`.
    pub fn require(&self, target: &str, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::missing_parameter(target, vec![key.to_string()]))
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("true" | "1" | "yes" | "on")
        )
    }

    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                Error::config_invalid_value(key, Some(raw.to_string()), e.to_string())
            }),
        }
    }

    pub fn configuration(&self) -> Result<Configuration> {
        match self.get(Param::CONFIGURATION) {
            Some(raw) => raw.parse(),
            None => Ok(Configuration::detect()),
        }
    }

    pub fn apps_count(&self) -> Result<usize> {
        Ok(self
            .parse::<usize>(Param::APPS_COUNT)?
            .unwrap_or(DEFAULT_APPS_COUNT))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}
