use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::params::ColorPalette;
use crate::ConfigError;

/// Environment variable consulted for the publish credential by default.
pub const DEFAULT_CREDENTIAL_ENV: &str = "RIBBONTUNE_CREDENTIAL";

/// Contents of `ribbontune.toml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TunerSettings {
    pub version: u32,
    #[serde(
        default = "default_debounce",
        deserialize_with = "deserialize_duration"
    )]
    pub debounce: Duration,
    #[serde(default)]
    pub window: WindowSettings,
    #[serde(default)]
    pub colors: Option<ColorPalette>,
    #[serde(default)]
    pub remote: Option<RemoteSettings>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 360,
            title: "Ribbon Banner Preview".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteSettings {
    pub endpoint: String,
    #[serde(default = "default_credential_env")]
    pub credential_env: String,
}

impl Default for TunerSettings {
    fn default() -> Self {
        Self {
            version: 1,
            debounce: default_debounce(),
            window: WindowSettings::default(),
            colors: None,
            remote: None,
        }
    }
}

fn default_debounce() -> Duration {
    Duration::from_millis(150)
}

fn default_credential_env() -> String {
    DEFAULT_CREDENTIAL_ENV.to_string()
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of milliseconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_millis(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_millis(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v / 1000.0))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl TunerSettings {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: TunerSettings = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported settings version {}; expected 1",
                self.version
            )));
        }

        if self.debounce > Duration::from_secs(5) {
            return Err(ConfigError::Invalid(format!(
                "debounce of {} is too long; keep it under 5s",
                humantime::format_duration(self.debounce)
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(
                "window width and height must be greater than zero".into(),
            ));
        }

        if let Some(remote) = &self.remote {
            let endpoint = remote.endpoint.trim();
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "remote endpoint '{endpoint}' must be an http(s) URL"
                )));
            }
            if remote.credential_env.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "remote credential_env may not be empty".into(),
                ));
            }
        }

        Ok(())
    }
}
