//! Parameter schema for the ribbon banner effect plus the tuner's own
//! settings file.

mod params;
mod schema;
mod settings;

pub use params::{
    Appearance, ColorPalette, Interaction, MergeReport, ParameterSet, Performance, Positioning,
    PublishedConfig, Rgb, Thickness, Twist, Wave, PALETTE_SIZE,
};
pub use schema::{FieldDescriptor, FieldId, FieldKind, FieldValue, FIELDS};
pub use settings::{RemoteSettings, TunerSettings, WindowSettings, DEFAULT_CREDENTIAL_ENV};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to parse parameter set: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
