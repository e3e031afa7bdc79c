use chrono::{DateTime, Local, Utc};
use ribbonconfig::{MergeReport, ParameterSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::storage::ProfileStorage;

/// Storage key holding the serialised profile list.
pub const PROFILES_KEY: &str = "ribbon-banner-profiles";

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profile name must not be empty")]
    EmptyName,
    #[error("a profile named '{0}' already exists")]
    Duplicate(String),
    #[error("no profile named '{0}'")]
    NotFound(String),
    #[error("failed to persist profiles: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialise profiles: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A named snapshot of the full parameter set, colours included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "savedAt")]
    pub saved_at: i64,
    /// Kept as raw JSON so that fields unknown to this build survive a
    /// rewrite of the list.
    pub config: Value,
}

impl Profile {
    pub fn new(name: impl Into<String>, params: &ParameterSet) -> Result<Self, ProfileError> {
        Ok(Self {
            name: name.into(),
            saved_at: Utc::now().timestamp_millis(),
            config: serde_json::to_value(params)?,
        })
    }

    pub fn saved_at_local(&self) -> Option<DateTime<Local>> {
        DateTime::<Utc>::from_timestamp_millis(self.saved_at).map(|time| time.with_timezone(&Local))
    }
}

/// Ordered list of profiles, written back to storage after every mutation.
///
/// A mutation only takes effect in memory once the new list has been
/// persisted.
#[derive(Debug)]
pub struct ProfileStore<S: ProfileStorage> {
    storage: S,
    profiles: Vec<Profile>,
}

fn normalise_name(name: &str) -> Result<&str, ProfileError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(ProfileError::EmptyName)
    } else {
        Ok(trimmed)
    }
}

impl<S: ProfileStorage> ProfileStore<S> {
    /// Loads the list from `storage`. Unreadable or corrupt data degrades to
    /// an empty list.
    pub fn open(storage: S) -> Self {
        let profiles = match storage.read(PROFILES_KEY) {
            Ok(Some(contents)) => match serde_json::from_str::<Vec<Profile>>(&contents) {
                Ok(profiles) => profiles,
                Err(err) => {
                    warn!("stored profiles are corrupt; starting with an empty list: {err}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("failed to read stored profiles; starting with an empty list: {err}");
                Vec::new()
            }
        };
        debug!(count = profiles.len(), "loaded profiles");
        Self { storage, profiles }
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|profile| profile.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        let name = name.trim();
        self.profiles.iter().find(|profile| profile.name == name)
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Appends a snapshot of `params` under `name`.
    pub fn save(&mut self, name: &str, params: &ParameterSet) -> Result<&Profile, ProfileError> {
        let name = normalise_name(name)?;
        if self.get(name).is_some() {
            return Err(ProfileError::Duplicate(name.to_string()));
        }
        let mut next = self.profiles.clone();
        next.push(Profile::new(name, params)?);
        self.commit(next)?;
        let index = self.profiles.len() - 1;
        Ok(&self.profiles[index])
    }

    /// Overlays the named snapshot onto `params` field by field.
    pub fn load(&self, name: &str, params: &mut ParameterSet) -> Result<MergeReport, ProfileError> {
        let profile = self
            .get(name)
            .ok_or_else(|| ProfileError::NotFound(name.trim().to_string()))?;
        let report = params.merge_json(&profile.config);
        debug!(
            profile = %profile.name,
            applied = report.applied,
            skipped = report.skipped,
            "loaded profile"
        );
        Ok(report)
    }

    /// Renames in place, keeping the profile's position in the list.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), ProfileError> {
        let to = normalise_name(to)?;
        let from = from.trim();
        let index = self
            .profiles
            .iter()
            .position(|profile| profile.name == from)
            .ok_or_else(|| ProfileError::NotFound(from.to_string()))?;
        if from == to {
            return Ok(());
        }
        if self.get(to).is_some() {
            return Err(ProfileError::Duplicate(to.to_string()));
        }
        let mut next = self.profiles.clone();
        next[index].name = to.to_string();
        self.commit(next)
    }

    pub fn delete(&mut self, name: &str) -> Result<Profile, ProfileError> {
        let name = name.trim();
        let index = self
            .profiles
            .iter()
            .position(|profile| profile.name == name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        let mut next = self.profiles.clone();
        let removed = next.remove(index);
        self.commit(next)?;
        Ok(removed)
    }

    fn commit(&mut self, next: Vec<Profile>) -> Result<(), ProfileError> {
        let contents = serde_json::to_string_pretty(&next)?;
        self.storage.write(PROFILES_KEY, &contents)?;
        self.profiles = next;
        Ok(())
    }
}
