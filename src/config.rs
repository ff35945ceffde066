//
// config.rs
// dicom-veil
//
// Optional TOML configuration: where deliverables go, how archives are named, and profile edits.
//

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dictionary::TagKey;
use crate::error::{Result, VeilError};
use crate::exporter::DEFAULT_ARCHIVE_PREFIX;
use crate::profile::AnonymizationProfile;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct VeilConfig {
    pub output_dir: PathBuf,
    pub archive_prefix: String,
    /// Pins replacement tokens so repeated runs produce identical output.
    pub seed: Option<u64>,
    pub profile: ProfileConfig,
}

impl Default for VeilConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("anonymized"),
            archive_prefix: DEFAULT_ARCHIVE_PREFIX.to_string(),
            seed: None,
            profile: ProfileConfig::default(),
        }
    }
}

/// Edits layered over the default profile. Keys are dictionary key names.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileConfig {
    pub disabled: Vec<String>,
    pub overrides: BTreeMap<String, String>,
}

impl VeilConfig {
    /// Loads `path` when given, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = fs::read_to_string(path)?;
                Self::from_toml(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| VeilError::Config(e.to_string()))
    }

    pub fn build_profile(&self) -> Result<AnonymizationProfile> {
        let mut profile = AnonymizationProfile::default();
        self.profile.apply(&mut profile)?;
        Ok(profile)
    }
}

impl ProfileConfig {
    pub fn apply(&self, profile: &mut AnonymizationProfile) -> Result<()> {
        for name in &self.disabled {
            profile.set_enabled(name.parse::<TagKey>()?, false);
        }
        for (name, value) in &self.overrides {
            profile.set_override(name.parse::<TagKey>()?, Some(value.clone()));
        }
        Ok(())
    }
}
