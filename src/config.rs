//! Generator configuration.
//!
//! Everything here is fixed per deployment, not per request: where artifacts go,
//! what the combined files are called, whether team counts are capped and
//! how zip containers are compressed. Hosts usually deserialize it once and share
//! it between concurrent requests.

use crate::error::RosterError;
use crate::helpers::zip::Compression;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_COMBINED_FILE_NAME: &str = "all_teams_combined.xlsx";
pub const DEFAULT_ARCHIVE_FILE_NAME: &str = "all_teams.zip";

/// How generated files reach the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Delivery {
    /// Base64 text embedded in the result
    #[default]
    Inline,
    /// Files written below `root/<run id>/`, returned as relative paths
    Reference { root: PathBuf },
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct GeneratorConfig {
    pub delivery: Delivery,
    pub combined_file_name: String,
    pub archive_file_name: String,
    /// Largest team count a request may ask for; unlimited when absent
    pub max_teams: Option<usize>,
    pub compression: Compression,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            delivery: Delivery::Inline,
            combined_file_name: DEFAULT_COMBINED_FILE_NAME.to_owned(),
            archive_file_name: DEFAULT_ARCHIVE_FILE_NAME.to_owned(),
            max_teams: None,
            compression: Compression::Deflated,
        }
    }
}

impl GeneratorConfig {
    /// Parses and validates a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, RosterError> {
        let config: GeneratorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that file names are plain and distinct, and that a team cap allows at least two teams.
    pub fn validate(&self) -> Result<(), RosterError> {
        for name in [&self.combined_file_name, &self.archive_file_name] {
            let is_plain = !name.is_empty()
                && name != "."
                && name != ".."
                && !name.contains(['/', '\\', '\0']);
            if !is_plain {
                Err(RosterError::ConfigError(format!("'{}' is not a plain file name", name)))?
            }
        }
        if self.combined_file_name.eq_ignore_ascii_case(&self.archive_file_name) {
            Err(RosterError::ConfigError("combined and archive file names must differ".to_owned()))?
        }
        if let Some(max_teams) = self.max_teams.filter(|max_teams| *max_teams < 2) {
            Err(RosterError::ConfigError(format!("maxTeams must be at least 2, got {}", max_teams)))?
        }
        Ok(())
    }
}
