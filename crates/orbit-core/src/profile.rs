//! Study profile: the subset of the dashboard's `config.json` the engine reads.

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OrbitError, Result};

/// Topics the run draws from. Every other dashboard field is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudyProfile {
    #[serde(default)]
    pub user_name: Option<String>,
    /// Free-form interests used for fact prompts.
    #[serde(default)]
    pub interests: Vec<String>,
    /// Units currently being studied, used for quiz prompts.
    #[serde(default)]
    pub current_units: Vec<String>,
}

impl StudyProfile {
    /// Read the profile from `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist; the caller treats that
    /// as "nothing to do this run" rather than an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(OrbitError::Io(e)),
        };
        let profile = serde_json::from_str(&data).map_err(|e| OrbitError::Profile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(profile))
    }
}
