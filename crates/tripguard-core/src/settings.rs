use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::checks::{DEFAULT_DIR_CHECKS, DEFAULT_FILE_CHECKS};
use crate::crypto::KdfParams;
use crate::error::{Error, Result};

/// Defaults that command line flags override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub file_checks: String,
    pub dir_checks: String,
    pub kdf: KdfParams,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            file_checks: DEFAULT_FILE_CHECKS.into(),
            dir_checks: DEFAULT_DIR_CHECKS.into(),
            kdf: KdfParams::default(),
        }
    }
}

impl Settings {
    /// Read settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let settings: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        settings
            .kdf
            .check_bounds()
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Ok(settings)
    }
}
