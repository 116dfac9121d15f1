//! Runtime settings file.
//!
//! An optional TOML file carrying what an application would otherwise
//! hardcode: the global config tags and extra database files to load on top
//! of the default one.
//!
//! ```toml
//! tags = ["linux", "sdl"]
//! databases = ["/usr/share/padmap/extra.txt"]
//! ```
//!
//! Missing file is not an error ([`Settings::load_default`] returns
//! `Ok(None)`); a malformed file is.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// File name `load_default` looks for in the OS config directory.
const SETTINGS_FILE: &str = "padmap.toml";

/// Deserialized settings. Feed into
/// [`MappingsDb::apply_settings`](crate::MappingsDb::apply_settings).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Global config tags, in order.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Extra database files, parsed in order after the default database.
    #[serde(default)]
    pub databases: Vec<PathBuf>,
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Settings> {
        toml::from_str(text).map_err(Error::Settings)
    }

    /// Load `padmap.toml` from the OS config directory, if present.
    pub fn load_default() -> Result<Option<Settings>> {
        let Some(dirs) = directories::ProjectDirs::from("", "", "padmap") else {
            return Ok(None);
        };
        let path = dirs.config_dir().join(SETTINGS_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        Self::from_toml(&text).map(Some)
    }
}
