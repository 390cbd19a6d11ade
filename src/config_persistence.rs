//! Loading and first-run creation of `config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{sanitize_config, Config};

const CONFIG_DIR_NAME: &str = "discover-cover";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default location under the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|path| path.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Reads the config file, writing defaults first when it does not exist yet.
///
/// A file that fails to parse is left untouched and defaults are used for this run.
pub fn load_or_create_config(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        let default_config = Config::default();
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                format!("Failed to create config dir {}: {error}", parent.display())
            })?;
        }
        let serialized = toml::to_string(&default_config)
            .map_err(|error| format!("Failed to serialize default config: {error}"))?;
        fs::write(path, serialized)
            .map_err(|error| format!("Failed to write {}: {error}", path.display()))?;
        return Ok(default_config);
    }

    let content = fs::read_to_string(path)
        .map_err(|error| format!("Failed to read {}: {error}", path.display()))?;
    let parsed = match toml::from_str::<Config>(&content) {
        Ok(config) => config,
        Err(error) => {
            warn!(
                "Config file {} is invalid, using defaults: {}",
                path.display(),
                error
            );
            Config::default()
        }
    };
    Ok(sanitize_config(parsed))
}
