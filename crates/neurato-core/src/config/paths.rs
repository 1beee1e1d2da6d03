//! Standard configuration locations

use std::path::PathBuf;

pub const CONFIG_FILE_NAME: &str = "engine.yaml";

/// `~/.config/neurato` (platform config dir), falling back to the home
/// directory and then the working directory
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("neurato")
}

/// `<config_dir>/engine.yaml`
pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}
