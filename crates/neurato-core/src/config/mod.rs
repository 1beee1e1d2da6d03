//! Engine configuration
//!
//! YAML files read and written with serde. Missing or broken files fall back
//! to defaults so the engine always starts.
//!
//! ```ignore
//! use neurato_core::config::{default_config_path, load_config, save_config, EngineConfig};
//!
//! let path = default_config_path();
//! let config: EngineConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod engine;
mod io;
mod paths;

pub use engine::{EngineConfig, MetronomeConfig, DEFAULT_TELEMETRY_INTERVAL};
pub use io::{load_config, save_config};
pub use paths::{config_dir, default_config_path, CONFIG_FILE_NAME};
