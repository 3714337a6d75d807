//! Configuration management for tis-emu.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (TIS_EMU_PUZZLE_DIR, TIS_EMU_MAX_CYCLES)
//! 2. Project-local config file (`./tis-emu.toml`)
//! 3. User config file (`~/.config/tis-emu/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # tis-emu.toml
//!
//! # Directory searched for puzzle definitions
//! puzzle_dir = "puzzles"
//!
//! # Cycle cap for CLI runs
//! max_cycles = 2000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// tis-emu configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Directory searched for puzzle definition files.
    pub puzzle_dir: Option<String>,

    /// Maximum number of ticks a CLI run executes.
    pub max_cycles: Option<u64>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `tis-emu.toml`
    /// 3. User config `~/.config/tis-emu/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load user config first (lowest priority of file configs)
        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        // Load project-local config (higher priority)
        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        // Environment variables override everything
        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Get the puzzle directory, with fallback to default.
    pub fn puzzle_dir(&self) -> String {
        self.puzzle_dir
            .clone()
            .unwrap_or_else(|| "puzzles".to_string())
    }

    /// Get the cycle cap, with fallback to default.
    pub fn max_cycles(&self) -> u64 {
        self.max_cycles.unwrap_or(100_000)
    }

    /// Load user configuration from ~/.config/tis-emu/config.toml
    fn load_user_config() -> Option<Self> {
        let config_dir = dirs::config_dir()?;
        let config_path = config_dir.join("tis-emu").join("config.toml");
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./tis-emu.toml
    fn load_local_config() -> Option<Self> {
        let local_path = Path::new("tis-emu.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("tis-emu.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.puzzle_dir.is_some() {
            self.puzzle_dir = other.puzzle_dir;
        }
        if other.max_cycles.is_some() {
            self.max_cycles = other.max_cycles;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("TIS_EMU_PUZZLE_DIR") {
            log::info!("Using TIS_EMU_PUZZLE_DIR from environment: {}", dir);
            self.puzzle_dir = Some(dir);
        }
        if let Ok(cycles) = std::env::var("TIS_EMU_MAX_CYCLES") {
            match cycles.parse() {
                Ok(cycles) => self.max_cycles = Some(cycles),
                Err(_) => log::warn!("Ignoring non-numeric TIS_EMU_MAX_CYCLES: {}", cycles),
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tis-emu").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# tis-emu configuration
# Place this file at ~/.config/tis-emu/config.toml or ./tis-emu.toml

# Directory searched for puzzle definitions
puzzle_dir = "puzzles"

# Cycle cap for CLI runs
# max_cycles = 2000
"#
        .to_string()
    }
}
