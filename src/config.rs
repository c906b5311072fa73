use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "MASK_PANDA_CONFIG";
/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "mask-panda.json";

// ---------------------------------------------------------------------------
// Editor configuration
// ---------------------------------------------------------------------------

/// User-tunable settings. Every field is optional in the JSON file:
///
/// ```json
/// { "output_suffix": "_edited", "compress_output": true, "window_size": [1200, 800] }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Appended to the input file stem to name the saved copy.
    pub output_suffix: String,
    /// Store saved variables zlib-compressed.
    pub compress_output: bool,
    pub window_size: [f32; 2],
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            output_suffix: "_edited".to_string(),
            compress_output: true,
            window_size: [1200.0, 800.0],
        }
    }
}

impl EditorConfig {
    /// Load from `$MASK_PANDA_CONFIG`, else `./mask-panda.json`, else defaults.
    pub fn load() -> Self {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    /// A missing file gives the defaults; a broken one is logged and ignored.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let loaded = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))
            .and_then(|text| Self::from_json(&text));
        match loaded {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring config {}: {e:#}", path.display());
                Self::default()
            }
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: EditorConfig = serde_json::from_str(text).context("parsing config JSON")?;
        if config.output_suffix.is_empty() {
            bail!("output_suffix must not be empty (the input file is never overwritten)");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EditorConfig::from_json(r#"{ "compress_output": false }"#).unwrap();
        assert!(!config.compress_output);
        assert_eq!(config.output_suffix, "_edited");
        assert_eq!(config.window_size, [1200.0, 800.0]);
    }

    #[test]
    fn test_rejects_empty_suffix() {
        assert!(EditorConfig::from_json(r#"{ "output_suffix": "" }"#).is_err());
    }

    #[test]
    fn test_load_from_missing_or_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask-panda.json");
        assert_eq!(EditorConfig::load_from(&path), EditorConfig::default());

        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(EditorConfig::load_from(&path), EditorConfig::default());

        std::fs::write(&path, r#"{ "output_suffix": "_clean" }"#).unwrap();
        assert_eq!(EditorConfig::load_from(&path).output_suffix, "_clean");
    }
}
