/// Config file loading and creation for the dualk-elo CLI.
///
/// Config lives at ~/.config/dualk-elo/config.toml.
/// All fields are optional; CLI args override config values.
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::bail;

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DualkConfig {
    pub optimization_level: Option<u8>,
    pub initial_k2: Option<f64>,
    pub n_random: Option<usize>,
    pub top_n: Option<usize>,
    pub verbose: Option<u8>,
    pub seed: Option<u64>,
    pub k_base: Option<f64>,
    pub k1_floor: Option<f64>,
    pub initial_rating: Option<f64>,
}

const DEFAULT_CONFIG_TEMPLATE: &str = "\
# dualk-elo configuration
# All values here can be overridden by CLI flags.

# k2 search effort: 0 = keep the seed, 1 = local search, 2 = global search
# optimization_level = 0

# Seed for the global scale k2, in natural-log space (ln 200)
# initial_k2 = 5.298317366548

# Number of random permutations of the interaction order
# n_random = 100

# Individuals included in the triad analysis (5..=20)
# top_n = 10

# Report detail: 0, 1 or 2
# verbose = 0

# Base seed for permutation trials (random when unset)
# seed = 42

# Adaptive term: k1 = max(k_base / (1 + matches_played), k1_floor)
# k_base = 1.0
# k1_floor = 0.0

# Rating every individual starts from
# initial_rating = 1000.0
";

/// Returns the default config path: ~/.config/dualk-elo/config.toml, or
/// `None` when HOME is not set.
pub fn config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config").join("dualk-elo").join("config.toml"))
}

/// Load config from a file path. Returns default (all None) if file doesn't exist.
pub fn load_config(path: &Path) -> DualkConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content)
            .unwrap_or_else(|e| bail(format!("Failed to parse config at {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => DualkConfig::default(),
        Err(e) => bail(format!("Failed to read config at {}: {e}", path.display())),
    }
}

fn parse_config(content: &str) -> Result<DualkConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Create the default config file at `path`. Errors if it already exists.
pub fn create_default_config(path: &Path) {
    if path.exists() {
        bail(format!("Config file already exists at {}", path.display()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| bail(format!("Failed to create directory {}: {e}", parent.display())));
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .unwrap_or_else(|e| bail(format!("Failed to write config to {}: {e}", path.display())));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses_to_defaults() {
        assert_eq!(parse_config(DEFAULT_CONFIG_TEMPLATE).unwrap(), DualkConfig::default());
    }

    #[test]
    fn test_parse_values() {
        let cfg = parse_config("optimization_level = 2\ninitial_k2 = 4.5\ntop_n = 12\nseed = 9\n").unwrap();
        assert_eq!(cfg.optimization_level, Some(2));
        assert_eq!(cfg.initial_k2, Some(4.5));
        assert_eq!(cfg.top_n, Some(12));
        assert_eq!(cfg.seed, Some(9));
        assert_eq!(cfg.n_random, None);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(parse_config("rounds = 3\n").is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(&dir.path().join("nope.toml")), DualkConfig::default());
    }

    #[test]
    fn test_create_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        create_default_config(&path);
        assert!(path.exists());
        assert_eq!(load_config(&path), DualkConfig::default());
    }
}
