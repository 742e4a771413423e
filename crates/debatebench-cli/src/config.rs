//! Runtime config lookup.
//!
//! Lookup order:
//! 1. `--config <path>`
//! 2. `$DEBATEBENCH_CONFIG`
//! 3. `./debatebench.yaml`
//! 4. Built-in defaults

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use debatebench_runtime::RuntimeConfig;

pub const CONFIG_ENV: &str = "DEBATEBENCH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "debatebench.yaml";

/// Load the runtime config. Returns defaults if no config file is found.
pub fn load_config(flag: Option<&Path>) -> Result<RuntimeConfig> {
    let env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    match resolve_path(flag, env, Path::new(DEFAULT_CONFIG_FILE)) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading config");
            RuntimeConfig::from_file(&path).with_context(|| format!("loading {}", path.display()))
        }
        None => Ok(RuntimeConfig::default()),
    }
}

/// Pick the config file to read. An explicit path wins even if it is missing,
/// so a typo surfaces as an error instead of silently using defaults.
fn resolve_path(flag: Option<&Path>, env: Option<PathBuf>, default: &Path) -> Option<PathBuf> {
    if let Some(path) = flag {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env {
        return Some(path);
    }
    default.exists().then(|| default.to_path_buf())
}

/// Describe which config is active (for `--help`-style output).
pub fn describe_source(flag: Option<&Path>) -> String {
    let env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    match resolve_path(flag, env, Path::new(DEFAULT_CONFIG_FILE)) {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found)", p.display()),
        None => "built-in defaults".into(),
    }
}
