use anyhow::Context;
use ante_core::config::{Config, WarnLevel};
use ante_core::store::Store;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = "ante.yaml";

/// Resolve the configuration file.
///
/// Priority:
/// 1. `--config` flag / `ANTE_CONFIG` env var (passed in as `explicit`)
/// 2. `ante.yaml` in the working directory
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

/// Load and validate. Warnings are logged; errors abort.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    let config = Config::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;

    let mut errors = Vec::new();
    for w in config.validate() {
        match w.level {
            WarnLevel::Warning => tracing::warn!("config: {}", w.message),
            WarnLevel::Error => errors.push(w.message),
        }
    }
    if !errors.is_empty() {
        anyhow::bail!("invalid config {}:\n  {}", path.display(), errors.join("\n  "));
    }
    Ok(config)
}

pub fn open_store(config: &Config) -> anyhow::Result<Store> {
    Store::open(&config.db_path)
        .with_context(|| format!("failed to open store at {}", config.db_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_path_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.yaml");
        assert_eq!(resolve_path(Some(&path)), path);
        assert_eq!(resolve_path(None), PathBuf::from("ante.yaml"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load(&dir.path().join("ante.yaml")).unwrap();
        assert_eq!(config.server.port, 7777);
    }

    #[test]
    fn invalid_values_abort() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ante.yaml");
        std::fs::write(&path, "default_provider: mistral\n").unwrap();
        let err = load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("mistral"));
    }
}
