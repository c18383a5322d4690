//! Settings file location and loading.

use anyhow::{Context as _, Result};
use arrowhead::settings::{Settings, StoreSettings};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Default settings file path.
pub fn default_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("eu", "arrowhead", "ahctl")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(dirs.config_dir().join("config.toml"))
}

/// Settings file in effect: the explicit path if given, else the default.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => expand(path),
        None => default_path(),
    }
}

/// Load settings and expand `~` and `$VAR` in store paths.
pub fn load(path: &Path) -> Result<Settings> {
    let mut settings = Settings::load(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    expand_store(&mut settings.tls.key_store)?;
    expand_store(&mut settings.tls.trust_store)?;

    Ok(settings)
}

fn expand_store(store: &mut StoreSettings) -> Result<()> {
    let Some(file) = store.file.as_deref() else {
        return Ok(());
    };
    let expanded = expand(file)?;
    store.map_file(|_| expanded);
    Ok(())
}

fn expand(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand path {raw}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_store_paths_are_expanded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[tls.trust_store]\nfile = \"~/cloud.pem\"\n",
        )
        .unwrap();

        let settings = load(&path).unwrap();
        let file = settings.tls.trust_store.file.unwrap();
        assert!(!file.to_string_lossy().starts_with('~'));
        assert!(file.ends_with("cloud.pem"));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = resolve_path(Some(Path::new("/etc/ahctl.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/etc/ahctl.toml"));
    }
}
