//! XDG Base Directory Specification compliant path resolution.
//!
//! Every directory is resolved through a three-level fallback:
//! 1. docwatch-specific env var (DOCWATCH_CONFIG_DIR, etc.)
//! 2. XDG env var (XDG_CONFIG_HOME, etc.) via `etcetera`
//! 3. Platform default (~/.config, etc.)
//!
//! All paths are absolute. Relative paths from env vars are ignored per XDG spec.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Resolved directory paths for the entire application.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Config directory: config.toml lives here
    pub config_dir: PathBuf,

    /// Data directory: the index database
    pub data_dir: PathBuf,

    /// Cache directory: downloaded embedding models
    pub cache_dir: PathBuf,
}

impl Paths {
    /// Resolve all paths using real environment variables.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with_env(|key| std::env::var(key))
    }

    /// Resolve paths with a custom env var lookup (for testing).
    pub fn resolve_with_env<F>(env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        use etcetera::BaseStrategy;

        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;

        let config_dir = env_or(&env_fn, "DOCWATCH_CONFIG_DIR", || {
            strategy.config_dir().join("docwatch")
        });
        let data_dir = env_or(&env_fn, "DOCWATCH_DATA_DIR", || {
            strategy.data_dir().join("docwatch")
        });
        let cache_dir = env_or(&env_fn, "DOCWATCH_CACHE_DIR", || {
            strategy.cache_dir().join("docwatch")
        });

        Ok(Self {
            config_dir,
            data_dir,
            cache_dir,
        })
    }

    /// All directories under a single root, e.g. a temp dir.
    pub fn under(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            cache_dir: root.join("cache"),
        }
    }

    /// Config file: config_dir/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Index database shared by both collections: data_dir/index.sqlite
    pub fn index_db(&self) -> PathBuf {
        self.data_dir.join("index.sqlite")
    }

    /// Local embedding models: cache_dir/models
    pub fn embedding_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("models")
    }

    /// Create all directories with appropriate permissions.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.cache_dir] {
            create_dir_with_mode(dir)?;
        }
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::resolve().unwrap_or_else(|_| {
            let home = etcetera::home_dir().unwrap_or_else(|_| PathBuf::from("."));
            Self {
                config_dir: home.join(".config").join("docwatch"),
                data_dir: home.join(".local").join("share").join("docwatch"),
                cache_dir: home.join(".cache").join("docwatch"),
            }
        })
    }
}

/// Resolve an env var with fallback. Ignores empty and relative paths per XDG spec.
fn env_or<F>(env_fn: &F, var: &str, default: impl FnOnce() -> PathBuf) -> PathBuf
where
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
{
    env_fn(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .unwrap_or_else(default)
}

/// Create a directory with mode 0700 per XDG spec.
fn create_dir_with_mode(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Helper: build an env_fn from a HashMap
    fn make_env(
        map: HashMap<&str, &str>,
    ) -> impl Fn(&str) -> std::result::Result<String, std::env::VarError> {
        move |key: &str| {
            map.get(key)
                .map(|v| v.to_string())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    #[test]
    fn default_paths_are_xdg_compliant() {
        let paths = Paths::resolve_with_env(make_env(HashMap::new())).unwrap();

        assert!(paths.config_dir.ends_with("docwatch"), "{:?}", paths.config_dir);
        assert!(paths.data_dir.ends_with("docwatch"), "{:?}", paths.data_dir);
        assert!(paths.cache_dir.ends_with("docwatch"), "{:?}", paths.cache_dir);
        assert!(paths.config_dir.is_absolute());
    }

    #[test]
    fn docwatch_env_vars_override_xdg() {
        let mut env: HashMap<&str, &str> = HashMap::new();
        env.insert("DOCWATCH_CONFIG_DIR", "/custom/config");
        env.insert("DOCWATCH_DATA_DIR", "/custom/data");
        env.insert("DOCWATCH_CACHE_DIR", "/custom/cache");

        let paths = Paths::resolve_with_env(make_env(env)).unwrap();
        assert_eq!(paths.config_dir, PathBuf::from("/custom/config"));
        assert_eq!(paths.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(paths.cache_dir, PathBuf::from("/custom/cache"));
    }

    #[test]
    fn relative_and_empty_overrides_are_ignored() {
        let mut env: HashMap<&str, &str> = HashMap::new();
        env.insert("DOCWATCH_CONFIG_DIR", "relative/path");
        env.insert("DOCWATCH_DATA_DIR", "");

        let paths = Paths::resolve_with_env(make_env(env)).unwrap();
        assert!(paths.config_dir.is_absolute());
        assert!(paths.data_dir.is_absolute());
        assert!(paths.data_dir.ends_with("docwatch"));
    }

    #[test]
    fn convenience_accessors() {
        let paths = Paths::under(Path::new("/tmp/dw"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/dw/config/config.toml"));
        assert_eq!(paths.index_db(), PathBuf::from("/tmp/dw/data/index.sqlite"));
        assert_eq!(
            paths.embedding_cache_dir(),
            PathBuf::from("/tmp/dw/cache/models")
        );
    }

    #[test]
    fn ensure_dirs_creates_everything() -> Result<()> {
        let tmp = tempfile::TempDir::new()?;
        let paths = Paths::under(tmp.path());
        paths.ensure_dirs()?;
        assert!(paths.config_dir.is_dir());
        assert!(paths.data_dir.is_dir());
        assert!(paths.cache_dir.is_dir());
        Ok(())
    }
}
