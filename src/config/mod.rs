use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::Paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resolved XDG-compliant paths (not serialized)
    #[serde(skip)]
    pub paths: Paths,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub extract: ExtractConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory tree to watch (tilde is expanded)
    #[serde(default = "default_root")]
    pub root: String,

    /// Quiet time after the last event before a path is indexed
    #[serde(default = "default_debounce")]
    pub debounce: String,

    /// How often pending paths are checked
    #[serde(default = "default_scan_interval")]
    pub scan_interval: String,

    /// Paths containing any of these substrings are never queued
    #[serde(default = "default_ignore_markers")]
    pub ignore_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Target chunk size in tokens (~4 chars per token)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_text_extensions")]
    pub text_extensions: Vec<String>,

    /// Extracted page by page into the documents collection
    #[serde(default = "default_pdf_extensions")]
    pub pdf_extensions: Vec<String>,

    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: "openai" (default), "local" (fastembed), or "none"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Cache directory for local embedding models.
    /// Default: <cache_dir>/models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<OpenAIConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    pub api_key: String,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Chat model used to answer questions
    #[serde(default = "default_query_model")]
    pub model: String,

    /// Number of chunks stuffed into the prompt
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_root() -> String {
    "~/Documents".to_string()
}
fn default_debounce() -> String {
    "5s".to_string()
}
fn default_scan_interval() -> String {
    "2s".to_string()
}
fn default_ignore_markers() -> Vec<String> {
    vec![".DS_Store".to_string()]
}
fn default_chunk_size() -> usize {
    400
}
fn default_chunk_overlap() -> usize {
    80
}
fn default_text_extensions() -> Vec<String> {
    [
        "txt", "md", "markdown", "rst", "org", "csv", "tsv", "json", "yaml", "yml", "toml", "xml",
        "html", "htm", "log", "rs", "py", "js", "ts", "go", "java", "c", "h", "cpp", "sh",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_pdf_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}
fn default_image_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "webp", "bmp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_query_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_top_k() -> usize {
    4
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            debounce: default_debounce(),
            scan_interval: default_scan_interval(),
            ignore_markers: default_ignore_markers(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            text_extensions: default_text_extensions(),
            pdf_extensions: default_pdf_extensions(),
            image_extensions: default_image_extensions(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            cache_dir: None,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            model: default_query_model(),
            top_k: default_top_k(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the resolved config file, creating it from the template on
    /// first run.
    pub fn load() -> Result<Self> {
        let paths = Paths::resolve()?;
        paths.ensure_dirs()?;
        let path = paths.config_file();

        if !path.exists() {
            let config = Config {
                paths,
                ..Config::default()
            };
            config.save_with_template()?;
            return Ok(config);
        }

        Self::load_from(&path, paths)
    }

    /// Load a specific file. Nothing is created if it is missing.
    pub fn load_from(path: &Path, paths: Paths) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.paths = paths;
        config.expand_env_vars();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = self.paths.config_file();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;

        Ok(())
    }

    /// Save config with a helpful template (for first-time setup)
    pub fn save_with_template(&self) -> Result<()> {
        let path = self.paths.config_file();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        eprintln!("Created default config at {}", path.display());

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let paths = Paths::resolve()?;
        Ok(paths.config_file())
    }

    fn expand_env_vars(&mut self) {
        if let Some(ref mut openai) = self.providers.openai {
            openai.api_key = expand_env(&openai.api_key);
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.debounce()?;
        if self.scan_interval()?.is_zero() {
            anyhow::bail!("watch.scan_interval must be greater than zero");
        }
        if self.extract.chunk_size == 0 {
            anyhow::bail!("extract.chunk_size must be greater than zero");
        }
        if self.extract.chunk_overlap >= self.extract.chunk_size {
            anyhow::bail!(
                "extract.chunk_overlap ({}) must be smaller than extract.chunk_size ({})",
                self.extract.chunk_overlap,
                self.extract.chunk_size
            );
        }
        if self.query.top_k == 0 {
            anyhow::bail!("query.top_k must be greater than zero");
        }
        Ok(())
    }

    pub fn debounce(&self) -> Result<Duration> {
        parse_duration(&self.watch.debounce)
            .map_err(|e| anyhow::anyhow!("Invalid watch.debounce: {}", e))
    }

    pub fn scan_interval(&self) -> Result<Duration> {
        parse_duration(&self.watch.scan_interval)
            .map_err(|e| anyhow::anyhow!("Invalid watch.scan_interval: {}", e))
    }

    /// Watch root with `~` expanded.
    pub fn watch_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.watch.root).to_string())
    }

    /// Where fastembed keeps downloaded models.
    pub fn embedding_cache_dir(&self) -> PathBuf {
        match &self.embedding.cache_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => self.paths.embedding_cache_dir(),
        }
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["watch", "root"] => Ok(self.watch.root.clone()),
            ["watch", "debounce"] => Ok(self.watch.debounce.clone()),
            ["watch", "scan_interval"] => Ok(self.watch.scan_interval.clone()),
            ["watch", "ignore_markers"] => Ok(self.watch.ignore_markers.join(",")),
            ["extract", "chunk_size"] => Ok(self.extract.chunk_size.to_string()),
            ["extract", "chunk_overlap"] => Ok(self.extract.chunk_overlap.to_string()),
            ["embedding", "provider"] => Ok(self.embedding.provider.clone()),
            ["embedding", "model"] => Ok(self.embedding.model.clone()),
            ["query", "model"] => Ok(self.query.model.clone()),
            ["query", "top_k"] => Ok(self.query.top_k.to_string()),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["watch", "root"] => self.watch.root = value.to_string(),
            ["watch", "debounce"] => {
                parse_duration(value).map_err(|e| anyhow::anyhow!(e))?;
                self.watch.debounce = value.to_string()
            }
            ["watch", "scan_interval"] => {
                parse_duration(value).map_err(|e| anyhow::anyhow!(e))?;
                self.watch.scan_interval = value.to_string()
            }
            ["watch", "ignore_markers"] => {
                self.watch.ignore_markers = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            }
            ["extract", "chunk_size"] => self.extract.chunk_size = value.parse()?,
            ["extract", "chunk_overlap"] => self.extract.chunk_overlap = value.parse()?,
            ["embedding", "provider"] => match value {
                "openai" | "local" | "none" => self.embedding.provider = value.to_string(),
                other => anyhow::bail!("Unknown embedding provider: {}", other),
            },
            ["embedding", "model"] => self.embedding.model = value.to_string(),
            ["query", "model"] => self.query.model = value.to_string(),
            ["query", "top_k"] => self.query.top_k = value.parse()?,
            ["logging", "level"] => self.logging.level = value.to_string(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        Ok(())
    }
}

/// Parse a duration like "5s", "500ms", "2m", "1h". A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: u64 = num
        .parse()
        .map_err(|_| format!("invalid duration: {}", s))?;

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(3600))),
        other => Err(format!("unknown duration unit '{}' in {}", other, s)),
    }
}

fn expand_env(s: &str) -> String {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else if let Some(var_name) = s.strip_prefix('$') {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else {
        s.to_string()
    }
}

/// Default config template with helpful comments (used for first-time setup)
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# docwatch configuration
# Auto-created on first run. Edit as needed.

[watch]
# Directory tree to watch and index
root = "~/Documents"
# Quiet time after the last change before a file is (re)indexed
debounce = "5s"
# How often pending files are checked
scan_interval = "2s"
# Paths containing any of these are ignored
ignore_markers = [".DS_Store"]

[extract]
# Chunk size and overlap in tokens (~4 characters each)
chunk_size = 400
chunk_overlap = 80
# text_extensions = ["txt", "md", "rs", ...]
# pdf_extensions = ["pdf"]
# image_extensions = ["png", "jpg", "jpeg", "gif", "webp", "bmp"]

[embedding]
# openai | local | none ("none" falls back to keyword search)
provider = "openai"
model = "text-embedding-3-small"
# cache_dir = "~/.cache/docwatch/models"   # for provider = "local"

[providers.openai]
api_key = "${OPENAI_API_KEY}"
# base_url = "https://api.openai.com/v1"

[query]
model = "gpt-4o-mini"
top_k = 4

[logging]
level = "info"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths_in(dir: &Path) -> Paths {
        Paths::under(dir)
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration(" 7 "), Ok(Duration::from_secs(7)));
        assert_eq!(parse_duration("0s"), Ok(Duration::ZERO));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn test_defaults_match_pipeline_timing() -> Result<()> {
        let config = Config::default();
        assert_eq!(config.debounce()?, Duration::from_secs(5));
        assert_eq!(config.scan_interval()?, Duration::from_secs(2));
        assert_eq!(config.watch.ignore_markers, vec![".DS_Store".to_string()]);
        config.validate()?;
        Ok(())
    }

    #[test]
    fn test_template_parses_to_defaults() -> Result<()> {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE)?;
        assert_eq!(config.watch.debounce, "5s");
        assert_eq!(config.extract.chunk_size, 400);
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.query.top_k, 4);
        assert!(config.providers.openai.is_some());
        Ok(())
    }

    #[test]
    fn test_partial_file_fills_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let file = dir.path().join("config.toml");
        fs::write(&file, "[watch]\nroot = \"/srv/docs\"\ndebounce = \"10s\"\n")?;

        let config = Config::load_from(&file, paths_in(dir.path()))?;
        assert_eq!(config.watch_root(), PathBuf::from("/srv/docs"));
        assert_eq!(config.debounce()?, Duration::from_secs(10));
        assert_eq!(config.scan_interval()?, Duration::from_secs(2));
        assert_eq!(config.logging.level, "info");
        Ok(())
    }

    #[test]
    fn test_invalid_settings_are_rejected() -> Result<()> {
        let dir = TempDir::new()?;
        let file = dir.path().join("config.toml");

        fs::write(&file, "[watch]\nscan_interval = \"0s\"\n")?;
        assert!(Config::load_from(&file, paths_in(dir.path())).is_err());

        fs::write(&file, "[extract]\nchunk_size = 10\nchunk_overlap = 10\n")?;
        assert!(Config::load_from(&file, paths_in(dir.path())).is_err());

        fs::write(&file, "[watch]\ndebounce = \"soon\"\n")?;
        assert!(Config::load_from(&file, paths_in(dir.path())).is_err());
        Ok(())
    }

    #[test]
    fn test_get_and_set_values() -> Result<()> {
        let mut config = Config::default();
        config.set_value("watch.debounce", "3s")?;
        config.set_value("query.top_k", "8")?;
        config.set_value("watch.ignore_markers", ".DS_Store, .git/")?;

        assert_eq!(config.get_value("watch.debounce")?, "3s");
        assert_eq!(config.get_value("query.top_k")?, "8");
        assert_eq!(config.get_value("watch.ignore_markers")?, ".DS_Store,.git/");

        assert!(config.set_value("watch.debounce", "later").is_err());
        assert!(config.set_value("embedding.provider", "cohere").is_err());
        assert!(config.get_value("nope.nothing").is_err());
        Ok(())
    }

    #[test]
    fn test_save_round_trips_through_disk() -> Result<()> {
        let dir = TempDir::new()?;
        let mut config = Config {
            paths: paths_in(dir.path()),
            ..Config::default()
        };
        config.set_value("extract.chunk_size", "256")?;
        config.save()?;

        let loaded = Config::load_from(&config.paths.config_file(), paths_in(dir.path()))?;
        assert_eq!(loaded.extract.chunk_size, 256);
        Ok(())
    }

    #[test]
    fn test_expand_env() {
        assert_eq!(expand_env("plain"), "plain");
        assert_eq!(
            expand_env("${DOCWATCH_TEST_SURELY_UNSET}"),
            "${DOCWATCH_TEST_SURELY_UNSET}"
        );
        // PATH is set in any test environment
        assert_ne!(expand_env("$PATH"), "$PATH");
    }
}
