//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$SPAMSIFT_CONFIG` (environment variable)
//! 2. `~/.config/spamsift/config.toml` (Linux/macOS)
//!    `%APPDATA%\spamsift\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags override file values; the merged result is a
//! [`PipelineConfig`] handed to the pipeline entry points.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub general: GeneralConfig,
    /// Corpus discovery.
    pub input: InputConfig,
    /// Corpus snapshot destinations.
    pub output: OutputConfig,
    /// Worker pool and size limits.
    pub performance: PerformanceConfig,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override the directory for the log file.
    pub log_dir: Option<PathBuf>,
}

/// Corpus discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Default corpus root, used when none is given on the command line.
    pub dir: Option<PathBuf>,
    /// File extensions treated as messages (case-insensitive, without dot).
    pub extensions: Vec<String>,
}

/// Corpus snapshot destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Raw corpus JSON path.
    pub raw_corpus: PathBuf,
    /// Normalized corpus JSON path.
    pub normalized_corpus: PathBuf,
    /// Pretty-print JSON output.
    pub pretty: bool,
    /// Optional CSV export of the normalized corpus.
    pub csv: Option<PathBuf>,
}

/// Performance tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Worker threads for decoding and normalization (0 = one per CPU).
    pub workers: usize,
    /// Files larger than this many bytes are recorded as failures unread
    /// (default: 67108864 = 64 MB).
    pub max_message_size: u64,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_dir: None,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            extensions: vec!["eml".to_string()],
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            raw_corpus: PathBuf::from("parser_output.json"),
            normalized_corpus: PathBuf::from("cleaned_emails.json"),
            pretty: true,
            csv: None,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_message_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

/// Everything one pipeline run needs, after CLI overrides.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Corpus root, walked recursively.
    pub input_dir: PathBuf,
    /// Message extensions, lowercase, without dot.
    pub extensions: Vec<String>,
    pub raw_output: PathBuf,
    pub normalized_output: PathBuf,
    pub csv_output: Option<PathBuf>,
    pub pretty: bool,
    /// Worker threads (0 = one per CPU).
    pub workers: usize,
    pub max_message_size: u64,
}

impl PipelineConfig {
    /// Build a pipeline configuration for `input_dir` from file defaults.
    pub fn from_config(config: &Config, input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            extensions: config
                .input
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            raw_output: config.output.raw_corpus.clone(),
            normalized_output: config.output.normalized_corpus.clone(),
            csv_output: config.output.csv.clone(),
            pretty: config.output.pretty,
            workers: config.performance.workers,
            max_message_size: config.performance.max_message_size,
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Config::default(),
    }
}

/// Load configuration from an explicit file.
///
/// Falls back to defaults, with a warning, if the file cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("SPAMSIFT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("spamsift").join("config.toml"))
}

/// Return the directory the log file is written to.
pub fn log_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.log_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("spamsift")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.input.extensions, vec!["eml"]);
        assert_eq!(cfg.output.raw_corpus, PathBuf::from("parser_output.json"));
        assert_eq!(
            cfg.output.normalized_corpus,
            PathBuf::from("cleaned_emails.json")
        );
        assert_eq!(cfg.performance.workers, 0);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[input]
extensions = ["EML", ".msg"]

[performance]
workers = 4
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.performance.workers, 4);
        assert_eq!(cfg.performance.max_message_size, 64 * 1024 * 1024);
        assert!(cfg.output.pretty);

        let pipeline = PipelineConfig::from_config(&cfg, "/corpus");
        assert_eq!(pipeline.extensions, vec!["eml", "msg"]);
        assert_eq!(pipeline.input_dir, PathBuf::from("/corpus"));
        assert_eq!(pipeline.workers, 4);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.output.raw_corpus, cfg.output.raw_corpus);
        assert_eq!(parsed.input.extensions, cfg.input.extensions);
    }

    #[test]
    fn test_load_config_from_file_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[output]\npretty = false\n").unwrap();
        assert!(!load_config_from(&path).output.pretty);

        std::fs::write(&path, "not = [valid").unwrap();
        assert!(load_config_from(&path).output.pretty);
        assert!(load_config_from(&dir.path().join("missing.toml")).output.pretty);
    }
}
