//! Parser and CLI settings, read from TOML.
//!
//! Lookup order: the `$MAILHDR_CONFIG` path, then `mailhdr/config.toml`
//! under the platform config directory, then built-in defaults.
//!
//! The parser itself only ever sees [`Options`], the read-only subset of the
//! configuration that influences decoding.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging.
    pub general: GeneralConfig,
    /// Text decoding settings.
    pub decoder: DecoderConfig,
    /// Header parsing fallbacks and overrides.
    pub parsing: ParsingConfig,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Where `mailhdr.log` is written; defaults to the platform cache dir.
    pub cache_dir: Option<PathBuf>,
}

/// Which MIME header decoder is used for subjects and other free text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKind {
    /// `mail-parser`'s header decoder, with the generic decoder as backup.
    #[default]
    Native,
    /// The built-in RFC 2047 decoder only.
    Generic,
}

/// Text decoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Decoder used for message headers.
    pub message: DecoderKind,
    /// Encoding assumed when a charset name is unknown or cannot be detected.
    pub fallback_encoding: String,
    /// Use `mail-parser` as the structured address and header parser.
    pub native_parsers: bool,
}

/// Header parsing fallbacks and overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    /// Regex used to find a multipart boundary in the raw header text.
    /// The first capture group is the boundary.
    pub boundary_regex: Option<String>,
    /// Date used when the `Date:` header cannot be parsed.
    /// When unset, the current time is used and a warning is logged.
    pub fallback_date: Option<String>,
}

/// Read-only parser settings derived from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub decoder: DecoderKind,
    pub fallback_encoding: String,
    pub native_parsers: bool,
    pub boundary_regex: Option<String>,
    pub fallback_date: Option<String>,
}

// ── Defaults ────────────────────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            message: DecoderKind::Native,
            fallback_encoding: "UTF-8".to_string(),
            native_parsers: false,
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Config::default().options()
    }
}

impl Config {
    /// Extract the parser settings.
    pub fn options(&self) -> Options {
        Options {
            decoder: self.decoder.message,
            fallback_encoding: self.decoder.fallback_encoding.clone(),
            native_parsers: self.decoder.native_parsers,
            boundary_regex: self.parsing.boundary_regex.clone(),
            fallback_date: self.parsing.fallback_date.clone(),
        }
    }
}

// ── Files ───────────────────────────────────────────────────────

/// Load the configuration file if there is one.
///
/// Never fails: a missing or unreadable file yields [`Config::default`].
pub fn load_config() -> Config {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Config::default(),
    }
}

/// Load configuration from an explicit path, falling back to defaults.
pub fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::debug!(path = %path.display(), "Config file loaded");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Invalid config file, falling back to defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Config file unreadable, falling back to defaults"
            );
            Config::default()
        }
    }
}

/// Write `config` to [`config_file_path`], creating parent directories.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("No config directory on this platform"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Wrote config file");
    Ok(())
}

/// `$MAILHDR_CONFIG`, else `<config dir>/mailhdr/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILHDR_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailhdr").join("config.toml"))
}

/// Directory for the log file.
pub fn cache_dir(config: &Config) -> PathBuf {
    match &config.general.cache_dir {
        Some(dir) => dir.clone(),
        None => dirs::cache_dir()
            .map(|d| d.join("mailhdr"))
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.decoder.message, DecoderKind::Native);
        assert_eq!(cfg.decoder.fallback_encoding, "UTF-8");
        assert!(!cfg.decoder.native_parsers);
        assert!(cfg.parsing.boundary_regex.is_none());
        assert!(cfg.parsing.fallback_date.is_none());
    }

    #[test]
    fn test_toml_keeps_fallback_date() {
        let mut cfg = Config::default();
        cfg.parsing.fallback_date = Some("2000-01-01 00:00:00".to_string());
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.decoder.message, cfg.decoder.message);
        assert_eq!(parsed.parsing.fallback_date, cfg.parsing.fallback_date);
    }

    #[test]
    fn test_missing_sections_default() {
        let partial = r#"
[decoder]
message = "generic"

[parsing]
boundary_regex = "boundary=(\\S+)"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.decoder.message, DecoderKind::Generic);
        assert_eq!(cfg.parsing.boundary_regex.as_deref(), Some("boundary=(\\S+)"));
        assert_eq!(cfg.decoder.fallback_encoding, "UTF-8");
        assert_eq!(cfg.general.log_level, "warn");
    }

    #[test]
    fn test_options_follow_config() {
        let mut cfg = Config::default();
        cfg.decoder.native_parsers = true;
        cfg.decoder.fallback_encoding = "ISO-8859-1".to_string();
        let opts = cfg.options();
        assert!(opts.native_parsers);
        assert_eq!(opts.fallback_encoding, "ISO-8859-1");
        assert_eq!(Options::default().decoder, DecoderKind::Native);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[parsing]\nfallback_date = \"2001-02-03\"\n").expect("write");
        let cfg = load_config_from(&path);
        assert_eq!(cfg.parsing.fallback_date.as_deref(), Some("2001-02-03"));
    }

    #[test]
    fn test_load_invalid_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[decoder\nmessage = ").expect("write");
        let cfg = load_config_from(&path);
        assert_eq!(cfg.decoder.message, DecoderKind::Native);
    }
}
