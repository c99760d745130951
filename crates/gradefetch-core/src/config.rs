//! Resolver configuration.
//!
//! Loaded from TOML or JSON (by file extension). Lookup order for
//! [`ResolverConfig::load_default`]:
//!
//! 1. `$GRADEFETCH_CONFIG`
//! 2. `./gradefetch.toml`
//! 3. built-in defaults (no sources, no fallback)
//!
//! Endpoints and credentials are not validated here. A broken source only
//! fails the queries routed to it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{ConfigError, SourceDescriptor, SourceId};

pub const CONFIG_PATH_ENV: &str = "GRADEFETCH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "gradefetch.toml";

const SOURCE_TIMEOUT_ENV: &str = "GRADEFETCH_SOURCE_TIMEOUT_MS";
const ENRICHMENT_TIMEOUT_ENV: &str = "GRADEFETCH_ENRICHMENT_TIMEOUT_MS";
const FALLBACK_URL_ENV: &str = "GRADEFETCH_FALLBACK_URL";
const CURRENT_SOURCE_ENV: &str = "GRADEFETCH_CURRENT_SOURCE";

const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 4_000;
const DEFAULT_ENRICHMENT_TIMEOUT_MS: u64 = 4_000;
const DEFAULT_FALLBACK_TIMEOUT_MS: u64 = 8_000;

/// One configured backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: SourceId,
    pub endpoint: String,
    #[serde(default, skip_serializing)]
    pub credential: Option<String>,
    /// Name of an environment variable holding the credential.
    #[serde(default)]
    pub credential_env: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("credential_env", &self.credential_env)
            .field("active", &self.active)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_fallback_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: DEFAULT_FALLBACK_TIMEOUT_MS,
            enabled: true,
        }
    }
}

impl FallbackConfig {
    /// Base URL when the fallback is both enabled and configured.
    pub fn effective_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| self.enabled && !url.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub search_order: Option<Vec<SourceId>>,
    #[serde(default)]
    pub current_source: Option<SourceId>,
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,
    #[serde(default = "default_enrichment_timeout_ms")]
    pub enrichment_timeout_ms: u64,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            search_order: None,
            current_source: None,
            source_timeout_ms: DEFAULT_SOURCE_TIMEOUT_MS,
            enrichment_timeout_ms: DEFAULT_ENRICHMENT_TIMEOUT_MS,
            fallback: FallbackConfig::default(),
        }
    }
}

impl ResolverConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`; `.json` files are parsed as JSON, anything else as TOML.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if extension == "json" {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Loads from the default locations and applies environment overrides.
    pub fn load_default() -> Result<Self, ConfigError> {
        let mut config = match default_path() {
            Some(path) => Self::from_path(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies `GRADEFETCH_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(SOURCE_TIMEOUT_ENV) {
            self.source_timeout_ms = parse_millis(SOURCE_TIMEOUT_ENV, &value)?;
        }
        if let Some(value) = lookup(ENRICHMENT_TIMEOUT_ENV) {
            self.enrichment_timeout_ms = parse_millis(ENRICHMENT_TIMEOUT_ENV, &value)?;
        }
        if let Some(value) = lookup(FALLBACK_URL_ENV) {
            let value = value.trim();
            self.fallback.base_url = (!value.is_empty()).then(|| value.to_owned());
        }
        if let Some(value) = lookup(CURRENT_SOURCE_ENV) {
            self.current_source = Some(SourceId::parse(&value)?);
        }
        self.validate()
    }

    /// Builds descriptors, resolving `credential_env` through the process
    /// environment.
    pub fn descriptors(&self) -> Vec<SourceDescriptor> {
        self.descriptors_with(|name| std::env::var(name).ok())
    }

    pub fn descriptors_with<F>(&self, lookup: F) -> Vec<SourceDescriptor>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.sources
            .iter()
            .map(|source| {
                let credential = match (&source.credential, &source.credential_env) {
                    (Some(credential), _) => credential.clone(),
                    (None, Some(variable)) => lookup(variable).unwrap_or_else(|| {
                        warn!(source = %source.id, variable = %variable, "credential variable is not set");
                        String::new()
                    }),
                    (None, None) => String::new(),
                };

                let mut descriptor = SourceDescriptor::new(source.id.clone(), source.endpoint.clone())
                    .with_credential(credential)
                    .with_description(source.description.clone())
                    .with_active(source.active);
                if let Some(timeout_ms) = source.timeout_ms {
                    descriptor = descriptor.with_timeout(Duration::from_millis(timeout_ms));
                }
                descriptor
            })
            .collect()
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_millis(self.enrichment_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.source_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "source_timeout_ms",
                message: String::from("must be greater than zero"),
            });
        }
        if self.enrichment_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "enrichment_timeout_ms",
                message: String::from("must be greater than zero"),
            });
        }
        if self.fallback.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fallback.timeout_ms",
                message: String::from("must be greater than zero"),
            });
        }
        if self.sources.iter().any(|source| source.timeout_ms == Some(0)) {
            return Err(ConfigError::InvalidValue {
                field: "sources.timeout_ms",
                message: String::from("must be greater than zero"),
            });
        }
        Ok(())
    }
}

fn default_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    local.exists().then_some(local)
}

fn parse_millis(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidValue {
            field,
            message: format!("expected a positive number of milliseconds, got '{value}'"),
        }),
        Ok(millis) => Ok(millis),
    }
}

const fn enabled() -> bool {
    true
}

const fn default_source_timeout_ms() -> u64 {
    DEFAULT_SOURCE_TIMEOUT_MS
}

const fn default_enrichment_timeout_ms() -> u64 {
    DEFAULT_ENRICHMENT_TIMEOUT_MS
}

const fn default_fallback_timeout_ms() -> u64 {
    DEFAULT_FALLBACK_TIMEOUT_MS
}
