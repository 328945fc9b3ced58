use crate::error::{ResolveError, Result};
use serde::Deserialize;
use std::fs;

/// How the opt-out marker is matched inside candidate free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerPolicy {
    /// Marker anywhere in the text, even inside a longer token.
    Substring,
    /// Marker must stand alone as a whole word.
    WholeWord,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub matcher: MatcherConfig,
    pub merge: MergeConfig,
    pub cache: CacheConfig,
    pub optout: OptOutConfig,
    pub resolver: ResolverConfig,
    pub providers: ProvidersConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum score for a candidate to be accepted as the same subject.
    pub accept_threshold: f64,
    pub name_weight: f64,
    pub domain_weight: f64,
    pub photo_weight: f64,
    pub corroboration_weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Fields below this confidence are omitted from the final profile.
    pub min_confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub person_ttl_secs: u64,
    pub company_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptOutConfig {
    pub marker: String,
    pub policy: MarkerPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Overall budget for the provider fan-out, per request.
    pub request_timeout_secs: u64,
    /// Bounded retry attempts per adapter for transient failures.
    pub retry_attempts: u32,
    /// Base delay for capped exponential backoff.
    pub retry_base_ms: u64,
    /// Backoff never exceeds this, regardless of attempt count.
    pub retry_cap_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub profile_search: ProviderConfig,
    pub reverse_image: ProviderConfig,
    pub whois: ProviderConfig,
    pub company: ProviderConfig,
    pub avatar: ProviderConfig,
    /// Local full-name splitter; the quota and credential knobs are unused.
    pub name_split: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub enabled: bool,
    /// Token-bucket refill rate; None means unlimited.
    pub requests_per_min: Option<u64>,
    /// Hard daily call cap; None means unlimited.
    pub requests_per_day: Option<u64>,
    pub api_key: Option<String>,
    /// Search engine id / custom config id, where the provider needs one.
    pub engine_id: Option<String>,
    /// Override the provider endpoint (used by tests and self-hosted mirrors).
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            matcher: MatcherConfig::default(),
            merge: MergeConfig::default(),
            cache: CacheConfig::default(),
            optout: OptOutConfig::default(),
            resolver: ResolverConfig::default(),
            providers: ProvidersConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.6,
            name_weight: 0.4,
            domain_weight: 0.25,
            photo_weight: 0.15,
            corroboration_weight: 0.2,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self { min_confidence: 0.6 }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // persons expire daily, companies change rarely
            person_ttl_secs: 60 * 60 * 24,
            company_ttl_secs: 60 * 60 * 24 * 30,
        }
    }
}

impl Default for OptOutConfig {
    fn default() -> Self {
        Self {
            marker: "#optout".to_string(),
            policy: MarkerPolicy::WholeWord,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 15,
            retry_attempts: 2,
            retry_base_ms: 250,
            retry_cap_ms: 2_000,
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            profile_search: ProviderConfig::default(),
            reverse_image: ProviderConfig::default(),
            whois: ProviderConfig::default(),
            company: ProviderConfig::default(),
            avatar: ProviderConfig::default(),
            name_split: ProviderConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_min: Some(60),
            requests_per_day: None,
            api_key: None,
            engine_id: None,
            base_url: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Config {
    /// Load from `PROSPECTOR_CONFIG` or `config.toml`; a missing file yields
    /// the built-in defaults so the binary runs without any setup.
    pub fn load() -> Result<Self> {
        let path = std::env::var("PROSPECTOR_CONFIG")
            .unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => {
                let config: Config = toml::from_str(&content)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Config::default())
            }
            Err(e) => Err(ResolveError::Config(format!(
                "Failed to read config file '{path}': {e}"
            ))),
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("matcher.accept_threshold", self.matcher.accept_threshold),
            ("merge.min_confidence", self.merge.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ResolveError::Config(format!(
                    "{name} must be within 0.0..=1.0, got {v}"
                )));
            }
        }
        if self.optout.marker.trim().is_empty() {
            return Err(ResolveError::Config(
                "optout.marker must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
