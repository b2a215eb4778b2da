//! Configuration management

use std::{collections::HashMap, collections::HashSet, env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    /// Variables are set into the process environment for `${VAR}` resolution.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Global routing policy
    pub routing: RoutingConfig,
    /// Providers, in declaration order (priority decides the attempt order)
    pub providers: Vec<ProviderConfig>,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // PROVIDER_ROUTER_ROUTING__MAX_RETRIES=5 -> routing.max_retries
        figment = figment.merge(Env::prefixed("PROVIDER_ROUTER_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars()?;
        config.validate()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                match dirs::home_dir() {
                    Some(home) => path_str.replacen('~', &home.display().to_string(), 1),
                    None => path_str.clone(),
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if !path.exists() {
                tracing::debug!("Env file not found (skipped): {expanded}");
                continue;
            }
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
            }
        }
    }

    /// Expand `${VAR}` and `${VAR:-default}` in provider endpoints, tokens and headers
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        for provider in &mut self.providers {
            provider.endpoint = expand_string(&re, &provider.endpoint);
            if let Some(token) = provider.auth_token.as_mut() {
                *token = expand_string(&re, token);
            }
            for value in provider.headers.values_mut() {
                *value = expand_string(&re, value);
            }
        }
        Ok(())
    }

    /// Check the configuration for mistakes that would make routing meaningless
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.routing.max_retries == 0 {
            return Err(Error::Config("routing.max_retries must be at least 1".into()));
        }
        if self.routing.failure_threshold == 0 {
            return Err(Error::Config(
                "routing.failure_threshold must be at least 1".into(),
            ));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(Error::Config("provider name must not be empty".into()));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate provider name: {}",
                    provider.name
                )));
            }
            let url = Url::parse(&provider.endpoint).map_err(|e| {
                Error::Config(format!(
                    "provider {}: invalid endpoint {:?}: {e}",
                    provider.name, provider.endpoint
                ))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::Config(format!(
                    "provider {}: endpoint must be http(s), got {}",
                    provider.name,
                    url.scheme()
                )));
            }
        }
        Ok(())
    }

    /// Enabled providers in attempt order.
    ///
    /// Lower `priority` goes first; ties keep declaration order.
    pub fn providers_by_priority(&self) -> Vec<&ProviderConfig> {
        let mut providers: Vec<&ProviderConfig> =
            self.providers.iter().filter(|p| p.enabled).collect();
        providers.sort_by_key(|p| p.priority);
        providers
    }
}

/// Expand environment variables in a string
fn expand_string(re: &Regex, value: &str) -> String {
    re.replace_all(value, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map_or("", |m| m.as_str());
        env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .into_owned()
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Whole-request timeout for inbound HTTP calls
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 39500,
            // Must cover max_retries * timeout across several providers
            request_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
        }
    }
}

/// Global routing policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Per-attempt transport timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Transport calls per provider before falling back
    pub max_retries: u32,
    /// Backoff unit; attempt `n` waits `base_delay * n`
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Consecutive failures before a provider is marked unhealthy
    pub failure_threshold: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(45),
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            failure_threshold: 5,
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Unique provider name
    pub name: String,
    /// Attempt rank; lower goes first
    pub priority: u32,
    /// Endpoint URL receiving `POST {message, ...options}`
    pub endpoint: String,
    /// Auth token. Supports a literal value or `env:VAR_NAME`
    pub auth_token: Option<String>,
    /// Header carrying the token. `Authorization` gets a `Bearer ` prefix
    pub auth_header: String,
    /// Extra headers sent with every request
    pub headers: HashMap<String, String>,
    /// How long the circuit stays open after a blocking signal
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
    /// Whether the provider takes part in routing
    pub enabled: bool,
    /// JSON pointer to the reply text (e.g. `/data/answer`)
    pub response_path: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            priority: 100,
            endpoint: String::new(),
            auth_token: None,
            auth_header: "Authorization".to_string(),
            headers: HashMap::new(),
            cooldown: Duration::from_secs(60),
            enabled: true,
            response_path: None,
        }
    }
}

impl ProviderConfig {
    /// Resolve the auth token (expand `env:` references)
    #[must_use]
    pub fn resolve_auth_token(&self) -> Option<String> {
        let token = self.auth_token.as_ref()?;
        let resolved = match token.strip_prefix("env:") {
            Some(var_name) => env::var(var_name).ok()?,
            None => token.clone(),
        };
        (!resolved.is_empty()).then_some(resolved)
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to a human-readable string (`"250ms"` or `"30s"`)
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    /// Parse `"100ms"`, `"30s"`, `"5m"` or a bare number of seconds
    pub fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let number = |n: &str| {
            n.trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid duration {s:?}: {e}"))
        };
        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            number(ms).map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            number(secs).map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            number(mins)?
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("duration {s:?} is out of range"))
        } else {
            number(s).map(Duration::from_secs)
        }
    }
}
