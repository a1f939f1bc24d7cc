use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::{
    CircuitBreakerConfig, Config, MAX_CACHE_TTL_SECS, MAX_DURATION_MS, MAX_RETRIES,
};

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Unknown default provider '{0}': not present in providers")]
    UnknownDefaultProvider(String),

    #[error("Provider name cannot be empty")]
    EmptyProviderName,

    #[error("Invalid {field}: {value}. Must be positive")]
    NotPositive { field: String, value: f64 },

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database URL cannot be empty")]
    EmptyDatabaseUrl,

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid cooldown configuration: cooldown_ms ({0}) must not exceed max_cooldown_ms ({1})")]
    InvalidCooldown(u64, u64),

    #[error("Invalid failure_threshold {0}: must be between 1 and window_size ({1})")]
    InvalidFailureThreshold(u32, u32),

    #[error("Invalid chunk_overlap {0}: must be less than chunk_size ({1})")]
    InvalidChunkOverlap(usize, usize),

    #[error("Invalid {field}: {value} exceeds the maximum of {max}")]
    TooLarge { field: String, value: u64, max: u64 },

    #[error("Invalid {field}: {value}. Must be a non-negative number")]
    Negative { field: String, value: f64 },
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive {
            field: field.to_string(),
            value,
        })
    }
}

fn at_most(field: &str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value <= max {
        Ok(())
    } else {
        Err(ConfigError::TooLarge {
            field: field.to_string(),
            value,
            max,
        })
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Negative {
            field: field.to_string(),
            value,
        })
    }
}

fn validate_breaker(prefix: &str, breaker: &CircuitBreakerConfig) -> Result<(), ConfigError> {
    if breaker.failure_threshold == 0 || breaker.failure_threshold > breaker.window_size {
        return Err(ConfigError::InvalidFailureThreshold(
            breaker.failure_threshold,
            breaker.window_size,
        ));
    }
    positive(&format!("{prefix}.cooldown_ms"), breaker.cooldown_ms as f64)?;
    if breaker.cooldown_ms > breaker.max_cooldown_ms {
        return Err(ConfigError::InvalidCooldown(
            breaker.cooldown_ms,
            breaker.max_cooldown_ms,
        ));
    }
    at_most(
        &format!("{prefix}.max_cooldown_ms"),
        breaker.max_cooldown_ms,
        MAX_DURATION_MS,
    )?;
    positive(
        &format!("{prefix}.half_open_max_calls"),
        f64::from(breaker.half_open_max_calls),
    )?;
    positive(
        &format!("{prefix}.success_threshold"),
        f64::from(breaker.success_threshold),
    )
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. gateway.yaml
    /// 3. gateway.local.yaml (optional developer overrides)
    /// 4. Environment variables (GATEWAY_* prefix, `__` separates nested keys)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("gateway.yaml"))
            .merge(Yaml::file("gateway.local.yaml"))
            .merge(Env::prefixed("GATEWAY_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring env overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("GATEWAY_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let default_provider = config.default_provider.to_lowercase();
        if !config
            .providers
            .keys()
            .any(|name| name.to_lowercase() == default_provider)
        {
            return Err(ConfigError::UnknownDefaultProvider(
                config.default_provider.clone(),
            ));
        }
        for (name, provider) in &config.providers {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyProviderName);
            }
            positive(&format!("providers.{name}.timeout_ms"), provider.timeout_ms as f64)?;
            at_most(
                &format!("providers.{name}.timeout_ms"),
                provider.timeout_ms,
                MAX_DURATION_MS,
            )?;
            if let Some(breaker) = &provider.circuit_breaker {
                validate_breaker(&format!("providers.{name}.circuit_breaker"), breaker)?;
            }
            if provider.dimension == Some(0) {
                return Err(ConfigError::NotPositive {
                    field: format!("providers.{name}.dimension"),
                    value: 0.0,
                });
            }
        }

        let resilience = &config.resilience;
        validate_breaker("circuit_breaker", &resilience.circuit_breaker)?;

        let retry = &resilience.retry;
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                retry.initial_backoff_ms,
                retry.max_backoff_ms,
            ));
        }
        at_most("retry.max_backoff_ms", retry.max_backoff_ms, MAX_DURATION_MS)?;
        at_most(
            "retry.max_retries",
            u64::from(retry.max_retries),
            u64::from(MAX_RETRIES),
        )?;
        positive("retry.multiplier", retry.multiplier)?;

        positive(
            "rate_limit.requests_per_second",
            resilience.rate_limit.requests_per_second,
        )?;
        positive(
            "rate_limit.burst_size",
            f64::from(resilience.rate_limit.burst_size),
        )?;
        positive(
            "bulkhead.max_concurrent_calls",
            resilience.bulkhead.max_concurrent_calls as f64,
        )?;
        positive(
            "resilience.per_call_timeout_ms",
            resilience.per_call_timeout_ms as f64,
        )?;
        at_most(
            "resilience.per_call_timeout_ms",
            resilience.per_call_timeout_ms,
            MAX_DURATION_MS,
        )?;

        positive("cache.max_entries", config.cache.max_entries as f64)?;
        positive("cache.ttl_secs", config.cache.ttl_secs as f64)?;
        at_most("cache.ttl_secs", config.cache.ttl_secs, MAX_CACHE_TTL_SECS)?;

        if config.vector_store.database_url.trim().is_empty() {
            return Err(ConfigError::EmptyDatabaseUrl);
        }
        positive(
            "vector_store.max_connections",
            f64::from(config.vector_store.max_connections),
        )?;
        positive("vector_store.dimension", config.vector_store.dimension as f64)?;

        let pipeline = &config.pipeline;
        positive("pipeline.concurrency", pipeline.concurrency as f64)?;
        positive("pipeline.chunk_size", pipeline.chunk_size as f64)?;
        if pipeline.chunk_overlap >= pipeline.chunk_size {
            return Err(ConfigError::InvalidChunkOverlap(
                pipeline.chunk_overlap,
                pipeline.chunk_size,
            ));
        }
        positive(
            "pipeline.candidate_multiplier",
            pipeline.candidate_multiplier as f64,
        )?;
        positive("ranking.half_life_hours", pipeline.ranking.half_life_hours)?;
        non_negative("ranking.vector_weight", f64::from(pipeline.ranking.vector_weight))?;
        non_negative("ranking.lexical_weight", f64::from(pipeline.ranking.lexical_weight))?;
        non_negative("ranking.recency_weight", f64::from(pipeline.ranking.recency_weight))?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}
