use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::vector::SimilarityMetric;

/// Upper bound for every millisecond duration setting (one day).
pub const MAX_DURATION_MS: u64 = 24 * 60 * 60 * 1000;

/// Upper bound for cache entry lifetimes (one year).
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Upper bound for `retry.max_retries`.
pub const MAX_RETRIES: u32 = 100;

/// Main configuration structure for the retrieval gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Provider used when a request does not name one
    #[serde(default = "default_provider_name")]
    pub default_provider: String,

    /// Model providers by name
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Resilience policies applied to every provider
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Embedding cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Vector store configuration
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Retrieval pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_provider_name() -> String {
    "openai".to_string()
}

fn default_providers() -> BTreeMap<String, ProviderConfig> {
    let mut providers = BTreeMap::new();
    providers.insert(
        default_provider_name(),
        ProviderConfig::new(ProviderKind::Openai),
    );
    providers
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: default_provider_name(),
            providers: default_providers(),
            resilience: ResilienceConfig::default(),
            cache: CacheConfig::default(),
            vector_store: VectorStoreConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Provider backend family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible REST API
    Openai,
    /// Self-hosted Ollama-compatible API
    Ollama,
    /// Google Gemini API
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Ollama => "ollama",
            Self::Gemini => "gemini",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Openai => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    pub fn default_embedding_model(&self) -> &'static str {
        match self {
            Self::Openai => "text-embedding-3-small",
            Self::Ollama => "nomic-embed-text",
            Self::Gemini => "text-embedding-004",
        }
    }

    pub fn default_chat_model(&self) -> &'static str {
        match self {
            Self::Openai => "gpt-3.5-turbo",
            Self::Ollama => "llama3",
            Self::Gemini => "gemini-1.5-flash",
        }
    }

    /// Environment variable consulted when no API key is configured.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Openai => Some("OPENAI_API_KEY"),
            Self::Ollama => None,
            Self::Gemini => Some("GEMINI_API_KEY"),
        }
    }

    pub fn requires_api_key(&self) -> bool {
        self.api_key_env().is_some()
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured model provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProviderConfig {
    /// Backend family
    pub kind: ProviderKind,

    /// API base URL; the kind's public endpoint when unset
    #[serde(default)]
    pub base_url: Option<String>,

    /// API key; falls back to the kind's environment variable
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub embedding_model: Option<String>,

    #[serde(default)]
    pub chat_model: Option<String>,

    /// Expected embedding dimension; responses of another length are rejected
    #[serde(default)]
    pub dimension: Option<usize>,

    /// HTTP client timeout in milliseconds
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,

    /// Gemini embedding task type
    #[serde(default)]
    pub task_type: Option<String>,

    /// Per-provider circuit breaker override
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

const fn default_provider_timeout_ms() -> u64 {
    30_000
}

impl ProviderConfig {
    pub const fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            base_url: None,
            api_key: None,
            embedding_model: None,
            chat_model: None,
            dimension: None,
            timeout_ms: default_provider_timeout_ms(),
            task_type: None,
            circuit_breaker: None,
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.kind.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn embedding_model(&self) -> String {
        self.embedding_model
            .clone()
            .unwrap_or_else(|| self.kind.default_embedding_model().to_string())
    }

    pub fn chat_model(&self) -> String {
        self.chat_model
            .clone()
            .unwrap_or_else(|| self.kind.default_chat_model().to_string())
    }

    /// Configured key, else the kind's environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| {
                self.kind
                    .api_key_env()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|key| !key.is_empty())
            })
    }
}

/// Resilience policies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResilienceConfig {
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub bulkhead: BulkheadConfig,

    /// Timeout of a single provider attempt in milliseconds
    #[serde(default = "default_per_call_timeout_ms")]
    pub per_call_timeout_ms: u64,
}

const fn default_per_call_timeout_ms() -> u64 {
    10_000
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            bulkhead: BulkheadConfig::default(),
            per_call_timeout_ms: default_per_call_timeout_ms(),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CircuitBreakerConfig {
    /// Failures within the window that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Number of most recent calls considered
    #[serde(default = "default_window_size")]
    pub window_size: u32,

    /// Time the circuit stays open before admitting trial calls
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Upper bound of the doubled cooldown after repeated reopening
    #[serde(default = "default_max_cooldown_ms")]
    pub max_cooldown_ms: u64,

    /// Concurrent trial calls allowed while half-open
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,

    /// Trial successes needed to close the circuit
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_window_size() -> u32 {
    10
}

const fn default_cooldown_ms() -> u64 {
    30_000
}

const fn default_max_cooldown_ms() -> u64 {
    300_000
}

const fn default_half_open_max_calls() -> u32 {
    1
}

const fn default_success_threshold() -> u32 {
    1
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_size: default_window_size(),
            cooldown_ms: default_cooldown_ms(),
            max_cooldown_ms: default_max_cooldown_ms(),
            half_open_max_calls: default_half_open_max_calls(),
            success_threshold: default_success_threshold(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff growth factor
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Jitter as a fraction of the interval (0.0 disables jitter)
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    200
}

const fn default_max_backoff_ms() -> u64 {
    5_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_randomization_factor() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            randomization_factor: default_randomization_factor(),
        }
    }
}

/// Behaviour when no rate limit token is available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitMode {
    /// Wait for a token, bounded by `max_queue_depth` waiters
    #[default]
    Queue,
    /// Fail immediately
    FailFast,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Token refill rate
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Bucket capacity
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    #[serde(default)]
    pub mode: RateLimitMode,

    /// Waiters allowed in queue mode
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
}

const fn default_requests_per_second() -> f64 {
    10.0
}

const fn default_burst_size() -> u32 {
    20
}

const fn default_max_queue_depth() -> usize {
    64
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
            mode: RateLimitMode::default(),
            max_queue_depth: default_max_queue_depth(),
        }
    }
}

/// Bulkhead configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BulkheadConfig {
    /// Concurrent logical calls per provider
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
}

const fn default_max_concurrent_calls() -> usize {
    16
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: default_max_concurrent_calls(),
        }
    }
}

/// Embedding cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    /// Default entry lifetime in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

const fn default_cache_max_entries() -> usize {
    10_000
}

const fn default_cache_ttl_secs() -> u64 {
    3_600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VectorStoreConfig {
    /// `SQLite` connection URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Index dimension; every stored vector must have this length
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default)]
    pub metric: SimilarityMetric,
}

fn default_database_url() -> String {
    "sqlite:.gateway/vectors.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_dimension() -> usize {
    1536
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            dimension: default_dimension(),
            metric: SimilarityMetric::default(),
        }
    }
}

/// Retrieval pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Chunks embedded concurrently across all documents
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters carried over between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Candidates fetched per requested result before re-ranking
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// Extract keywords with the chat model during text ingestion
    #[serde(default)]
    pub extract_keywords: bool,

    #[serde(default)]
    pub ranking: RankingConfig,
}

const fn default_concurrency() -> usize {
    8
}

const fn default_chunk_size() -> usize {
    800
}

const fn default_chunk_overlap() -> usize {
    100
}

const fn default_candidate_multiplier() -> usize {
    3
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            candidate_multiplier: default_candidate_multiplier(),
            extract_keywords: false,
            ranking: RankingConfig::default(),
        }
    }
}

/// Secondary ranking weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RankingConfig {
    /// Multiplier applied to the vector similarity
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    /// Weight of the lexical match between query terms and chunk keywords
    /// (0 disables hybrid scoring)
    #[serde(default)]
    pub lexical_weight: f32,

    /// Weight of the recency bonus (0 disables it)
    #[serde(default)]
    pub recency_weight: f32,

    /// Age at which the recency bonus halves, in hours
    #[serde(default = "default_half_life_hours")]
    pub half_life_hours: f64,

    /// `key=value` metadata matches and the score they add
    #[serde(default)]
    pub metadata_boosts: BTreeMap<String, f32>,
}

const fn default_vector_weight() -> f32 {
    1.0
}

const fn default_half_life_hours() -> f64 {
    24.0 * 30.0
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            lexical_weight: 0.0,
            recency_weight: 0.0,
            half_life_hours: default_half_life_hours(),
            metadata_boosts: BTreeMap::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

const fn default_enable_stdout() -> bool {
    true
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_stdout: default_enable_stdout(),
            rotation: default_rotation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_default_provider() {
        let config = Config::default();
        assert!(config.providers.contains_key(&config.default_provider));
        assert_eq!(config.resilience.retry.max_retries, 3);
        assert_eq!(config.vector_store.metric, SimilarityMetric::Cosine);
    }

    #[test]
    fn test_provider_defaults_follow_kind() {
        let ollama = ProviderConfig::new(ProviderKind::Ollama);
        assert_eq!(ollama.base_url(), "http://localhost:11434");
        assert_eq!(ollama.embedding_model(), "nomic-embed-text");
        assert!(!ollama.kind.requires_api_key());

        let openai = ProviderConfig {
            base_url: Some("http://proxy.local/v1/".to_string()),
            ..ProviderConfig::new(ProviderKind::Openai)
        };
        assert_eq!(openai.base_url(), "http://proxy.local/v1");
        assert_eq!(openai.embedding_model(), "text-embedding-3-small");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r"
default_provider: local
providers:
  local:
    kind: ollama
    dimension: 768
resilience:
  retry:
    max_retries: 1
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.default_provider, "local");
        assert_eq!(config.providers["local"].kind, ProviderKind::Ollama);
        assert_eq!(config.providers["local"].dimension, Some(768));
        assert_eq!(config.resilience.retry.max_retries, 1);
        assert_eq!(config.resilience.retry.initial_backoff_ms, 200);
        assert_eq!(config.resilience.rate_limit.mode, RateLimitMode::Queue);
        assert_eq!(config.cache.max_entries, 10_000);
    }

    #[test]
    fn test_explicit_api_key_wins_over_env() {
        let config = ProviderConfig {
            api_key: Some("sk-config".to_string()),
            ..ProviderConfig::new(ProviderKind::Openai)
        };
        temp_env::with_var("OPENAI_API_KEY", Some("sk-env"), || {
            assert_eq!(config.resolve_api_key().as_deref(), Some("sk-config"));
        });
        temp_env::with_var("OPENAI_API_KEY", Some("sk-env"), || {
            let from_env = ProviderConfig::new(ProviderKind::Openai);
            assert_eq!(from_env.resolve_api_key().as_deref(), Some("sk-env"));
        });
    }
}
