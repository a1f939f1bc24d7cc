//! Configuration loading from files and environment overrides.

use std::io::Write;
use tempfile::NamedTempFile;

use retrieval_gateway::domain::models::{ProviderKind, RateLimitMode, SimilarityMetric};
use retrieval_gateway::ConfigLoader;

fn yaml_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_from_file_merges_with_defaults() {
    let file = yaml_file(
        r"
default_provider: local
providers:
  local:
    kind: ollama
    dimension: 768
resilience:
  rate_limit:
    mode: fail_fast
vector_store:
  dimension: 768
  metric: euclidean
",
    );

    temp_env::with_vars_unset(["GATEWAY_CACHE__MAX_ENTRIES", "GATEWAY_DEFAULT_PROVIDER"], || {
        let config = ConfigLoader::load_from_file(file.path()).unwrap();

        assert_eq!(config.default_provider, "local");
        let local = &config.providers["local"];
        assert_eq!(local.kind, ProviderKind::Ollama);
        assert_eq!(local.dimension, Some(768));
        assert_eq!(local.embedding_model(), "nomic-embed-text");
        assert_eq!(config.resilience.rate_limit.mode, RateLimitMode::FailFast);
        assert_eq!(config.vector_store.metric, SimilarityMetric::Euclidean);
        assert_eq!(config.cache.max_entries, 10_000);
    });
}

#[test]
fn test_env_overrides_file() {
    let file = yaml_file("cache:\n  max_entries: 50\n");

    temp_env::with_vars(
        [
            ("GATEWAY_CACHE__MAX_ENTRIES", Some("75")),
            ("GATEWAY_LOGGING__LEVEL", Some("debug")),
        ],
        || {
            let config = ConfigLoader::load_from_file(file.path()).unwrap();
            assert_eq!(config.cache.max_entries, 75);
            assert_eq!(config.logging.level, "debug");
        },
    );
}

#[test]
fn test_invalid_file_is_rejected() {
    let file = yaml_file("pipeline:\n  chunk_size: 100\n  chunk_overlap: 150\n");

    temp_env::with_var_unset("GATEWAY_PIPELINE__CHUNK_OVERLAP", || {
        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    });
}

#[test]
fn test_unknown_default_provider_is_rejected() {
    let file = yaml_file("default_provider: mystery\n");

    temp_env::with_var_unset("GATEWAY_DEFAULT_PROVIDER", || {
        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("mystery"));
    });
}

#[test]
fn test_env_never_expire_ttl_is_rejected() {
    let file = yaml_file("cache:\n  max_entries: 50\n");

    temp_env::with_var(
        "GATEWAY_CACHE__TTL_SECS",
        Some("18446744073709551615"),
        || {
            let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
            assert!(format!("{err:#}").contains("cache.ttl_secs"));
        },
    );
}
