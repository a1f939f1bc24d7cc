use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::ProviderHealth;
use crate::infrastructure::Gateway;
use crate::services::CacheStats;

#[derive(Debug, Serialize)]
pub struct HealthOutput {
    pub default_provider: String,
    pub providers: Vec<ProviderHealth>,
    pub cache: CacheStats,
    pub stored_vectors: u64,
}

impl CommandOutput for HealthOutput {
    fn to_human(&self) -> String {
        let mut providers = table(&["Provider", "Circuit", "Failures", "Times opened", "Open until"]);
        for health in &self.providers {
            let name = if health.provider == self.default_provider {
                format!("{} (default)", health.provider)
            } else {
                health.provider.clone()
            };
            providers.add_row(vec![
                name,
                health.circuit_state.to_string(),
                health.failure_count.to_string(),
                health.open_count.to_string(),
                health
                    .opened_until
                    .map(|t| t.format("%H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]);
        }
        format!(
            "{providers}\nCache: {} entries, {} hits, {} misses ({:.1}% hit ratio), {} evictions\nVector store: {} record(s)",
            self.cache.entries,
            self.cache.hits,
            self.cache.misses,
            self.cache.hit_ratio() * 100.0,
            self.cache.evictions,
            self.stored_vectors
        )
    }
}

pub async fn execute(gateway: &Gateway, json: bool) -> Result<()> {
    let stored_vectors = gateway
        .store
        .count()
        .await
        .context("Failed to count stored vectors")?;

    output(
        &HealthOutput {
            default_provider: gateway.registry.default_provider().to_string(),
            providers: gateway.registry.health().await,
            cache: gateway.cache.stats(),
            stored_vectors,
        },
        json,
    );
    Ok(())
}
