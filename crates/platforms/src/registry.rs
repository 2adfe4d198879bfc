//! Registry of provider singletons and live adapters.

use std::{collections::HashMap, sync::Arc};

use {dashmap::DashMap, tracing::{info, warn}};

use crate::{
    contract::{ConnectionKey, PlatformAdapter, PlatformProvider},
    error::PlatformError,
};

/// The only process-wide mutable shared state: provider singletons (fixed
/// at construction) and the live adapter map (read by workers, written by
/// the lifecycle service).
pub struct PlatformRegistry {
    providers: HashMap<String, Arc<dyn PlatformProvider>>,
    adapters: DashMap<String, Arc<dyn PlatformAdapter>>,
}

impl PlatformRegistry {
    #[must_use]
    pub fn new(providers: impl IntoIterator<Item = Arc<dyn PlatformProvider>>) -> Self {
        let providers: HashMap<String, Arc<dyn PlatformProvider>> = providers
            .into_iter()
            .map(|p| (p.name().to_ascii_lowercase(), p))
            .collect();
        Self {
            providers,
            adapters: DashMap::new(),
        }
    }

    #[must_use]
    pub fn provider(&self, name: &str) -> Option<Arc<dyn PlatformProvider>> {
        self.providers.get(&name.to_ascii_lowercase()).cloned()
    }

    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Run every provider's startup hook.
    pub async fn initialize_all(&self) -> Result<(), PlatformError> {
        for (name, provider) in &self.providers {
            provider.initialize().await?;
            info!(provider = %name, "platform provider initialized");
        }
        Ok(())
    }

    #[must_use]
    pub fn adapter(&self, key: &ConnectionKey) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&key.to_string()).map(|a| Arc::clone(&a))
    }

    /// Return the live adapter for `key`, creating one on first demand.
    ///
    /// Two workers racing on a cold key may both build an adapter; the
    /// loser's instance is dropped unused, which providers must tolerate.
    pub async fn obtain_adapter(
        &self,
        platform: &str,
        key: ConnectionKey,
        credentials: serde_json::Value,
    ) -> Result<Arc<dyn PlatformAdapter>, PlatformError> {
        if let Some(adapter) = self.adapter(&key) {
            return Ok(adapter);
        }

        let provider = self.provider(platform).ok_or_else(|| {
            PlatformError::unsupported(format!("no provider registered for platform {platform}"))
        })?;

        let created = provider.create_adapter(key.clone(), credentials).await?;
        let adapter = self
            .adapters
            .entry(key.to_string())
            .or_insert_with(|| Arc::clone(&created));
        Ok(Arc::clone(&adapter))
    }

    /// Shut down and drop the adapter for `key`, if any.
    pub async fn remove_adapter(&self, key: &ConnectionKey) {
        if let Some((_, adapter)) = self.adapters.remove(&key.to_string()) {
            adapter.shutdown().await;
            info!(connection_key = %key, "adapter removed");
        }
    }

    /// Drop every adapter bound to a platform config (any project).
    pub async fn remove_adapters_for_config(&self, platform_config_id: &str) {
        let keys: Vec<String> = self
            .adapters
            .iter()
            .filter(|entry| {
                entry
                    .key()
                    .rsplit_once(':')
                    .is_some_and(|(_, config)| config == platform_config_id)
            })
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            if let Some((_, adapter)) = self.adapters.remove(&key) {
                adapter.shutdown().await;
            }
        }
    }

    /// Process shutdown: tear down adapters, then providers.
    pub async fn shutdown(&self) {
        let keys: Vec<String> = self.adapters.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, adapter)) = self.adapters.remove(&key) {
                adapter.shutdown().await;
            }
        }
        for (name, provider) in &self.providers {
            provider.shutdown().await;
            info!(provider = %name, "platform provider shut down");
        }
    }

    #[must_use]
    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// Log providers reporting unhealthy. Surfaced by the health endpoint.
    #[must_use]
    pub fn unhealthy_providers(&self) -> Vec<&str> {
        let unhealthy: Vec<&str> = self
            .providers
            .iter()
            .filter(|(_, p)| !p.is_healthy())
            .map(|(name, _)| name.as_str())
            .collect();
        if !unhealthy.is_empty() {
            warn!(providers = ?unhealthy, "unhealthy platform providers");
        }
        unhealthy
    }
}
