use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{LlmError, Result};
use crate::provider::{ChatBackend, FragmentStream, StreamProvider};

/// Name to provider lookup, fixed after start-up
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn StreamProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the provider's own name, replacing any previous one
    pub fn register(&mut self, provider: Arc<dyn StreamProvider>) {
        let name = provider.name().to_string();
        tracing::debug!(provider = %name, "registered stream provider");
        self.providers.insert(name, provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn StreamProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn StreamProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| LlmError::ProviderNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

#[async_trait]
impl ChatBackend for ProviderRegistry {
    async fn open_stream(
        &self,
        scope: CancellationToken,
        provider: &str,
        input: &str,
    ) -> Result<FragmentStream> {
        self.get(provider)?.stream(scope, input).await
    }
}
