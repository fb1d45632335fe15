use std::sync::Arc;

use tokio::task::JoinHandle;

use sluice_config::Config;
use sluice_gateway::{Gateway, Keepalive, SessionRegistry, StreamBridge};
use sluice_limiter::{AdmissionController, CounterStore, MemoryCounterStore, RedisCounterStore};
use sluice_llm::{MockProvider, OpenAiProvider, ProviderRegistry};
use sluice_observability::MetricsCollector;

use crate::error::ServerError;
use crate::identity::{HttpIdentityClient, IdentityService};

/// Shared handles every handler and middleware needs
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Gateway,
    pub admission: AdmissionController,
    pub identity: Arc<dyn IdentityService>,
    pub metrics: Arc<MetricsCollector>,
}

impl AppState {
    pub fn new(
        config: Config,
        gateway: Gateway,
        admission: AdmissionController,
        identity: Arc<dyn IdentityService>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            gateway,
            admission,
            identity,
            metrics,
        }
    }

    /// Assemble the runtime from a validated configuration.
    ///
    /// Spawns the session registry loop; its handle is returned so the
    /// caller can wait for it after shutdown.
    pub async fn build(
        config: Config,
        metrics: Arc<MetricsCollector>,
    ) -> Result<(Self, JoinHandle<()>), ServerError> {
        let store = counter_store(&config).await?;
        let admission = AdmissionController::new(config.rate_limit.rules.clone(), store)
            .with_store_timeout(config.rate_limit.store.timeout());

        let providers = provider_registry(&config)?;
        tracing::info!(
            providers = ?providers.names(),
            default = %config.llm.default_provider,
            "stream providers ready"
        );
        let bridge = StreamBridge::new(Arc::new(providers), config.llm.default_provider.clone());

        let (registry, registry_task) = SessionRegistry::spawn();
        let gateway = Gateway::new(registry, bridge)
            .with_keepalive(keepalive(&config))
            .with_queue_capacity(config.gateway.send_queue_capacity);

        let identity = HttpIdentityClient::new(
            config.identity.base_url.clone(),
            std::time::Duration::from_secs(config.identity.timeout_secs),
        )?;

        let state = Self::new(config, gateway, admission, Arc::new(identity), metrics);
        Ok((state, registry_task))
    }

    pub fn registry(&self) -> &SessionRegistry {
        self.gateway.registry()
    }
}

pub fn keepalive(config: &Config) -> Keepalive {
    Keepalive {
        max_frame_bytes: config.gateway.max_frame_bytes,
        pong_wait: config.gateway.pong_wait(),
        ping_period: config.gateway.ping_period(),
        write_wait: config.gateway.write_wait(),
    }
}

async fn counter_store(config: &Config) -> Result<Arc<dyn CounterStore>, ServerError> {
    let url = config.rate_limit.store.url.trim();
    if url.is_empty() {
        tracing::info!("rate limit counters kept in process");
        return Ok(Arc::new(MemoryCounterStore::new()));
    }

    let store = RedisCounterStore::connect(url).await?;
    tracing::info!(url = %url, "connected to shared counter store");
    Ok(Arc::new(store))
}

fn provider_registry(config: &Config) -> Result<ProviderRegistry, ServerError> {
    let mut providers =
        ProviderRegistry::new().with_provider(Arc::new(MockProvider::new(config.llm.mock.clone())));
    if let Some(settings) = &config.llm.openai {
        providers.register(Arc::new(OpenAiProvider::new(settings.clone())?));
    }
    Ok(providers)
}
