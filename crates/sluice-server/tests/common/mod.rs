#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use sluice_config::Config;
use sluice_gateway::{Gateway, SessionRegistry, StreamBridge};
use sluice_limiter::{AdmissionController, MemoryCounterStore};
use sluice_llm::{MockProvider, MockSettings, ProviderRegistry};
use sluice_observability::MetricsCollector;
use sluice_server::{
    AppState, Credentials, IdentityError, IdentityService, LoginGrant, Registration, TokenClaims,
};
use tokio::task::JoinHandle;

pub const GOOD_TOKEN: &str = "good-token";
/// Makes the identity double behave as if it were down
pub const OUTAGE_TOKEN: &str = "outage";
pub const USER_ID: &str = "user-7";

/// Identity service double with a fixed user table
pub struct StaticIdentity;

#[async_trait]
impl IdentityService for StaticIdentity {
    async fn register(&self, credentials: &Credentials) -> Result<Registration, IdentityError> {
        if credentials.username == "taken" {
            return Err(IdentityError::Rejected("username already exists".into()));
        }
        Ok(Registration {
            message: "User registered successfully".into(),
            user_id: USER_ID.into(),
        })
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, IdentityError> {
        if credentials.password != "secret" {
            return Err(IdentityError::Rejected("invalid credentials".into()));
        }
        Ok(LoginGrant {
            token: GOOD_TOKEN.into(),
            username: credentials.username.clone(),
            role: "user".into(),
        })
    }

    async fn validate(&self, token: &str) -> Result<TokenClaims, IdentityError> {
        match token {
            GOOD_TOKEN => Ok(TokenClaims {
                valid: true,
                identity: USER_ID.into(),
                role: "user".into(),
            }),
            OUTAGE_TOKEN => Err(IdentityError::Unavailable("connection refused".into())),
            _ => Ok(TokenClaims {
                valid: false,
                identity: String::new(),
                role: String::new(),
            }),
        }
    }
}

/// Config with admission switched off and an instant mock provider
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.rate_limit.rules.enabled = false;
    config.llm.mock = MockSettings::instant();
    config
}

pub fn app_state(config: Config) -> (AppState, JoinHandle<()>) {
    let providers =
        ProviderRegistry::new().with_provider(Arc::new(MockProvider::new(config.llm.mock.clone())));
    let bridge = StreamBridge::new(Arc::new(providers), config.llm.default_provider.clone());
    let (registry, task) = SessionRegistry::spawn();
    let gateway = Gateway::new(registry, bridge)
        .with_keepalive(sluice_server::state::keepalive(&config))
        .with_queue_capacity(config.gateway.send_queue_capacity);
    let admission = AdmissionController::new(
        config.rate_limit.rules.clone(),
        Arc::new(MemoryCounterStore::new()),
    );

    let state = AppState::new(
        config,
        gateway,
        admission,
        Arc::new(StaticIdentity),
        Arc::new(MetricsCollector::disabled()),
    );
    (state, task)
}
