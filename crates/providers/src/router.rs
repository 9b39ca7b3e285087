//! Provider router picks the backend for an agent's application.
//!
//! Providers are built lazily from a connection profile and cached per
//! application id, so every agent of one application shares a client.

use simplea2a_core::agent::{ConnectionProfile, Environment};
use simplea2a_core::error::ProviderError;
use simplea2a_core::provider::Provider;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;
use crate::platform::PlatformProvider;

/// Maps a connection profile to the provider that serves it.
pub trait ProviderResolver: Send + Sync {
    fn resolve(&self, connection: &ConnectionProfile) -> Result<Arc<dyn Provider>, ProviderError>;
}

pub struct ProviderRouter {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
    timeout: Duration,
}

impl ProviderRouter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Register a provider for an application id, replacing any cached one.
    pub fn register(&self, application_id: impl Into<String>, provider: Arc<dyn Provider>) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        providers.insert(application_id.into(), provider);
    }

    /// Application ids with a cached provider.
    pub fn cached(&self) -> Vec<String> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut ids: Vec<String> = providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn build(&self, connection: &ConnectionProfile) -> Result<Arc<dyn Provider>, ProviderError> {
        if connection.base_url.is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "application '{}' has no base_url",
                connection.application_id
            )));
        }
        let provider: Arc<dyn Provider> = match connection.environment {
            Environment::Chat => Arc::new(OpenAiCompatProvider::new(
                &connection.application_id,
                &connection.base_url,
                connection.api_key.clone(),
                self.timeout,
            )?),
            Environment::Platform => Arc::new(PlatformProvider::new(
                &connection.application_id,
                &connection.base_url,
                connection.api_key.clone(),
                connection.app_secret.clone(),
                self.timeout,
            )?),
        };
        Ok(provider)
    }
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

impl ProviderResolver for ProviderRouter {
    fn resolve(&self, connection: &ConnectionProfile) -> Result<Arc<dyn Provider>, ProviderError> {
        {
            let providers = self
                .providers
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(p) = providers.get(&connection.application_id) {
                return Ok(p.clone());
            }
        }

        let provider = self.build(connection)?;
        debug!(
            application = %connection.application_id,
            environment = connection.environment.as_str(),
            "Created provider"
        );
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(providers
            .entry(connection.application_id.clone())
            .or_insert(provider)
            .clone())
    }
}

/// Serves every application with one provider.
pub struct SingleProvider(pub Arc<dyn Provider>);

impl ProviderResolver for SingleProvider {
    fn resolve(&self, _connection: &ConnectionProfile) -> Result<Arc<dyn Provider>, ProviderError> {
        Ok(self.0.clone())
    }
}
