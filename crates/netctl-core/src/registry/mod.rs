//! Plugin-based provider registry
//!
//! The registry maps each [`ProviderKind`] to the adapter serving it and is
//! the single dispatch point for credential validation, connectivity tests
//! and invocations.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use netctl_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! netctl_provider_webhook::register(&registry);
//!
//! let probe = registry.test_connection(&account).await?;
//! ```
//!
//! ## Registration
//!
//! Provider crates register themselves during initialization:
//!
//! ```rust,ignore
//! // In netctl-provider-webhook
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register(Arc::new(WebhookAdapter::new()));
//! }
//! ```

use crate::config::{ProviderAccount, ProviderKind};
use crate::error::{Error, Result};
use crate::traits::{InvokeOutcome, Probe, ProviderAdapter};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on provider calls
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Provider registry
///
/// ## Thread Safety
///
/// The adapter map sits behind a `RwLock`. Lookups clone the adapter `Arc`
/// and release the lock before any network call, so a stuck provider never
/// blocks calls for other accounts.
pub struct ProviderRegistry {
    adapters: RwLock<HashMap<ProviderKind, Arc<dyn ProviderAdapter>>>,
    timeout: Duration,
}

impl ProviderRegistry {
    /// Create a new empty registry with the default call bound
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_PROBE_TIMEOUT)
    }

    /// Create a new empty registry with a custom call bound
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Bound applied to every provider call
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register an adapter, replacing any adapter of the same kind
    pub fn register(&self, adapter: Arc<dyn ProviderAdapter>) {
        let kind = adapter.kind();
        let mut adapters = self
            .adapters
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if adapters.insert(kind, adapter).is_some() {
            warn!("Replacing adapter for provider kind {}", kind);
        }
    }

    /// Check if a provider kind has an adapter
    pub fn has_adapter(&self, kind: ProviderKind) -> bool {
        self.read().contains_key(&kind)
    }

    /// List all registered provider kinds
    pub fn list_kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.read().keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Resolve the adapter for a kind
    pub fn adapter(&self, kind: ProviderKind) -> Result<Arc<dyn ProviderAdapter>> {
        self.read()
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::config(format!("No adapter registered for provider kind {}", kind)))
    }

    /// Validate an account's credentials without any network I/O
    pub fn validate(&self, account: &ProviderAccount) -> Result<()> {
        self.adapter(account.kind)?
            .validate_credentials(&account.credentials)
    }

    /// Validate, then probe the provider
    ///
    /// The probe is never attempted when validation fails; the failing
    /// credential field is returned as-is.
    pub async fn test_connection(&self, account: &ProviderAccount) -> Result<Probe> {
        let adapter = self.adapter(account.kind)?;
        adapter.validate_credentials(&account.credentials)?;

        debug!("Testing {} account {}", account.kind, account.id);
        self.bounded(&account.id, adapter.test_connection(&account.credentials))
            .await
    }

    /// Validate, then invoke an action
    pub async fn invoke(
        &self,
        account: &ProviderAccount,
        action: &str,
        payload: &serde_json::Value,
    ) -> Result<InvokeOutcome> {
        let adapter = self.adapter(account.kind)?;
        adapter.validate_credentials(&account.credentials)?;

        debug!("Invoking {} on {} account {}", action, account.kind, account.id);
        self.bounded(&account.id, adapter.invoke(&account.credentials, action, payload))
            .await
    }

    async fn bounded<T>(&self, id: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| e.with_target(id)),
            Err(_) => Err(Error::timeout(id, self.timeout)),
        }
    }

    fn read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<ProviderKind, Arc<dyn ProviderAdapter>>> {
        self.adapters
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
