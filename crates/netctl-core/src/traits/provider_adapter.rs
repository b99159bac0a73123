// # Provider Adapter Trait
//
// Defines the interface every DNS/CDN/webhook integration implements.
//
// ## Implementations
//
// - Webhook callbacks: `netctl-provider-webhook` crate
// - Cloudflare DNS and origin rules: `netctl-provider-cloudflare` crate
// - Alibaba Cloud DNS and ESA: `netctl-provider-aliyun` crate
// - DNSPod: `netctl-provider-dnspod` crate
//
// ## Usage
//
// ```rust,ignore
// use netctl_core::ProviderAdapter;
//
// let adapter = /* ProviderAdapter implementation */;
// adapter.validate_credentials(&account.credentials)?;
// let probe = adapter.test_connection(&account.credentials).await?;
// println!("{} answered in {:?}", probe.provider, probe.latency);
// ```

use crate::config::{Credentials, ProviderKind};
use async_trait::async_trait;
use std::time::Duration;

/// Result of a successful connectivity test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// Provider kind that was probed
    pub provider: ProviderKind,
    /// Round-trip time of the probe
    pub latency: Duration,
    /// Short provider-specific description (e.g. "token active")
    pub detail: String,
}

/// Result of an invocation
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOutcome {
    /// Provider kind that was invoked
    pub provider: ProviderKind,
    /// Action name
    pub action: String,
    /// HTTP status of the final call, when there was one
    pub status: Option<u16>,
    /// Provider response (JSON, or a string for non-JSON bodies)
    pub body: serde_json::Value,
}

/// Trait for provider adapter implementations
///
/// Adapters are stateless functions of the credentials they receive. They
/// may hold a shared HTTP client, but never cache anything derived from a
/// particular account.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Failure semantics
///
/// - Missing or malformed credentials → `Error::InvalidCredential { field }`
/// - Connection refused, DNS or TLS failure → `Error::Unreachable`
/// - Client-side timeout → `Error::Timeout`
/// - Provider rejected the credentials → `Error::AuthRejected`
///
/// Adapters make one attempt per call. They never retry; callers decide.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider kind served by this adapter
    fn kind(&self) -> ProviderKind;

    /// Check the credential mapping without touching the network
    ///
    /// The default checks the kind's required keys. Adapters override it
    /// to add format checks and should call [`Credentials::require_all`]
    /// first so the field order stays stable.
    fn validate_credentials(&self, credentials: &Credentials) -> Result<(), crate::Error> {
        credentials.require_all(self.kind().required_fields())
    }

    /// Perform a minimal read-only call proving the credentials work
    ///
    /// # Returns
    ///
    /// - `Ok(Probe)`: The provider accepted the credentials
    /// - `Err(Error)`: Unreachable, AuthRejected, Timeout, or a provider error
    async fn test_connection(&self, credentials: &Credentials) -> Result<Probe, crate::Error>;

    /// Perform a named action
    ///
    /// Unknown actions fail with `Error::UnsupportedAction` before any
    /// network I/O.
    async fn invoke(
        &self,
        credentials: &Credentials,
        action: &str,
        payload: &serde_json::Value,
    ) -> Result<InvokeOutcome, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str {
        self.kind().as_str()
    }
}
