//! Test doubles and common utilities for service contract tests
//!
//! The doubles stand in for real provider adapters without reaching any
//! third-party API.

#![allow(dead_code)]

use async_trait::async_trait;
use netctl_core::config::{AccessMode, AccessRuleSet, Credentials, ProviderKind, ServiceConfig};
use netctl_core::error::{Error, Result};
use netctl_core::traits::{InvokeOutcome, Probe, ProviderAdapter};
use netctl_core::{NetworkActionService, ProviderAccount, ServiceStores, WolTarget};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// An adapter that counts calls and answers from a canned result
pub struct CountingAdapter {
    kind: ProviderKind,
    probe_calls: Arc<AtomicUsize>,
    invoke_calls: Arc<AtomicUsize>,
    reject_auth: bool,
}

impl CountingAdapter {
    /// Adapter that accepts every probe
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            probe_calls: Arc::new(AtomicUsize::new(0)),
            invoke_calls: Arc::new(AtomicUsize::new(0)),
            reject_auth: false,
        }
    }

    /// Adapter whose provider rejects the credentials
    pub fn rejecting(kind: ProviderKind) -> Self {
        Self {
            reject_auth: true,
            ..Self::new(kind)
        }
    }

    /// Adapter sharing counters with another (the original is moved into the registry)
    pub fn sharing_counters_with(other: &CountingAdapter) -> Self {
        Self {
            kind: other.kind,
            probe_calls: other.probe_calls.clone(),
            invoke_calls: other.invoke_calls.clone(),
            reject_auth: other.reject_auth,
        }
    }

    /// Get the number of times test_connection() ran
    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    /// Get the number of times invoke() ran
    pub fn invoke_calls(&self) -> usize {
        self.invoke_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for CountingAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn test_connection(&self, _credentials: &Credentials) -> Result<Probe> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_auth {
            return Err(Error::auth_rejected(self.provider_name(), "invalid token"));
        }
        Ok(Probe {
            provider: self.kind,
            latency: Duration::ZERO,
            detail: "canned".to_string(),
        })
    }

    async fn invoke(
        &self,
        _credentials: &Credentials,
        action: &str,
        payload: &serde_json::Value,
    ) -> Result<InvokeOutcome> {
        self.invoke_calls.fetch_add(1, Ordering::SeqCst);
        if action != "echo" {
            return Err(Error::unsupported_action(self.provider_name(), action));
        }
        Ok(InvokeOutcome {
            provider: self.kind,
            action: action.to_string(),
            status: Some(200),
            body: payload.clone(),
        })
    }
}

/// Whitelist for the office LAN
pub fn office_whitelist() -> AccessRuleSet {
    AccessRuleSet::new(
        "office",
        AccessMode::Whitelist,
        vec!["192.168.1.0/24".to_string()],
    )
}

/// Service with in-memory stores and a gate on `gate` rule sets
pub fn service_with(
    rule_sets: Vec<AccessRuleSet>,
    accounts: Vec<ProviderAccount>,
    targets: Vec<WolTarget>,
    gate: &[&str],
) -> NetworkActionService {
    let config = ServiceConfig {
        probe_timeout_secs: 2,
        wake_timeout_secs: 2,
        admin_rule_sets: gate.iter().map(|id| id.to_string()).collect(),
    };
    NetworkActionService::new(ServiceStores::memory(rule_sets, accounts, targets), config)
        .expect("valid service config")
}

/// Cloudflare DNS account with the given token
pub fn dns_account(id: &str, token: &str) -> ProviderAccount {
    ProviderAccount::new(
        id,
        ProviderKind::CloudflareDns,
        Credentials::new().with("api_token", token),
    )
}
