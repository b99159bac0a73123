// # Provider Real Environment Validation Tool
//
// Checks a provider account against the real provider API: credential
// validation, one connectivity probe, and optionally one read-only action.
//
// ## Usage
//
// ```bash
// NETCTL_VALIDATE_KIND=cloudflare_dns \
// NETCTL_CRED_API_TOKEN=your_token \
// NETCTL_VALIDATE_ACTION=list_zones \
// cargo run -p netctl-demos --bin provider_validation
// ```
//
// ## Environment Variables
//
// Required:
// - `NETCTL_VALIDATE_KIND`: provider kind (webhook, cloudflare_origin_rule,
//   aliyun_esa, cloudflare_dns, alidns, dnspod)
// - `NETCTL_CRED_<FIELD>`: one variable per credential field, upper-cased
//   (e.g. `NETCTL_CRED_ACCESS_KEY_ID`)
//
// Optional:
// - `NETCTL_VALIDATE_ACTION`: action to invoke after the probe
// - `NETCTL_VALIDATE_PAYLOAD`: JSON payload for the action (default `{}`)
// - `NETCTL_PROBE_TIMEOUT_SECS`: call bound (default 5)
//
// Secrets are never printed; the account is echoed back in its masked view.

use netctl_core::config::{Credentials, ProviderKind};
use netctl_core::{ProviderAccount, ProviderRegistry};
use std::env;
use std::process::ExitCode;
use std::time::Duration;

/// Optional credential fields worth forwarding per kind
fn optional_fields(kind: ProviderKind) -> &'static [&'static str] {
    match kind {
        ProviderKind::Webhook => &["method", "headers", "body"],
        _ => &[],
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("=== Provider Real Environment Validation ===");

    let Ok(kind_name) = env::var("NETCTL_VALIDATE_KIND") else {
        tracing::error!("NETCTL_VALIDATE_KIND environment variable is required");
        return ExitCode::from(1);
    };
    let kind: ProviderKind = match serde_json::from_value(serde_json::Value::String(kind_name.clone())) {
        Ok(kind) => kind,
        Err(_) => {
            tracing::error!("Unknown provider kind: {}", kind_name);
            return ExitCode::from(1);
        }
    };

    let mut credentials = Credentials::new();
    for field in kind.required_fields().iter().chain(optional_fields(kind)) {
        if let Ok(value) = env::var(format!("NETCTL_CRED_{}", field.to_uppercase())) {
            credentials.insert(*field, value);
        }
    }
    let account = ProviderAccount::new("validation", kind, credentials);

    let timeout = env::var("NETCTL_PROBE_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);
    let registry = ProviderRegistry::with_timeout(Duration::from_secs(timeout));
    netctl_provider_webhook::register(&registry);
    netctl_provider_cloudflare::register(&registry);
    netctl_provider_aliyun::register(&registry);
    netctl_provider_dnspod::register(&registry);

    tracing::info!("Account: {:?}", account.view());

    tracing::info!("--- Step 1: Validating credentials ---");
    if let Err(e) = registry.validate(&account) {
        tracing::error!("✗ {}", e);
        return ExitCode::from(1);
    }
    tracing::info!("✓ Credentials well-formed");

    tracing::info!("--- Step 2: Connectivity test ---");
    match registry.test_connection(&account).await {
        Ok(probe) => tracing::info!("✓ Reachable in {:?}: {}", probe.latency, probe.detail),
        Err(e) => {
            tracing::error!("✗ {} ({:?})", e, e.category());
            return ExitCode::from(2);
        }
    }

    if let Ok(action) = env::var("NETCTL_VALIDATE_ACTION") {
        tracing::info!("--- Step 3: Invoking {} ---", action);
        let payload = env::var("NETCTL_VALIDATE_PAYLOAD").unwrap_or_else(|_| "{}".to_string());
        let payload = match serde_json::from_str(&payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("NETCTL_VALIDATE_PAYLOAD is not valid JSON: {}", e);
                return ExitCode::from(1);
            }
        };
        match registry.invoke(&account, &action, &payload).await {
            Ok(outcome) => tracing::info!("✓ {:?}: {}", outcome.status, outcome.body),
            Err(e) => {
                tracing::error!("✗ {} ({:?})", e, e.category());
                return ExitCode::from(2);
            }
        }
    }

    tracing::info!("=== Validation complete ===");
    ExitCode::SUCCESS
}
