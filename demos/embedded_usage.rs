//! Minimal embedding example for netctl-core
//!
//! This example demonstrates using netctl-core as a library: the host
//! application owns the record stores, registers its own provider adapter
//! next to the bundled ones, and sends every request through the gate.

use netctl_core::config::{AccessMode, AccessRuleSet, Credentials, ProviderKind, ServiceConfig};
use netctl_core::traits::{InvokeOutcome, Probe, ProviderAdapter};
use netctl_core::{
    Action, ActionOutcome, ActionRequest, Error, NetworkActionService, ProviderAccount, Result,
    ServiceStores, WolTarget,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Application-defined adapter standing in for a DNS registrar
struct EmbeddedRegistrar {
    probes: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ProviderAdapter for EmbeddedRegistrar {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CloudflareDns
    }

    async fn test_connection(&self, credentials: &Credentials) -> Result<Probe> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let token = credentials.require("api_token")?;
        println!("[Embedded] Probing with token of {} chars", token.len());
        Ok(Probe {
            provider: self.kind(),
            latency: Duration::from_millis(1),
            detail: "embedded registrar".to_string(),
        })
    }

    async fn invoke(
        &self,
        _credentials: &Credentials,
        action: &str,
        _payload: &serde_json::Value,
    ) -> Result<InvokeOutcome> {
        Err(Error::unsupported_action(self.provider_name(), action))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Embedded netctl-core Example ===\n");

    // A local socket plays the broadcast domain
    let receiver = tokio::net::UdpSocket::bind("127.0.0.1:0").await?;
    let port = receiver.local_addr()?.port();

    println!("1. Seeding records...");
    let stores = ServiceStores::memory(
        vec![AccessRuleSet::new(
            "lan-only",
            AccessMode::Whitelist,
            vec!["192.168.1.0/24".to_string(), "127.0.0.1".to_string()],
        )],
        vec![],
        vec![WolTarget::new("nas", "00:11:22:33:44:55").with_destination(Ipv4Addr::LOCALHOST, port)],
    );

    let config = ServiceConfig {
        admin_rule_sets: vec!["lan-only".to_string()],
        ..ServiceConfig::default()
    };
    let service = NetworkActionService::new(stores, config)?;

    println!("2. Registering adapters...");
    netctl_provider_webhook::register(service.registry());
    let probes = Arc::new(AtomicUsize::new(0));
    service.registry().register(Arc::new(EmbeddedRegistrar {
        probes: probes.clone(),
    }));

    println!("3. Saving an account (the view comes back masked)...");
    let view = service
        .save_provider_account(ProviderAccount::new(
            "registrar",
            ProviderKind::CloudflareDns,
            Credentials::new().with("api_token", "embedded-secret-token"),
        ))
        .await?;
    println!("   api_token = {:?}", view.credentials.get("api_token"));

    println!("4. Requests from inside and outside the gate...");
    for source in ["192.168.1.10", "203.0.113.7"] {
        let request = ActionRequest::new(
            source,
            Action::TestProvider {
                account_id: "registrar".to_string(),
            },
        );
        match service.handle(request).await {
            Ok(ActionOutcome::Connectivity(probe)) => {
                println!("   {} -> reachable ({})", source, probe.detail)
            }
            Ok(other) => println!("   {} -> {:?}", source, other),
            Err(e) => println!("   {} -> {}", source, e),
        }
    }
    println!("   Adapter probed {} time(s)", probes.load(Ordering::SeqCst));

    println!("5. Waking the NAS...");
    let request = ActionRequest::new(
        "127.0.0.1",
        Action::Wake {
            target_id: "nas".to_string(),
        },
    );
    if let ActionOutcome::Woken(report) = service.handle(request).await? {
        println!("   Sent {} bytes to {}", report.bytes_sent, report.destination);
    }

    let mut buf = [0u8; 128];
    let (len, _) = receiver.recv_from(&mut buf).await?;
    println!("   Receiver got a {}-byte magic packet", len);

    println!("\n=== Embedding Successful ===");
    println!("Key Points:");
    println!("- Records live in stores the application owns");
    println!("- Custom and bundled adapters share one registry");
    println!("- Every request passes the gate before any network I/O");

    Ok(())
}
