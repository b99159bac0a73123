// # netctl-core
//
// Core library of the netctl network-action service.
//
// ## Architecture Overview
//
// The console configures three kinds of network actions; this crate
// validates their records and performs them:
// - **acl**: IP/CIDR matching and blacklist/whitelist policies
// - **ProviderAdapter**: Trait for DNS/CDN/webhook credential checks and probes
// - **ProviderRegistry**: Dispatches provider calls by kind, with a bounded timeout
// - **WolDispatcher**: Builds and sends Wake-on-LAN magic packets
// - **NetworkActionService**: Facade gating requests and routing them
// - **RecordStore**: Persistence boundary (the core never writes durably)
//
// ## Design Principles
//
// 1. **Validate first**: Malformed records are rejected before any network I/O
// 2. **Single attempt**: No retries anywhere in the core
// 3. **Plugin-based**: Providers register adapters, no scattered kind checks
// 4. **Bounded**: Every network call carries a timeout
// 5. **Secrets stay secret**: Credentials are masked in views, logs and Debug output

pub mod acl;
pub mod config;
pub mod error;
pub mod registry;
pub mod service;
pub mod store;
pub mod traits;
pub mod wol;

// Re-export core types for convenience
pub use acl::{AccessPolicy, AddressPattern, Verdict};
pub use config::{
    AccessMode, AccessRuleSet, Credentials, ProviderAccount, ProviderAccountView, ProviderKind,
    ServiceConfig, WolTarget,
};
pub use error::{Error, ErrorCategory, Result};
pub use registry::ProviderRegistry;
pub use service::{Action, ActionOutcome, ActionRequest, NetworkActionService, ServiceStores};
pub use store::MemoryRecordStore;
pub use traits::{InvokeOutcome, Probe, ProviderAdapter, RecordStore};
pub use wol::{MacAddress, MagicPacket, WakeReport, WolDispatcher};
