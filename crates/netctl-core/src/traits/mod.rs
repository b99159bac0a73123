//! Core traits for netctl
//!
//! This module defines the abstract interfaces the core is built on.
//!
//! - [`ProviderAdapter`]: Credential validation and connectivity probing for one provider kind
//! - [`RecordStore`]: Persistence boundary for the records the console edits

pub mod provider_adapter;
pub mod record_store;

pub use provider_adapter::{InvokeOutcome, Probe, ProviderAdapter};
pub use record_store::{Record, RecordStore};
