//! IP access control
//!
//! - [`AddressPattern`] / [`matches`]: single address and CIDR matching
//! - [`AccessPolicy`] / [`evaluate`]: blacklist and whitelist verdicts

pub mod matcher;
pub mod policy;

pub use matcher::{AddressPattern, matches, parse_source};
pub use policy::{AccessPolicy, AccessRule, Verdict, evaluate, evaluate_all};
