//! Configuration and record types for netctl
//!
//! This module defines the records the console edits (access rule sets,
//! provider accounts, Wake-on-LAN targets) and the service settings.
//! Records are validated here, at write time, so that evaluation never has
//! to cope with malformed input.

use crate::acl::AddressPattern;
use crate::error::{Error, Result};
use crate::traits::Record;
use crate::wol::MacAddress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Bound on every provider network call (in seconds)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Bound on a Wake-on-LAN send (in seconds)
    #[serde(default = "default_wake_timeout_secs")]
    pub wake_timeout_secs: u64,

    /// Rule sets gating every request; all of them must allow the source
    #[serde(default)]
    pub admin_rule_sets: Vec<String>,
}

impl ServiceConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(1..=60).contains(&self.probe_timeout_secs) {
            return Err(Error::config(format!(
                "probe_timeout_secs must be between 1 and 60, got {}",
                self.probe_timeout_secs
            )));
        }
        if !(1..=60).contains(&self.wake_timeout_secs) {
            return Err(Error::config(format!(
                "wake_timeout_secs must be between 1 and 60, got {}",
                self.wake_timeout_secs
            )));
        }
        if self.admin_rule_sets.iter().any(|id| id.trim().is_empty()) {
            return Err(Error::config("admin_rule_sets cannot contain blank ids"));
        }
        Ok(())
    }

    /// Provider call bound as a [`Duration`]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Wake send bound as a [`Duration`]
    pub fn wake_timeout(&self) -> Duration {
        Duration::from_secs(self.wake_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout_secs(),
            wake_timeout_secs: default_wake_timeout_secs(),
            admin_rule_sets: Vec::new(),
        }
    }
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_wake_timeout_secs() -> u64 {
    5
}

// ---------------------------------------------------------------------------
// Access rules
// ---------------------------------------------------------------------------

/// How matches of a rule set are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Matching addresses are denied, everything else is allowed
    Blacklist,
    /// Only matching addresses are allowed
    Whitelist,
}

/// A named list of IP/CIDR entries evaluated in one mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRuleSet {
    /// Record id
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Disabled rule sets stay stored but contribute no matches
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Blacklist or whitelist
    pub mode: AccessMode,

    /// Ordered IP or CIDR entries
    pub entries: Vec<String>,

    /// Free-form note
    #[serde(default)]
    pub remark: String,
}

impl AccessRuleSet {
    /// Create a new enabled rule set
    pub fn new(id: impl Into<String>, mode: AccessMode, entries: Vec<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            enabled: true,
            mode,
            entries,
            remark: String::new(),
        }
    }

    /// Enable or disable the rule set
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Validate every entry
    pub fn validate(&self) -> Result<()> {
        require_id(&self.id)?;
        if self.entries.is_empty() {
            return Err(Error::validation("entries", "at least one entry is required"));
        }
        for (index, entry) in self.entries.iter().enumerate() {
            AddressPattern::parse(entry).map_err(|_| {
                Error::validation(
                    format!("entries[{}]", index),
                    format!("'{}' is not an IP address or CIDR block", entry),
                )
            })?;
        }
        Ok(())
    }
}

impl Record for AccessRuleSet {
    const KIND: &'static str = "access rule set";

    fn id(&self) -> &str {
        &self.id
    }
}

fn default_enabled() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Provider accounts
// ---------------------------------------------------------------------------

/// Provider family, as grouped by the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFamily {
    /// Webhook-style callbacks
    CallbackChannel,
    /// CDN origin rules (port rewriting)
    CdnOriginPort,
    /// Cloud edge platform APIs
    CloudEdgeApi,
    /// DNS registrars
    DnsRegistrar,
}

/// Shape of the credentials a provider kind requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialShape {
    /// Access id plus access secret
    KeyPair,
    /// A single API token
    Token,
    /// A callback URL and HTTP method
    Endpoint,
}

/// Supported provider kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Generic HTTP callback
    Webhook,
    /// Cloudflare origin rule (origin port rewriting)
    CloudflareOriginRule,
    /// Alibaba Cloud Edge Security Acceleration
    AliyunEsa,
    /// Cloudflare DNS (API token)
    CloudflareDns,
    /// Alibaba Cloud DNS (AccessKey pair)
    Alidns,
    /// DNSPod (token id + token)
    Dnspod,
}

impl ProviderKind {
    /// All kinds, in display order
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::Webhook,
        ProviderKind::CloudflareOriginRule,
        ProviderKind::AliyunEsa,
        ProviderKind::CloudflareDns,
        ProviderKind::Alidns,
        ProviderKind::Dnspod,
    ];

    /// Get the kind name (matches the serialized form)
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Webhook => "webhook",
            ProviderKind::CloudflareOriginRule => "cloudflare_origin_rule",
            ProviderKind::AliyunEsa => "aliyun_esa",
            ProviderKind::CloudflareDns => "cloudflare_dns",
            ProviderKind::Alidns => "alidns",
            ProviderKind::Dnspod => "dnspod",
        }
    }

    /// Family this kind belongs to
    pub fn family(&self) -> ProviderFamily {
        match self {
            ProviderKind::Webhook => ProviderFamily::CallbackChannel,
            ProviderKind::CloudflareOriginRule => ProviderFamily::CdnOriginPort,
            ProviderKind::AliyunEsa => ProviderFamily::CloudEdgeApi,
            ProviderKind::CloudflareDns | ProviderKind::Alidns | ProviderKind::Dnspod => {
                ProviderFamily::DnsRegistrar
            }
        }
    }

    /// Credential shape of this kind
    pub fn credential_shape(&self) -> CredentialShape {
        match self {
            ProviderKind::Webhook => CredentialShape::Endpoint,
            ProviderKind::CloudflareOriginRule | ProviderKind::CloudflareDns => {
                CredentialShape::Token
            }
            ProviderKind::AliyunEsa | ProviderKind::Alidns | ProviderKind::Dnspod => {
                CredentialShape::KeyPair
            }
        }
    }

    /// Credential keys that must be present and non-blank
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::Webhook => &["url"],
            ProviderKind::CloudflareOriginRule => &["api_token", "zone_id", "rule_id"],
            ProviderKind::CloudflareDns => &["api_token"],
            ProviderKind::AliyunEsa | ProviderKind::Alidns => {
                &["access_key_id", "access_key_secret"]
            }
            ProviderKind::Dnspod => &["token_id", "token"],
        }
    }

    /// Credential keys that are write-only
    pub fn secret_fields(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::Webhook => &[],
            ProviderKind::CloudflareOriginRule | ProviderKind::CloudflareDns => &["api_token"],
            ProviderKind::AliyunEsa | ProviderKind::Alidns => &["access_key_secret"],
            ProviderKind::Dnspod => &["token"],
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific credential mapping
///
/// Values are never printed by the `Debug` implementation.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a trimmed, non-blank value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Get a required value, failing with the key as the offending field
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| Error::invalid_credential(key))
    }

    /// Check that every key is present, in order
    pub fn require_all(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.require(key)?;
        }
        Ok(())
    }

    /// Iterate over keys
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Copy with the given secret fields masked
    pub fn masked(&self, secret_fields: &[&str]) -> Self {
        let inner = self
            .0
            .iter()
            .map(|(key, value)| {
                if secret_fields.contains(&key.as_str()) {
                    (key.clone(), mask_secret(value))
                } else {
                    (key.clone(), value.clone())
                }
            })
            .collect();
        Self(inner)
    }

    /// Fill secret fields left blank (or echoed back masked) from `stored`
    pub fn retain_secrets_from(&mut self, stored: &Credentials, secret_fields: &[&str]) {
        for field in secret_fields {
            let Some(previous) = stored.0.get(*field) else {
                continue;
            };
            let keep_previous = match self.0.get(*field) {
                None => true,
                Some(value) => value.trim().is_empty() || *value == mask_secret(previous),
            };
            if keep_previous {
                self.0.insert((*field).to_string(), previous.clone());
            }
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|key| (key, "<REDACTED>")))
            .finish()
    }
}

/// Mask all but a short prefix of a secret
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() < 8 {
        return "****".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}****", prefix)
}

/// Stored account for a DNS/CDN/webhook provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAccount {
    /// Record id
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Provider kind; decides which credential keys are required
    pub kind: ProviderKind,

    /// Kind-specific credentials
    #[serde(default)]
    pub credentials: Credentials,

    /// Free-form note
    #[serde(default)]
    pub remark: String,
}

impl ProviderAccount {
    /// Create a new account
    pub fn new(id: impl Into<String>, kind: ProviderKind, credentials: Credentials) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            credentials,
            remark: String::new(),
        }
    }

    /// Caller-facing copy with secrets masked
    pub fn view(&self) -> ProviderAccountView {
        ProviderAccountView {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            credentials: self.credentials.masked(self.kind.secret_fields()),
            remark: self.remark.clone(),
        }
    }
}

impl Record for ProviderAccount {
    const KIND: &'static str = "provider account";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Read model of a [`ProviderAccount`]; secrets are masked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderAccountView {
    /// Record id
    pub id: String,
    /// Display name
    pub name: String,
    /// Provider kind
    pub kind: ProviderKind,
    /// Credentials with secret fields masked
    pub credentials: Credentials,
    /// Free-form note
    pub remark: String,
}

// ---------------------------------------------------------------------------
// Wake-on-LAN targets
// ---------------------------------------------------------------------------

/// A device that can be woken with a magic packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WolTarget {
    /// Record id
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Physical address, `AA:BB:CC:DD:EE:FF` or `AA-BB-CC-DD-EE-FF`
    pub mac_address: String,

    /// Destination of the datagram
    #[serde(default = "default_broadcast_ip")]
    pub broadcast_ip: Ipv4Addr,

    /// Destination UDP port
    #[serde(default = "default_wol_port")]
    pub port: u16,

    /// Interface the socket must be bound to
    #[serde(default)]
    pub net_interface: Option<String>,

    /// Free-form note
    #[serde(default)]
    pub remark: String,
}

impl WolTarget {
    /// Create a target with the default broadcast address and port
    pub fn new(id: impl Into<String>, mac_address: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            mac_address: mac_address.into(),
            broadcast_ip: default_broadcast_ip(),
            port: default_wol_port(),
            net_interface: None,
            remark: String::new(),
        }
    }

    /// Set the destination address and port
    pub fn with_destination(mut self, broadcast_ip: Ipv4Addr, port: u16) -> Self {
        self.broadcast_ip = broadcast_ip;
        self.port = port;
        self
    }

    /// Bind sends to a network interface
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.net_interface = Some(interface.into());
        self
    }

    /// Validate the record
    pub fn validate(&self) -> Result<()> {
        require_id(&self.id)?;
        MacAddress::parse(&self.mac_address)?;
        if self.port == 0 {
            return Err(Error::validation("port", "must be between 1 and 65535"));
        }
        if let Some(interface) = &self.net_interface
            && interface.trim().is_empty()
        {
            return Err(Error::validation("net_interface", "cannot be blank"));
        }
        Ok(())
    }
}

impl Record for WolTarget {
    const KIND: &'static str = "wol target";

    fn id(&self) -> &str {
        &self.id
    }
}

fn default_broadcast_ip() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}

fn default_wol_port() -> u16 {
    9
}

fn require_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::validation("id", "cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_config_defaults() {
        let config: ServiceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.wake_timeout(), Duration::from_secs(5));
        assert!(config.admin_rule_sets.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_service_config_rejects_zero_timeout() {
        let config = ServiceConfig {
            probe_timeout_secs: 0,
            ..ServiceConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rule_set_rejects_invalid_entry_at_write_time() {
        let rules = AccessRuleSet::new(
            "lan",
            AccessMode::Whitelist,
            vec!["192.168.1.0/24".into(), "not-an-ip".into()],
        );
        match rules.validate() {
            Err(Error::Validation { field, .. }) => assert_eq!(field, "entries[1]"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_rule_set_requires_entries() {
        let rules = AccessRuleSet::new("empty", AccessMode::Blacklist, vec![]);
        assert!(matches!(rules.validate(), Err(Error::Validation { .. })));
    }

    #[test]
    fn test_rule_set_deserializes_with_defaults() {
        let rules: AccessRuleSet = serde_json::from_value(serde_json::json!({
            "id": "office",
            "name": "Office",
            "mode": "whitelist",
            "entries": ["10.0.0.0/8", "2001:db8::/32"]
        }))
        .unwrap();
        assert!(rules.enabled);
        assert_eq!(rules.mode, AccessMode::Whitelist);
        assert!(rules.validate().is_ok());
    }

    #[test]
    fn test_wol_target_defaults() {
        let target: WolTarget = serde_json::from_value(serde_json::json!({
            "id": "nas",
            "name": "NAS",
            "mac_address": "AA:BB:CC:DD:EE:FF"
        }))
        .unwrap();
        assert_eq!(target.broadcast_ip, Ipv4Addr::BROADCAST);
        assert_eq!(target.port, 9);
        assert!(target.net_interface.is_none());
        assert!(target.validate().is_ok());
    }

    #[test]
    fn test_wol_target_validation() {
        let bad_mac = WolTarget::new("pc", "AA:BB:CC:DD:EE");
        assert!(matches!(bad_mac.validate(), Err(Error::Validation { .. })));

        let bad_port = WolTarget::new("pc", "AA-BB-CC-DD-EE-FF")
            .with_destination(Ipv4Addr::BROADCAST, 0);
        match bad_port.validate() {
            Err(Error::Validation { field, .. }) => assert_eq!(field, "port"),
            other => panic!("expected port error, got {:?}", other),
        }

        let blank_interface = WolTarget::new("pc", "aa:bb:cc:dd:ee:ff").with_interface("  ");
        assert!(blank_interface.validate().is_err());
    }

    #[test]
    fn test_credentials_require_reports_field() {
        let creds = Credentials::new().with("access_key_id", "LTAI123").with("access_key_secret", " ");
        assert!(creds.require("access_key_id").is_ok());
        match creds.require_all(ProviderKind::Alidns.required_fields()) {
            Err(Error::InvalidCredential { field }) => assert_eq!(field, "access_key_secret"),
            other => panic!("expected invalid credential, got {:?}", other),
        }
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::new().with("api_token", "super-secret-token-value");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("api_token"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("abcdefghijkl"), "abcd****");
        assert_eq!(mask_secret("short"), "****");
        assert_eq!(mask_secret(""), "****");
    }

    #[test]
    fn test_account_view_masks_secrets_only() {
        let account = ProviderAccount::new(
            "cf",
            ProviderKind::CloudflareOriginRule,
            Credentials::new()
                .with("api_token", "cf-token-1234567890")
                .with("zone_id", "zone-abc")
                .with("rule_id", "rule-xyz"),
        );
        let view = account.view();
        assert_eq!(view.credentials.get("api_token"), Some("cf-t****"));
        assert_eq!(view.credentials.get("zone_id"), Some("zone-abc"));
    }

    #[test]
    fn test_retain_secrets_from_stored() {
        let stored = Credentials::new()
            .with("token_id", "12345")
            .with("token", "dnspod-token-abcdef");

        // Secret echoed back masked keeps the stored value
        let mut echoed = Credentials::new()
            .with("token_id", "67890")
            .with("token", mask_secret("dnspod-token-abcdef"));
        echoed.retain_secrets_from(&stored, ProviderKind::Dnspod.secret_fields());
        assert_eq!(echoed.get("token"), Some("dnspod-token-abcdef"));
        assert_eq!(echoed.get("token_id"), Some("67890"));

        // Blank secret keeps the stored value
        let mut blank = Credentials::new().with("token_id", "12345").with("token", "");
        blank.retain_secrets_from(&stored, ProviderKind::Dnspod.secret_fields());
        assert_eq!(blank.get("token"), Some("dnspod-token-abcdef"));

        // A new secret replaces it
        let mut replaced = Credentials::new().with("token", "brand-new-token");
        replaced.retain_secrets_from(&stored, ProviderKind::Dnspod.secret_fields());
        assert_eq!(replaced.get("token"), Some("brand-new-token"));
    }

    #[test]
    fn test_provider_kind_shapes() {
        for kind in ProviderKind::ALL {
            let shape = kind.credential_shape();
            if kind.family() == ProviderFamily::DnsRegistrar {
                assert!(matches!(shape, CredentialShape::KeyPair | CredentialShape::Token));
            }
            assert!(!kind.required_fields().is_empty());
        }
        let kind: ProviderKind = serde_json::from_str("\"cloudflare_origin_rule\"").unwrap();
        assert_eq!(kind, ProviderKind::CloudflareOriginRule);
        assert_eq!(kind.to_string(), "cloudflare_origin_rule");
    }
}
