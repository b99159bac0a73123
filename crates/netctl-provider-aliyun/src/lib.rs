// # Alibaba Cloud Providers
//
// This crate provides the Alibaba Cloud adapters for netctl:
//
// - [`AlidnsAdapter`]: Alibaba Cloud DNS (registrar account)
// - [`AliyunEsaAdapter`]: Edge Security Acceleration (edge API account)
//
// Both use the RPC-style API with signature version 1.0 (HMAC-SHA1).
//
// ## Signing
//
// 1. Collect the common and action parameters, sorted by name
// 2. Percent-encode names and values (RFC 3986 unreserved set kept)
// 3. `StringToSign = "GET&%2F&" + encode(canonical_query)`
// 4. `Signature = base64(HMAC-SHA1(AccessKeySecret + "&", StringToSign))`
//
// ## Security
//
// The AccessKey secret only feeds the HMAC. It is never sent, logged, or
// included in errors.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use netctl_core::config::{Credentials, ProviderKind};
use netctl_core::traits::{InvokeOutcome, Probe, ProviderAdapter};
use netctl_core::{Error, ProviderRegistry, Result};
use serde_json::Value;
use sha1::Sha1;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

type HmacSha1 = Hmac<Sha1>;

/// Alibaba Cloud DNS endpoint
pub const ALIDNS_ENDPOINT: &str = "https://alidns.aliyuncs.com";

/// ESA endpoint
pub const ESA_ENDPOINT: &str = "https://esa.cn-hangzhou.aliyuncs.com";

const ALIDNS_VERSION: &str = "2015-01-09";
const ESA_VERSION: &str = "2024-09-10";

/// Default HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Error codes meaning the AccessKey pair was rejected
const AUTH_ERROR_MARKERS: &[&str] = &["AccessKey", "Signature", "Forbidden"];

/// Signed RPC client for one product
#[derive(Debug, Clone)]
struct RpcApi {
    client: reqwest::Client,
    endpoint: String,
    version: &'static str,
    provider: &'static str,
}

impl RpcApi {
    fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        version: &'static str,
        provider: &'static str,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            version,
            provider,
        }
    }

    /// Sign and send one RPC call; returns the HTTP status and JSON body
    async fn call(
        &self,
        credentials: &Credentials,
        action: &str,
        extra: &[(&str, String)],
    ) -> Result<(u16, Value)> {
        let access_key_id = credentials.require("access_key_id")?;
        let access_key_secret = credentials.require("access_key_secret")?;

        let mut params = common_params(
            access_key_id,
            action,
            self.version,
            Utc::now(),
            uuid::Uuid::new_v4().to_string(),
        );
        for (key, value) in extra {
            params.insert((*key).to_string(), value.clone());
        }

        let query = canonical_query(&params);
        let signature = sign(access_key_secret, &query)?;
        let url = format!(
            "{}/?{}&Signature={}",
            self.endpoint,
            query,
            urlencoding::encode(&signature)
        );

        tracing::debug!("{} RPC {}", self.provider, action);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(self.provider, e))?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(rpc_error(self.provider, status.as_u16(), &text));
        }

        let body = serde_json::from_str(&text).map_err(|e| {
            Error::provider(self.provider, format!("Failed to parse response: {}", e))
        })?;
        Ok((status.as_u16(), body))
    }
}

/// Common RPC parameters, before the signature
fn common_params(
    access_key_id: &str,
    action: &str,
    version: &str,
    timestamp: DateTime<Utc>,
    nonce: String,
) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("Action".to_string(), action.to_string());
    params.insert("Format".to_string(), "JSON".to_string());
    params.insert("Version".to_string(), version.to_string());
    params.insert("AccessKeyId".to_string(), access_key_id.to_string());
    params.insert("SignatureMethod".to_string(), "HMAC-SHA1".to_string());
    params.insert(
        "Timestamp".to_string(),
        timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    );
    params.insert("SignatureVersion".to_string(), "1.0".to_string());
    params.insert("SignatureNonce".to_string(), nonce);
    params
}

/// Sorted, percent-encoded `name=value` pairs joined by `&`
fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn string_to_sign(canonical_query: &str) -> String {
    format!("GET&%2F&{}", urlencoding::encode(canonical_query))
}

fn sign(access_key_secret: &str, canonical_query: &str) -> Result<String> {
    let key = format!("{}&", access_key_secret);
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|_| Error::invalid_credential("access_key_secret"))?;
    mac.update(string_to_sign(canonical_query).as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Map an RPC error body (`{"Code": ..., "Message": ...}`)
fn rpc_error(provider: &str, status: u16, text: &str) -> Error {
    let body: Value = serde_json::from_str(text).unwrap_or(Value::Null);
    let code = body["Code"].as_str().unwrap_or_default();
    let message = body["Message"].as_str().unwrap_or_default();

    if AUTH_ERROR_MARKERS.iter().any(|marker| code.contains(marker)) {
        return Error::auth_rejected(provider, format!("{}: {}", code, message));
    }
    if code.is_empty() {
        let snippet: String = text.chars().take(200).collect();
        return Error::from_status(provider, status, &snippet);
    }
    Error::from_status(provider, status, &format!("{}: {}", code, message))
}

fn transport_error(provider: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(provider, DEFAULT_HTTP_TIMEOUT)
    } else {
        Error::unreachable(provider, e.without_url().to_string())
    }
}

fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Page size from an optional `page_size` payload field (1..=100)
fn page_size(payload: &Value, default: u64) -> Result<String> {
    match payload.get("page_size") {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(value) => value
            .as_u64()
            .filter(|size| (1..=100).contains(size))
            .map(|size| size.to_string())
            .ok_or_else(|| Error::validation("page_size", "must be between 1 and 100")),
    }
}

/// Alibaba Cloud DNS adapter
#[derive(Debug, Clone)]
pub struct AlidnsAdapter {
    api: RpcApi,
}

impl AlidnsAdapter {
    /// Create an adapter talking to the public endpoint
    pub fn new() -> Self {
        Self::with_endpoint(default_client(), ALIDNS_ENDPOINT)
    }

    /// Create an adapter with a custom client and endpoint
    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            api: RpcApi::new(client, endpoint, ALIDNS_VERSION, "alidns"),
        }
    }
}

impl Default for AlidnsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for AlidnsAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Alidns
    }

    async fn test_connection(&self, credentials: &Credentials) -> Result<Probe> {
        let started = Instant::now();
        let (_, body) = self
            .api
            .call(credentials, "DescribeDomains", &[("PageSize", "1".to_string())])
            .await?;

        Ok(Probe {
            provider: self.kind(),
            latency: started.elapsed(),
            detail: format!("{} domains", body["TotalCount"].as_u64().unwrap_or(0)),
        })
    }

    async fn invoke(
        &self,
        credentials: &Credentials,
        action: &str,
        payload: &Value,
    ) -> Result<InvokeOutcome> {
        match action {
            "list_domains" => {
                let size = page_size(payload, 100)?;
                let (status, body) = self
                    .api
                    .call(credentials, "DescribeDomains", &[("PageSize", size)])
                    .await?;
                Ok(InvokeOutcome {
                    provider: self.kind(),
                    action: action.to_string(),
                    status: Some(status),
                    body: body["Domains"]["Domain"].clone(),
                })
            }
            other => Err(Error::unsupported_action(self.provider_name(), other)),
        }
    }
}

/// Edge Security Acceleration adapter
#[derive(Debug, Clone)]
pub struct AliyunEsaAdapter {
    api: RpcApi,
}

impl AliyunEsaAdapter {
    /// Create an adapter talking to the public endpoint
    pub fn new() -> Self {
        Self::with_endpoint(default_client(), ESA_ENDPOINT)
    }

    /// Create an adapter with a custom client and endpoint
    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            api: RpcApi::new(client, endpoint, ESA_VERSION, "aliyun_esa"),
        }
    }
}

impl Default for AliyunEsaAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for AliyunEsaAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AliyunEsa
    }

    async fn test_connection(&self, credentials: &Credentials) -> Result<Probe> {
        let started = Instant::now();
        let (_, body) = self
            .api
            .call(credentials, "ListSites", &[("PageSize", "1".to_string())])
            .await?;

        Ok(Probe {
            provider: self.kind(),
            latency: started.elapsed(),
            detail: format!("{} sites", body["TotalCount"].as_u64().unwrap_or(0)),
        })
    }

    async fn invoke(
        &self,
        credentials: &Credentials,
        action: &str,
        payload: &Value,
    ) -> Result<InvokeOutcome> {
        match action {
            "list_sites" => {
                let size = page_size(payload, 100)?;
                let (status, body) = self
                    .api
                    .call(credentials, "ListSites", &[("PageSize", size)])
                    .await?;
                Ok(InvokeOutcome {
                    provider: self.kind(),
                    action: action.to_string(),
                    status: Some(status),
                    body: body["Sites"].clone(),
                })
            }
            other => Err(Error::unsupported_action(self.provider_name(), other)),
        }
    }
}

/// Register both Alibaba Cloud adapters with a registry
///
/// # Example
///
/// ```rust
/// use netctl_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// netctl_provider_aliyun::register(&registry);
/// ```
pub fn register(registry: &ProviderRegistry) {
    let client = default_client();
    registry.register(Arc::new(AlidnsAdapter::with_endpoint(
        client.clone(),
        ALIDNS_ENDPOINT,
    )));
    registry.register(Arc::new(AliyunEsaAdapter::with_endpoint(client, ESA_ENDPOINT)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use netctl_core::ErrorCategory;
    use serde_json::json;

    fn credentials() -> Credentials {
        Credentials::new()
            .with("access_key_id", "LTAItestid")
            .with("access_key_secret", "testsecret")
    }

    #[test]
    fn test_canonical_query_is_sorted_and_encoded() {
        let timestamp = Utc.with_ymd_and_hms(2016, 3, 24, 16, 41, 54).unwrap();
        let mut params = common_params(
            "testid",
            "DescribeDomains",
            ALIDNS_VERSION,
            timestamp,
            "f59ed6a9-83fc-473b-9cc6-99c95df3856e".to_string(),
        );
        params.insert("KeyWord".to_string(), "a b*~".to_string());

        let query = canonical_query(&params);
        assert_eq!(
            query,
            "AccessKeyId=testid&Action=DescribeDomains&Format=JSON&KeyWord=a%20b%2A~\
             &SignatureMethod=HMAC-SHA1&SignatureNonce=f59ed6a9-83fc-473b-9cc6-99c95df3856e\
             &SignatureVersion=1.0&Timestamp=2016-03-24T16%3A41%3A54Z&Version=2015-01-09"
        );
        assert!(string_to_sign(&query).starts_with("GET&%2F&AccessKeyId%3Dtestid%26Action%3D"));
    }

    #[test]
    fn test_signature_depends_on_secret() {
        let query = "AccessKeyId=testid&Action=DescribeDomains";
        let first = sign("testsecret", query).unwrap();
        let again = sign("testsecret", query).unwrap();
        let other = sign("othersecret", query).unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        // base64 of a 20-byte SHA-1 MAC
        assert_eq!(first.len(), 28);
    }

    #[test]
    fn test_auth_error_codes() {
        let err = rpc_error(
            "alidns",
            404,
            r#"{"Code":"InvalidAccessKeyId.NotFound","Message":"Specified access key is not found."}"#,
        );
        assert_eq!(err.category(), ErrorCategory::AuthRejected);

        let err = rpc_error(
            "alidns",
            400,
            r#"{"Code":"SignatureDoesNotMatch","Message":"mismatch"}"#,
        );
        assert_eq!(err.category(), ErrorCategory::AuthRejected);

        let err = rpc_error("alidns", 400, r#"{"Code":"Throttling.User","Message":"slow down"}"#);
        assert!(matches!(err, Error::Provider { .. }));
    }

    #[test]
    fn test_missing_secret_is_invalid_credential() {
        let adapter = AlidnsAdapter::new();
        let err = adapter
            .validate_credentials(&Credentials::new().with("access_key_id", "LTAItestid"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredential { ref field } if field == "access_key_secret"));
    }

    #[tokio::test]
    async fn test_alidns_probe_sends_signed_request() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/"))
            .and(wiremock::matchers::query_param("Action", "DescribeDomains"))
            .and(wiremock::matchers::query_param("Version", ALIDNS_VERSION))
            .and(wiremock::matchers::query_param("AccessKeyId", "LTAItestid"))
            .and(wiremock::matchers::query_param("PageSize", "1"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "RequestId": "req",
                "TotalCount": 3,
                "Domains": { "Domain": [] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = AlidnsAdapter::with_endpoint(reqwest::Client::new(), server.uri());
        let probe = adapter.test_connection(&credentials()).await.unwrap();
        assert_eq!(probe.detail, "3 domains");

        let requests = server.received_requests().await.unwrap();
        let url = requests[0].url.to_string();
        assert!(url.contains("Signature="));
        assert!(!url.contains("testsecret"), "secret must never be sent");
    }

    #[tokio::test]
    async fn test_esa_rejected_key() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::query_param("Action", "ListSites"))
            .respond_with(wiremock::ResponseTemplate::new(403).set_body_json(json!({
                "RequestId": "req",
                "Code": "InvalidAccessKeyId.Inactive",
                "Message": "The AccessKey is disabled."
            })))
            .mount(&server)
            .await;

        let adapter = AliyunEsaAdapter::with_endpoint(reqwest::Client::new(), server.uri());
        let err = adapter.test_connection(&credentials()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::AuthRejected);
    }

    #[tokio::test]
    async fn test_esa_list_sites() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::query_param("Action", "ListSites"))
            .and(wiremock::matchers::query_param("PageSize", "20"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "TotalCount": 1,
                "Sites": [{ "SiteName": "example.com" }]
            })))
            .mount(&server)
            .await;

        let adapter = AliyunEsaAdapter::with_endpoint(reqwest::Client::new(), server.uri());
        let outcome = adapter
            .invoke(&credentials(), "list_sites", &json!({"page_size": 20}))
            .await
            .unwrap();
        assert_eq!(outcome.body[0]["SiteName"], "example.com");

        let err = adapter
            .invoke(&credentials(), "list_sites", &json!({"page_size": 0}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_action() {
        let adapter = AlidnsAdapter::new();
        let err = adapter
            .invoke(&credentials(), "delete_domain", &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedAction { .. }));
    }

    #[test]
    fn test_register_both_kinds() {
        let registry = ProviderRegistry::new();
        register(&registry);
        assert!(registry.has_adapter(ProviderKind::Alidns));
        assert!(registry.has_adapter(ProviderKind::AliyunEsa));
    }
}
