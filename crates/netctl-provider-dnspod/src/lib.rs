// # DNSPod Provider
//
// DNSPod registrar adapter for netctl, using the legacy `dnsapi.cn` API
// with a `login_token` (token id + token).
//
// ## API Reference
//
// - Account details: POST `/User.Detail`
// - Domain list: POST `/Domain.List`
//
// Every call is a form POST carrying `login_token=ID,TOKEN&format=json`.
// DNSPod answers HTTP 200 for most failures; the outcome is in
// `status.code` ("1" means success).

use async_trait::async_trait;
use netctl_core::config::{Credentials, ProviderKind};
use netctl_core::traits::{InvokeOutcome, Probe, ProviderAdapter};
use netctl_core::{Error, ProviderRegistry, Result};
use serde_json::Value;
use std::time::{Duration, Instant};

/// DNSPod API base URL
pub const DNSPOD_API_BASE: &str = "https://dnsapi.cn";

/// Default HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Name used in errors and logs
const PROVIDER: &str = "dnspod";

/// DNSPod requires clients to identify themselves
const USER_AGENT: &str = concat!("netctl/", env!("CARGO_PKG_VERSION"));

/// `status.code` values meaning the login token was refused
const LOGIN_FAILURE_CODES: &[&str] = &["-1", "-7", "-8", "85", "10002"];

/// `status.code` answered by list methods when there is nothing to list
const EMPTY_LIST_CODE: &str = "9";

/// DNSPod adapter
#[derive(Debug, Clone)]
pub struct DnspodAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl DnspodAdapter {
    /// Create an adapter talking to the public API
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self::with_base_url(client, DNSPOD_API_BASE)
    }

    /// Create an adapter with a custom client and base URL
    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// POST one API method and check `status.code`
    ///
    /// With `empty_ok`, the "nothing to list" code counts as success.
    async fn call(
        &self,
        credentials: &Credentials,
        method: &str,
        empty_ok: bool,
    ) -> Result<(u16, Value)> {
        let login_token = format!(
            "{},{}",
            credentials.require("token_id")?,
            credentials.require("token")?
        );

        tracing::debug!("DNSPod {}", method);
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .form(&[("login_token", login_token.as_str()), ("format", "json")])
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let snippet: String = text.chars().take(200).collect();
            return Err(Error::from_status(PROVIDER, status.as_u16(), &snippet));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to parse response: {}", e)))?;
        check_status(&body, empty_ok)?;
        Ok((status.as_u16(), body))
    }
}

impl Default for DnspodAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for DnspodAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Dnspod
    }

    async fn test_connection(&self, credentials: &Credentials) -> Result<Probe> {
        let started = Instant::now();
        let (_, body) = self.call(credentials, "User.Detail", false).await?;

        let detail = match body["info"]["user"]["email"].as_str() {
            Some(email) => format!("logged in as {}", email),
            None => "login token accepted".to_string(),
        };
        Ok(Probe {
            provider: self.kind(),
            latency: started.elapsed(),
            detail,
        })
    }

    async fn invoke(
        &self,
        credentials: &Credentials,
        action: &str,
        _payload: &Value,
    ) -> Result<InvokeOutcome> {
        match action {
            "list_domains" => {
                let (status, body) = self.call(credentials, "Domain.List", true).await?;
                let domains = match &body["domains"] {
                    Value::Array(_) => body["domains"].clone(),
                    _ => Value::Array(Vec::new()),
                };
                Ok(InvokeOutcome {
                    provider: self.kind(),
                    action: action.to_string(),
                    status: Some(status),
                    body: domains,
                })
            }
            other => Err(Error::unsupported_action(PROVIDER, other)),
        }
    }
}

fn check_status(body: &Value, empty_ok: bool) -> Result<()> {
    let code = match &body["status"]["code"] {
        Value::String(code) => code.clone(),
        Value::Number(code) => code.to_string(),
        _ => return Err(Error::provider(PROVIDER, "Invalid response format: status.code missing")),
    };
    if code == "1" || (empty_ok && code == EMPTY_LIST_CODE) {
        return Ok(());
    }

    let message = body["status"]["message"].as_str().unwrap_or("unknown error");
    if LOGIN_FAILURE_CODES.contains(&code.as_str()) {
        Err(Error::auth_rejected(PROVIDER, format!("{} ({})", message, code)))
    } else {
        Err(Error::provider(PROVIDER, format!("{} ({})", message, code)))
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(PROVIDER, DEFAULT_HTTP_TIMEOUT)
    } else {
        Error::unreachable(PROVIDER, e.without_url().to_string())
    }
}

/// Register the DNSPod adapter with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register(std::sync::Arc::new(DnspodAdapter::new()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use netctl_core::ErrorCategory;
    use serde_json::json;

    fn credentials() -> Credentials {
        Credentials::new()
            .with("token_id", "13490")
            .with("token", "6b5976c68aba5b14a0558b77c17c3932")
    }

    #[tokio::test]
    async fn test_login_token_accepted() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/User.Detail"))
            .and(wiremock::matchers::body_string_contains(
                "login_token=13490%2C6b5976c68aba5b14a0558b77c17c3932",
            ))
            .and(wiremock::matchers::body_string_contains("format=json"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "status": { "code": "1", "message": "Action completed successful" },
                "info": { "user": { "email": "ops@example.com" } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = DnspodAdapter::with_base_url(reqwest::Client::new(), server.uri());
        let probe = adapter.test_connection(&credentials()).await.unwrap();
        assert_eq!(probe.detail, "logged in as ops@example.com");
    }

    #[tokio::test]
    async fn test_login_failure_is_auth_rejected() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/User.Detail"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "status": { "code": "-1", "message": "Login fail, please check login info" }
            })))
            .mount(&server)
            .await;

        let adapter = DnspodAdapter::with_base_url(reqwest::Client::new(), server.uri());
        let err = adapter.test_connection(&credentials()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::AuthRejected);
    }

    #[tokio::test]
    async fn test_list_domains() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/Domain.List"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "status": { "code": "1", "message": "ok" },
                "domains": [{ "id": 1, "name": "example.com" }]
            })))
            .mount(&server)
            .await;

        let adapter = DnspodAdapter::with_base_url(reqwest::Client::new(), server.uri());
        let outcome = adapter
            .invoke(&credentials(), "list_domains", &Value::Null)
            .await
            .unwrap();
        assert_eq!(outcome.body[0]["name"], "example.com");
    }

    #[tokio::test]
    async fn test_list_domains_on_empty_account() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/Domain.List"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "status": { "code": "9", "message": "No domains" }
            })))
            .mount(&server)
            .await;

        let adapter = DnspodAdapter::with_base_url(reqwest::Client::new(), server.uri());
        let outcome = adapter
            .invoke(&credentials(), "list_domains", &Value::Null)
            .await
            .unwrap();
        assert_eq!(outcome.body, json!([]));
        assert_eq!(outcome.status, Some(200));
    }

    #[test]
    fn test_other_status_codes() {
        assert!(check_status(&json!({"status": {"code": 1}}), false).is_ok());
        assert!(check_status(&json!({"status": {"code": "9"}}), true).is_ok());
        assert!(matches!(
            check_status(&json!({"status": {"code": "9", "message": "no domains"}}), false),
            Err(Error::Provider { .. })
        ));
        assert!(matches!(
            check_status(&json!({"status": {"code": "6", "message": "bad domain id"}}), true),
            Err(Error::Provider { .. })
        ));
        assert!(matches!(check_status(&json!({}), false), Err(Error::Provider { .. })));
    }

    #[test]
    fn test_requires_token_pair() {
        let adapter = DnspodAdapter::new();
        let err = adapter
            .validate_credentials(&Credentials::new().with("token_id", "13490"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredential { ref field } if field == "token"));
    }

    #[test]
    fn test_register() {
        let registry = ProviderRegistry::new();
        register(&registry);
        assert!(registry.has_adapter(ProviderKind::Dnspod));
    }
}
