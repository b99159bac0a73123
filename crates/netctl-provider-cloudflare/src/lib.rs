// # Cloudflare Providers
//
// This crate provides the Cloudflare adapters for netctl:
//
// - [`CloudflareOriginRuleAdapter`]: an origin rule whose destination port
//   the console rewrites when a home service moves (CDN origin port)
// - [`CloudflareDnsAdapter`]: a token-only DNS registrar account
//
// ## Constraints
//
// - One HTTP request per operation step, no retries
// - The API token is passed per call and never logged
// - Errors keep the "credentials rejected" and "could not reach" cases
//   apart (401/403 → `AuthRejected`, transport → `Unreachable`/`Timeout`)
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - Verify token: GET `/user/tokens/verify`
// - List zones: GET `/zones`
// - Origin rules entrypoint: GET `/zones/:zone_id/rulesets/phases/http_request_origin/entrypoint`
// - Update a rule: PATCH `/zones/:zone_id/rulesets/:ruleset_id/rules/:rule_id`

use async_trait::async_trait;
use netctl_core::config::{Credentials, ProviderKind};
use netctl_core::traits::{InvokeOutcome, Probe, ProviderAdapter};
use netctl_core::{Error, ProviderRegistry, Result};
use reqwest::Method;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Name used in errors and logs
const PROVIDER: &str = "cloudflare";

/// Thin Cloudflare API v4 client shared by both adapters
#[derive(Debug, Clone)]
struct CloudflareApi {
    client: reqwest::Client,
    base_url: String,
}

impl CloudflareApi {
    fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Send one request and unwrap the v4 envelope
    ///
    /// Returns the HTTP status and the `result` member.
    async fn call(
        &self,
        method: Method,
        path: &str,
        api_token: &str,
        body: Option<&Value>,
    ) -> Result<(u16, Value)> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("Cloudflare {} {}", method, path);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(api_token)
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(Error::from_status(PROVIDER, status.as_u16(), &api_errors(&text)));
        }

        let envelope: Value = serde_json::from_str(&text).map_err(|e| {
            Error::provider(PROVIDER, format!("Failed to parse response: {}", e))
        })?;
        if envelope["success"] == Value::Bool(false) {
            return Err(Error::provider(PROVIDER, api_errors(&text)));
        }

        Ok((status.as_u16(), envelope["result"].clone()))
    }
}

/// Origin rule adapter (CDN origin port)
#[derive(Debug, Clone)]
pub struct CloudflareOriginRuleAdapter {
    api: CloudflareApi,
}

impl CloudflareOriginRuleAdapter {
    /// Create an adapter talking to the public API
    pub fn new() -> Self {
        Self::with_base_url(default_client(), CLOUDFLARE_API_BASE)
    }

    /// Create an adapter with a custom client and base URL
    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            api: CloudflareApi::new(client, base_url),
        }
    }

    /// Fetch the origin-phase entrypoint ruleset and the configured rule
    ///
    /// Returns `(ruleset_id, rule)`.
    async fn find_rule(&self, credentials: &Credentials) -> Result<(String, Value)> {
        let token = credentials.require("api_token")?;
        let zone_id = path_id(credentials, "zone_id")?;
        let rule_id = path_id(credentials, "rule_id")?;

        let (_, ruleset) = self
            .api
            .call(
                Method::GET,
                &format!(
                    "/zones/{}/rulesets/phases/http_request_origin/entrypoint",
                    zone_id
                ),
                token,
                None,
            )
            .await?;

        let ruleset_id = ruleset["id"]
            .as_str()
            .filter(|id| is_path_safe(id))
            .ok_or_else(|| Error::provider(PROVIDER, "Invalid response format: ruleset.id missing"))?
            .to_string();

        let rule = ruleset["rules"]
            .as_array()
            .and_then(|rules| rules.iter().find(|rule| rule["id"] == rule_id))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Origin rule not found: {}", rule_id)))?;

        Ok((ruleset_id, rule))
    }

    async fn set_origin_port(
        &self,
        credentials: &Credentials,
        payload: &Value,
    ) -> Result<InvokeOutcome> {
        let port = payload["port"]
            .as_u64()
            .and_then(|port| u16::try_from(port).ok())
            .filter(|port| *port != 0)
            .ok_or_else(|| Error::validation("port", "must be between 1 and 65535"))?;

        let (ruleset_id, rule) = self.find_rule(credentials).await?;
        let token = credentials.require("api_token")?;
        let zone_id = path_id(credentials, "zone_id")?;
        let rule_id = path_id(credentials, "rule_id")?;

        let update = json!({
            "id": rule_id,
            "action": "route",
            "expression": rule["expression"],
            "description": rule["description"],
            "enabled": rule["enabled"],
            "action_parameters": {
                "origin": { "port": port }
            }
        });

        let (status, result) = self
            .api
            .call(
                Method::PATCH,
                &format!("/zones/{}/rulesets/{}/rules/{}", zone_id, ruleset_id, rule_id),
                token,
                Some(&update),
            )
            .await?;

        tracing::info!("Origin rule {} now routes to port {}", rule_id, port);
        Ok(InvokeOutcome {
            provider: self.kind(),
            action: "set_origin_port".to_string(),
            status: Some(status),
            body: result,
        })
    }
}

impl Default for CloudflareOriginRuleAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for CloudflareOriginRuleAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CloudflareOriginRule
    }

    fn validate_credentials(&self, credentials: &Credentials) -> Result<()> {
        credentials.require_all(self.kind().required_fields())?;
        path_id(credentials, "zone_id")?;
        path_id(credentials, "rule_id")?;
        Ok(())
    }

    async fn test_connection(&self, credentials: &Credentials) -> Result<Probe> {
        let started = Instant::now();
        let (_, rule) = self.find_rule(credentials).await?;

        let detail = match rule["action_parameters"]["origin"]["port"].as_u64() {
            Some(port) => format!("origin rule found, port {}", port),
            None => "origin rule found".to_string(),
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
        payload: &Value,
    ) -> Result<InvokeOutcome> {
        match action {
            "get_rule" => {
                let (_, rule) = self.find_rule(credentials).await?;
                Ok(InvokeOutcome {
                    provider: self.kind(),
                    action: action.to_string(),
                    status: Some(200),
                    body: rule,
                })
            }
            "set_origin_port" => self.set_origin_port(credentials, payload).await,
            other => Err(Error::unsupported_action(self.provider_name(), other)),
        }
    }
}

/// DNS registrar adapter (API token only)
#[derive(Debug, Clone)]
pub struct CloudflareDnsAdapter {
    api: CloudflareApi,
}

impl CloudflareDnsAdapter {
    /// Create an adapter talking to the public API
    pub fn new() -> Self {
        Self::with_base_url(default_client(), CLOUDFLARE_API_BASE)
    }

    /// Create an adapter with a custom client and base URL
    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            api: CloudflareApi::new(client, base_url),
        }
    }
}

impl Default for CloudflareDnsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for CloudflareDnsAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CloudflareDns
    }

    async fn test_connection(&self, credentials: &Credentials) -> Result<Probe> {
        let token = credentials.require("api_token")?;
        let started = Instant::now();

        let (_, result) = self
            .api
            .call(Method::GET, "/user/tokens/verify", token, None)
            .await?;

        match result["status"].as_str() {
            Some("active") => Ok(Probe {
                provider: self.kind(),
                latency: started.elapsed(),
                detail: "token active".to_string(),
            }),
            Some(other) => Err(Error::auth_rejected(
                PROVIDER,
                format!("token status is {}", other),
            )),
            None => Err(Error::provider(
                PROVIDER,
                "Invalid response format: token status missing",
            )),
        }
    }

    async fn invoke(
        &self,
        credentials: &Credentials,
        action: &str,
        _payload: &Value,
    ) -> Result<InvokeOutcome> {
        match action {
            "list_zones" => {
                let token = credentials.require("api_token")?;
                let (status, zones) = self
                    .api
                    .call(Method::GET, "/zones?per_page=50", token, None)
                    .await?;
                Ok(InvokeOutcome {
                    provider: self.kind(),
                    action: action.to_string(),
                    status: Some(status),
                    body: zones,
                })
            }
            other => Err(Error::unsupported_action(self.provider_name(), other)),
        }
    }
}

fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Read an id that is spliced into the URL path
fn path_id<'a>(credentials: &'a Credentials, field: &str) -> Result<&'a str> {
    let value = credentials.require(field)?;
    if is_path_safe(value) {
        Ok(value)
    } else {
        Err(Error::invalid_credential(field))
    }
}

/// Cloudflare ids are hex; allow the id alphabet and nothing that reshapes a path
fn is_path_safe(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Flatten the `errors` array of a v4 envelope into one message
fn api_errors(text: &str) -> String {
    let messages: Vec<String> = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|body| body["errors"].as_array().cloned())
        .unwrap_or_default()
        .iter()
        .map(|e| match e["code"].as_u64() {
            Some(code) => format!("{} ({})", e["message"].as_str().unwrap_or("unknown"), code),
            None => e["message"].as_str().unwrap_or("unknown").to_string(),
        })
        .collect();

    if messages.is_empty() {
        text.chars().take(200).collect()
    } else {
        messages.join("; ")
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(PROVIDER, DEFAULT_HTTP_TIMEOUT)
    } else {
        Error::unreachable(PROVIDER, e.without_url().to_string())
    }
}

/// Register both Cloudflare adapters with a registry
///
/// # Example
///
/// ```rust
/// use netctl_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// netctl_provider_cloudflare::register(&registry);
/// ```
pub fn register(registry: &ProviderRegistry) {
    let client = default_client();
    registry.register(Arc::new(CloudflareOriginRuleAdapter::with_base_url(
        client.clone(),
        CLOUDFLARE_API_BASE,
    )));
    registry.register(Arc::new(CloudflareDnsAdapter::with_base_url(
        client,
        CLOUDFLARE_API_BASE,
    )));
}
