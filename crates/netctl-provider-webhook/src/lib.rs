// # Webhook Callback Provider
//
// This crate provides the webhook (callback channel) adapter for netctl.
//
// A webhook account is an arbitrary HTTP endpoint the console calls when
// an action fires, such as a chat bot or a home-automation hook.
//
// ## Credentials
//
// - `url` (required): `http://` or `https://` endpoint
// - `method`: GET, POST, PUT, PATCH, DELETE or HEAD (default POST)
// - `headers`: one `Name: Value` pair per line
// - `body`: request body template; `{{key}}` is replaced by `payload.key`.
//   Ignored for GET and HEAD. In a JSON template (one starting with `{` or
//   `[`) string values are JSON-escaped.
//
// ## Behavior
//
// - Connectivity test: `HEAD url`, falling back to `GET` when the endpoint
//   answers 405. Any answer below 500 other than 401/403 counts as
//   reachable; the endpoint exists even if it dislikes an empty HEAD.
// - Action `send`: one request with the configured method, headers and
//   rendered body. Non-2xx answers are errors carrying the status.
// - One attempt per call. No retries.
//
// ## Security
//
// The URL may embed a token, so it never appears in logs.

use async_trait::async_trait;
use netctl_core::config::{Credentials, ProviderKind};
use netctl_core::traits::{InvokeOutcome, Probe, ProviderAdapter};
use netctl_core::{Error, ProviderRegistry, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Default HTTP timeout for callback requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout, shorter so a dead host fails fast
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Methods a webhook may be configured with
const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

/// Name used in errors and logs
const PROVIDER: &str = "webhook";

/// Webhook callback adapter
#[derive(Debug, Clone)]
pub struct WebhookAdapter {
    /// Shared HTTP client
    client: reqwest::Client,
}

impl WebhookAdapter {
    /// Create an adapter with its own HTTP client
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_client(client)
    }

    /// Create an adapter sharing an existing HTTP client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn probe(&self, method: Method, url: Url) -> Result<reqwest::StatusCode> {
        let response = self
            .client
            .request(method, url)
            .send()
            .await
            .map_err(transport_error)?;
        Ok(response.status())
    }

    async fn send(&self, credentials: &Credentials, payload: &Value) -> Result<InvokeOutcome> {
        let url = parse_url(credentials)?;
        let method = parse_method(credentials)?;
        let headers = parse_headers(credentials)?;

        let mut request = self.client.request(method.clone(), url).headers(headers);
        if method != Method::GET && method != Method::HEAD {
            match credentials.get("body") {
                Some(template) => request = request.body(render_template(template, payload)),
                None if !payload.is_null() => request = request.json(payload),
                None => {}
            }
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::warn!("Webhook answered {}", status);
            return Err(Error::from_status(PROVIDER, status.as_u16(), &text));
        }

        tracing::info!("Webhook delivered ({} {})", method, status);
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(InvokeOutcome {
            provider: ProviderKind::Webhook,
            action: "send".to_string(),
            status: Some(status.as_u16()),
            body,
        })
    }
}

impl Default for WebhookAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for WebhookAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Webhook
    }

    fn validate_credentials(&self, credentials: &Credentials) -> Result<()> {
        credentials.require_all(self.kind().required_fields())?;
        parse_url(credentials)?;
        parse_method(credentials)?;
        parse_headers(credentials)?;
        Ok(())
    }

    async fn test_connection(&self, credentials: &Credentials) -> Result<Probe> {
        let url = parse_url(credentials)?;
        let started = Instant::now();

        let mut status = self.probe(Method::HEAD, url.clone()).await?;
        if status == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            tracing::debug!("Webhook rejects HEAD, probing with GET");
            status = self.probe(Method::GET, url).await?;
        }

        let code = status.as_u16();
        if matches!(code, 401 | 403) || status.is_server_error() {
            return Err(Error::from_status(PROVIDER, code, ""));
        }

        Ok(Probe {
            provider: self.kind(),
            latency: started.elapsed(),
            detail: format!("endpoint answered HTTP {}", code),
        })
    }

    async fn invoke(
        &self,
        credentials: &Credentials,
        action: &str,
        payload: &Value,
    ) -> Result<InvokeOutcome> {
        match action {
            "send" => self.send(credentials, payload).await,
            other => Err(Error::unsupported_action(PROVIDER, other)),
        }
    }
}

fn parse_url(credentials: &Credentials) -> Result<Url> {
    let url = Url::parse(credentials.require("url")?)
        .map_err(|_| Error::invalid_credential("url"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(Error::invalid_credential("url")),
    }
}

fn parse_method(credentials: &Credentials) -> Result<Method> {
    let Some(method) = credentials.get("method") else {
        return Ok(Method::POST);
    };
    let method = method.to_ascii_uppercase();
    if !ALLOWED_METHODS.contains(&method.as_str()) {
        return Err(Error::invalid_credential("method"));
    }
    Method::from_bytes(method.as_bytes()).map_err(|_| Error::invalid_credential("method"))
}

fn parse_headers(credentials: &Credentials) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let Some(text) = credentials.get("headers") else {
        return Ok(headers);
    };

    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::invalid_credential("headers"))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| Error::invalid_credential("headers"))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| Error::invalid_credential("headers"))?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// Replace `{{key}}` placeholders with payload fields
///
/// Strings are inserted raw, other values as JSON. Unknown keys render empty.
/// Inside a JSON template strings are escaped for a JSON string literal.
fn render_template(template: &str, payload: &Value) -> String {
    let json = matches!(template.trim_start().chars().next(), Some('{' | '['));
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start + 2..].find("}}") else {
            break;
        };
        rendered.push_str(&rest[..start]);
        let key = rest[start + 2..start + 2 + end].trim();
        match payload.get(key) {
            Some(Value::String(s)) if json => {
                let quoted = Value::String(s.clone()).to_string();
                rendered.push_str(&quoted[1..quoted.len() - 1]);
            }
            Some(Value::String(s)) => rendered.push_str(s),
            Some(Value::Null) | None => {}
            Some(other) => rendered.push_str(&other.to_string()),
        }
        rest = &rest[start + 2 + end + 2..];
    }
    rendered.push_str(rest);
    rendered
}

fn transport_error(e: reqwest::Error) -> Error {
    // Strip the URL: it may carry a token
    let e = e.without_url();
    if e.is_timeout() {
        Error::timeout(PROVIDER, DEFAULT_HTTP_TIMEOUT)
    } else {
        Error::unreachable(PROVIDER, e.to_string())
    }
}

/// Register the webhook adapter with a registry
///
/// # Example
///
/// ```rust
/// use netctl_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// netctl_provider_webhook::register(&registry);
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register(std::sync::Arc::new(WebhookAdapter::new()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use netctl_core::ErrorCategory;
    use serde_json::json;

    fn hook(url: &str) -> Credentials {
        Credentials::new().with("url", url)
    }

    #[test]
    fn test_validate_url() {
        let adapter = WebhookAdapter::new();

        assert!(adapter
            .validate_credentials(&hook("https://hooks.example.com/x"))
            .is_ok());

        for bad in [Credentials::new(), hook("  "), hook("ftp://example.com"), hook("not a url")] {
            let err = adapter.validate_credentials(&bad).unwrap_err();
            assert!(
                matches!(err, Error::InvalidCredential { ref field } if field == "url"),
                "{:?}",
                err
            );
        }
    }

    #[test]
    fn test_validate_method_and_headers() {
        let adapter = WebhookAdapter::new();

        let ok = hook("http://localhost/x")
            .with("method", "put")
            .with("headers", "X-Token: abc\n\nContent-Type: text/plain");
        assert!(adapter.validate_credentials(&ok).is_ok());

        let err = adapter
            .validate_credentials(&hook("http://localhost/x").with("method", "CONNECT"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredential { ref field } if field == "method"));

        let err = adapter
            .validate_credentials(&hook("http://localhost/x").with("headers", "no separator"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredential { ref field } if field == "headers"));
    }

    #[test]
    fn test_render_template() {
        let payload = json!({"name": "nas", "port": 8443, "missing": null});
        assert_eq!(
            render_template("{{name}} now on {{ port }}{{missing}}{{absent}}!", &payload),
            "nas now on 8443!"
        );
        assert_eq!(render_template("no placeholders", &payload), "no placeholders");
        assert_eq!(render_template("dangling {{name", &payload), "dangling {{name");
    }

    #[test]
    fn test_render_json_template_escapes_strings() {
        let payload = json!({"msg": "say \"hi\"\nbye", "port": 8443});
        let rendered = render_template(r#"{"text": "{{msg}}", "port": {{port}}}"#, &payload);

        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["text"], "say \"hi\"\nbye");
        assert_eq!(parsed["port"], 8443);
    }

    #[tokio::test]
    async fn test_connection_head_ok() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("HEAD"))
            .and(wiremock::matchers::path("/hook"))
            .respond_with(wiremock::ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = WebhookAdapter::new();
        let probe = adapter
            .test_connection(&hook(&format!("{}/hook", server.uri())))
            .await
            .unwrap();
        assert_eq!(probe.provider, ProviderKind::Webhook);
        assert!(probe.detail.contains("204"));
    }

    #[tokio::test]
    async fn test_connection_falls_back_to_get() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("HEAD"))
            .respond_with(wiremock::ResponseTemplate::new(405))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = WebhookAdapter::new();
        assert!(adapter.test_connection(&hook(&server.uri())).await.is_ok());
    }

    #[tokio::test]
    async fn test_connection_auth_and_server_errors() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/denied"))
            .respond_with(wiremock::ResponseTemplate::new(403))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::path("/broken"))
            .respond_with(wiremock::ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let adapter = WebhookAdapter::new();
        let err = adapter
            .test_connection(&hook(&format!("{}/denied", server.uri())))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::AuthRejected);

        let err = adapter
            .test_connection(&hook(&format!("{}/broken", server.uri())))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
    }

    #[tokio::test]
    async fn test_connection_unreachable() {
        let closed = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let adapter = WebhookAdapter::new();
        let err = adapter
            .test_connection(&hook(&format!("http://{}/hook", closed)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unreachable { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_send_renders_body_and_headers() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("PUT"))
            .and(wiremock::matchers::path("/notify"))
            .and(wiremock::matchers::header("x-token", "abc"))
            .and(wiremock::matchers::body_string("host nas woke"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let credentials = hook(&format!("{}/notify", server.uri()))
            .with("method", "PUT")
            .with("headers", "X-Token: abc")
            .with("body", "host {{host}} woke");

        let adapter = WebhookAdapter::new();
        let outcome = adapter
            .invoke(&credentials, "send", &json!({"host": "nas"}))
            .await
            .unwrap();
        assert_eq!(outcome.status, Some(200));
        assert_eq!(outcome.body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_send_get_ignores_body_template() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(|request: &wiremock::Request| request.body.is_empty())
            .respond_with(wiremock::ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let credentials = hook(&server.uri())
            .with("method", "GET")
            .with("body", "host {{host}} woke");

        let adapter = WebhookAdapter::new();
        let outcome = adapter
            .invoke(&credentials, "send", &json!({"host": "nas"}))
            .await
            .unwrap();
        assert_eq!(outcome.status, Some(200));
    }

    #[tokio::test]
    async fn test_send_without_template_posts_payload() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::body_json(json!({"event": "wake"})))
            .respond_with(wiremock::ResponseTemplate::new(202).set_body_string("queued"))
            .mount(&server)
            .await;

        let adapter = WebhookAdapter::new();
        let outcome = adapter
            .invoke(&hook(&server.uri()), "send", &json!({"event": "wake"}))
            .await
            .unwrap();
        assert_eq!(outcome.status, Some(202));
        assert_eq!(outcome.body, json!("queued"));
    }

    #[tokio::test]
    async fn test_send_non_success_is_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let adapter = WebhookAdapter::new();
        let err = adapter
            .invoke(&hook(&server.uri()), "send", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_action() {
        let adapter = WebhookAdapter::new();
        let err = adapter
            .invoke(&hook("http://localhost/x"), "delete_everything", &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedAction { .. }));
    }

    #[test]
    fn test_register() {
        let registry = ProviderRegistry::new();
        register(&registry);
        assert!(registry.has_adapter(ProviderKind::Webhook));
    }
}
