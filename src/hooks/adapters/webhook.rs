use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::context::{Operation, OperationConfig, QueryOptions, Record, RequestContext};
use crate::dispatcher::{RemoteResponse, ResponseEnvelope};
use crate::error::{AdapterError, ErrorBuilder, ErrorCode, Result};

use super::super::config::HookDefinition;
use super::super::types::{Hook, HookOutcome};

/// 签名请求头，值为 `sha256=<hex>`
pub const SIGNATURE_HEADER: &str = "x-hook-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct WebhookHookFactory {
    client: Client,
}

impl WebhookHookFactory {
    pub fn new() -> Result<Self> {
        let client = Client::builder().use_rustls_tls().build().map_err(|err| {
            ErrorBuilder::new(ErrorCode::ConfigurationError, "failed to build http client")
                .details(err.to_string())
                .build_error()
        })?;
        Ok(Self { client })
    }

    pub fn build_before(
        &self,
        def: &HookDefinition,
        endpoint: &str,
        secret: Option<String>,
        headers: HashMap<String, String>,
    ) -> Arc<dyn Hook<RequestContext>> {
        Arc::new(WebhookBeforeHook {
            target: self.target(def, endpoint, secret, headers),
        })
    }

    pub fn build_after(
        &self,
        def: &HookDefinition,
        endpoint: &str,
        secret: Option<String>,
        headers: HashMap<String, String>,
    ) -> Arc<dyn Hook<ResponseEnvelope>> {
        Arc::new(WebhookAfterHook {
            target: self.target(def, endpoint, secret, headers),
        })
    }

    fn target(
        &self,
        def: &HookDefinition,
        endpoint: &str,
        secret: Option<String>,
        headers: HashMap<String, String>,
    ) -> WebhookTarget {
        WebhookTarget {
            client: self.client.clone(),
            name: def.name.clone(),
            endpoint: endpoint.to_string(),
            secret,
            headers,
            static_metadata: def.metadata.clone(),
        }
    }
}

fn generate_signature(payload: &[u8], secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|err| {
        ErrorBuilder::new(ErrorCode::ConfigurationError, "invalid webhook secret")
            .details(err.to_string())
            .build_error()
    })?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[derive(Clone)]
struct WebhookTarget {
    client: Client,
    name: String,
    endpoint: String,
    secret: Option<String>,
    headers: HashMap<String, String>,
    static_metadata: HashMap<String, String>,
}

impl WebhookTarget {
    fn failure(&self, code: ErrorCode, message: &str, details: String) -> AdapterError {
        ErrorBuilder::new(code, message)
            .details(format!("hook={}, {details}", self.name))
            .build_error()
    }

    async fn call<T, R>(&self, payload: &T) -> Result<R>
    where
        T: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let body = serde_json::to_vec(payload).map_err(|err| {
            self.failure(
                ErrorCode::InvalidRequest,
                "failed to encode webhook payload",
                err.to_string(),
            )
        })?;

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json");
        if let Some(secret) = &self.secret {
            builder = builder.header(SIGNATURE_HEADER, generate_signature(&body, secret)?);
        }
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }

        let resp = builder.body(body).send().await.map_err(|err| {
            self.failure(
                ErrorCode::TransportError,
                "webhook request failed",
                err.to_string(),
            )
        })?;
        if !resp.status().is_success() {
            return Err(self.failure(
                ErrorCode::TransportError,
                "webhook returned error status",
                resp.status().to_string(),
            ));
        }

        resp.json::<R>().await.map_err(|err| {
            self.failure(
                ErrorCode::DeserializationError,
                "failed to decode webhook response",
                err.to_string(),
            )
        })
    }
}

#[derive(Deserialize)]
struct WebhookStatus {
    code: Option<String>,
    message: Option<String>,
}

fn rejection(status: Option<WebhookStatus>, code: ErrorCode, fallback: &str) -> AdapterError {
    match status {
        Some(status) => {
            let message = status.message.unwrap_or_else(|| fallback.to_string());
            let mut builder = ErrorBuilder::new(code, message);
            if let Some(detail) = status.code {
                builder = builder.details(detail);
            }
            builder.build_error()
        }
        None => ErrorBuilder::new(code, fallback).build_error(),
    }
}

#[derive(Serialize)]
struct BeforeWebhookRequest<'a> {
    hook: &'a str,
    request_id: String,
    operation: Operation,
    collection: &'a str,
    options: &'a QueryOptions,
    values: &'a [Record],
    config: &'a OperationConfig,
    metadata: &'a HashMap<String, String>,
}

#[derive(Deserialize)]
struct BeforeWebhookResponse {
    allow: bool,
    #[serde(default)]
    config: Option<OperationConfig>,
    #[serde(default)]
    options: Option<QueryOptions>,
    #[serde(default)]
    status: Option<WebhookStatus>,
}

/// 远程 before-hook：可拒绝调用，或回写 operation config / options
struct WebhookBeforeHook {
    target: WebhookTarget,
}

#[async_trait]
impl Hook<RequestContext> for WebhookBeforeHook {
    async fn handle(&self, ctx: &mut RequestContext) -> HookOutcome {
        let request = BeforeWebhookRequest {
            hook: &self.target.name,
            request_id: ctx.request_id.to_string(),
            operation: ctx.operation,
            collection: &ctx.collection,
            options: &ctx.options,
            values: &ctx.values,
            config: &ctx.config,
            metadata: &self.target.static_metadata,
        };

        let reply: BeforeWebhookResponse = match self.target.call(&request).await {
            Ok(reply) => reply,
            Err(err) => return HookOutcome::Abort(err),
        };

        if !reply.allow {
            return HookOutcome::Abort(rejection(
                reply.status,
                ErrorCode::HookRejected,
                "rejected by webhook",
            ));
        }
        if let Some(config) = reply.config {
            ctx.config.extend(config);
        }
        if let Some(options) = reply.options {
            ctx.options = options;
        }
        HookOutcome::Continue
    }
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    code: ErrorCode,
    message: &'a str,
}

#[derive(Serialize)]
struct AfterWebhookRequest<'a> {
    hook: &'a str,
    error: Option<ErrorPayload<'a>>,
    response: Option<&'a RemoteResponse>,
    metadata: &'a HashMap<String, String>,
}

#[derive(Deserialize)]
struct AfterWebhookResponse {
    #[serde(default = "default_allow")]
    allow: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    status: Option<WebhookStatus>,
}

fn default_allow() -> bool {
    true
}

/// 远程 after-hook：可拒绝结果，或替换响应数据
struct WebhookAfterHook {
    target: WebhookTarget,
}

#[async_trait]
impl Hook<ResponseEnvelope> for WebhookAfterHook {
    async fn handle(&self, envelope: &mut ResponseEnvelope) -> HookOutcome {
        let request = AfterWebhookRequest {
            hook: &self.target.name,
            error: envelope.error.as_ref().map(|err| ErrorPayload {
                code: err.code(),
                message: err.message(),
            }),
            response: envelope.response.as_ref(),
            metadata: &self.target.static_metadata,
        };

        let reply: AfterWebhookResponse = match self.target.call(&request).await {
            Ok(reply) => reply,
            Err(err) => return HookOutcome::Abort(err),
        };

        if !reply.allow {
            return HookOutcome::Abort(rejection(
                reply.status,
                ErrorCode::HookFailed,
                "response rejected by webhook",
            ));
        }
        if let Some(data) = reply.data {
            let status = envelope.response.as_ref().and_then(|resp| resp.status);
            envelope.response = Some(RemoteResponse {
                status,
                data: Some(data),
            });
        }
        HookOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, header_exists, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::ConnectionSettings;
    use crate::hooks::HookHandlerConfig;

    fn definition(endpoint: &str) -> HookDefinition {
        HookDefinition {
            name: "remote".into(),
            handler: HookHandlerConfig::Webhook {
                endpoint: endpoint.into(),
                secret: None,
                headers: HashMap::new(),
            },
            ..Default::default()
        }
    }

    fn context() -> RequestContext {
        RequestContext::new(
            Operation::Find,
            Arc::new(ConnectionSettings::default()),
            "user",
        )
    }

    #[test]
    fn signature_is_hex_hmac() {
        let signature = generate_signature(b"{}", "secret").unwrap();
        assert!(signature.starts_with("sha256="));
        assert_eq!(signature.len(), "sha256=".len() + 64);
        assert_eq!(signature, generate_signature(b"{}", "secret").unwrap());
        assert_ne!(signature, generate_signature(b"{}", "other").unwrap());
    }

    #[tokio::test]
    async fn before_hook_merges_config_and_signs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists(SIGNATURE_HEADER))
            .and(header("x-tenant", "acme"))
            .and(body_partial_json(json!({"operation": "find", "collection": "user"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "allow": true,
                "config": {"endpoint": "http://api/user"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HashMap::new();
        headers.insert("x-tenant".to_string(), "acme".to_string());
        let hook = WebhookHookFactory::new().unwrap().build_before(
            &definition(&server.uri()),
            &server.uri(),
            Some("secret".into()),
            headers,
        );

        let mut ctx = context();
        assert!(hook.handle(&mut ctx).await.is_continue());
        assert_eq!(ctx.endpoint(), Some("http://api/user"));
    }

    #[tokio::test]
    async fn before_hook_denial_aborts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "allow": false,
                "status": {"code": "FORBIDDEN", "message": "collection locked"}
            })))
            .mount(&server)
            .await;

        let hook = WebhookHookFactory::new().unwrap().build_before(
            &definition(&server.uri()),
            &server.uri(),
            None,
            HashMap::new(),
        );

        let mut ctx = context();
        match hook.handle(&mut ctx).await {
            HookOutcome::Abort(err) => {
                assert_eq!(err.code(), ErrorCode::HookRejected);
                assert_eq!(err.message(), "collection locked");
                assert_eq!(err.details(), Some("FORBIDDEN"));
            }
            HookOutcome::Continue => panic!("webhook denial must abort"),
        }
    }

    #[tokio::test]
    async fn after_hook_replaces_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"response": {"data": [{"id": 1}]}})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": 1, "seen": true}]})),
            )
            .mount(&server)
            .await;

        let hook = WebhookHookFactory::new().unwrap().build_after(
            &definition(&server.uri()),
            &server.uri(),
            None,
            HashMap::new(),
        );

        let mut envelope =
            ResponseEnvelope::success(RemoteResponse::with_data(json!([{"id": 1}])));
        assert!(hook.handle(&mut envelope).await.is_continue());
        assert_eq!(envelope.data(), Some(&json!([{"id": 1, "seen": true}])));
    }

    #[tokio::test]
    async fn unreachable_webhook_aborts_with_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let hook = WebhookHookFactory::new().unwrap().build_after(
            &definition(&server.uri()),
            &server.uri(),
            None,
            HashMap::new(),
        );

        let mut envelope = ResponseEnvelope::default();
        match hook.handle(&mut envelope).await {
            HookOutcome::Abort(err) => assert_eq!(err.code(), ErrorCode::TransportError),
            HookOutcome::Continue => panic!("failed webhook must abort"),
        }
    }
}
