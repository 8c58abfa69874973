//! HTTP 请求发送
//!
//! `HttpTransport` 负责把 before-hook 构造好的 `PreparedRequest` 发出去，
//! 并把结果包装为 `ResponseEnvelope`。非 2xx 视为错误，但保留响应体供
//! after-hook 检查。

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;

use crate::context::{HttpMethod, PreparedRequest, QueryOptions};
use crate::dispatcher::{RemoteResponse, ResponseEnvelope};
use crate::error::{ErrorBuilder, ErrorCode, Result};

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: PreparedRequest) -> ResponseEnvelope;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder().use_rustls_tls().build().map_err(|err| {
            ErrorBuilder::new(ErrorCode::ConfigurationError, "failed to build http client")
                .details(err.to_string())
                .build_error()
        })?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl From<HttpMethod> for Method {
    fn from(value: HttpMethod) -> Self {
        match value {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// 查询参数展平：字符串原样，其它值按 JSON 文本
pub(crate) fn query_pairs(query: &QueryOptions) -> Vec<(String, String)> {
    query
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// 响应体解析：空体为 `None`，非 JSON 文本按字符串保留
pub(crate) fn decode_body(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(String::from_utf8_lossy(bytes).into_owned())),
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: PreparedRequest) -> ResponseEnvelope {
        let method = Method::from(request.method);
        let mut builder = self.client.request(method, &request.endpoint);
        if !request.query.is_empty() {
            builder = builder.query(&query_pairs(&request.query));
        }
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(endpoint = %request.endpoint, error = %err, "http request failed");
                return ResponseEnvelope::failure(
                    ErrorBuilder::new(ErrorCode::TransportError, "http request failed")
                        .details(err.to_string())
                        .build_error(),
                );
            }
        };

        let status = resp.status();
        let data = match resp.bytes().await {
            Ok(bytes) => decode_body(&bytes),
            Err(err) => {
                return ResponseEnvelope::failure(
                    ErrorBuilder::new(ErrorCode::TransportError, "failed to read response body")
                        .details(err.to_string())
                        .build_error(),
                );
            }
        };
        let response = RemoteResponse {
            status: Some(status.as_u16()),
            data,
        };

        if status.is_success() {
            ResponseEnvelope::success(response)
        } else {
            let error = ErrorBuilder::new(ErrorCode::TransportError, "remote returned error status")
                .details(format!("endpoint={}, status={status}", request.endpoint))
                .build_error();
            ResponseEnvelope::new(Some(error), Some(response))
        }
    }
}
