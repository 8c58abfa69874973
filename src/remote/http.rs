use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Map, Value, json};

use crate::config::ConnectionSettings;
use crate::error::{ErrorBuilder, ErrorCode, Result};
use crate::transport::query_pairs;

use super::{RemoteCall, RemoteClient, RemoteResult};

/// 基于 reqwest 的 CRM JSON API 客户端
///
/// 请求地址为 `{base_url}/{domain}/private/json/{resource}/{operation}`，
/// 响应中的 `row[].FL[] {val, content}` 行会被展平为普通记录对象。
#[derive(Clone)]
pub struct HttpCrmClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpCrmClient {
    pub fn new<T: Into<String>>(base_url: T, auth_token: Option<String>) -> Result<Self> {
        let client = Client::builder().use_rustls_tls().build().map_err(|err| {
            ErrorBuilder::new(ErrorCode::ConfigurationError, "failed to build http client")
                .details(err.to_string())
                .build_error()
        })?;
        Ok(Self::with_client(client, base_url, auth_token))
    }

    pub fn with_client<T: Into<String>>(
        client: Client,
        base_url: T,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            auth_token,
        }
    }

    pub fn from_settings(settings: &ConnectionSettings) -> Result<Self> {
        Self::new(settings.base_url.clone(), settings.auth_token.clone())
    }

    fn url(&self, call: &RemoteCall) -> String {
        format!(
            "{}/{}/private/json/{}/{}",
            self.base_url.trim_end_matches('/'),
            call.domain,
            call.resource,
            call.operation
        )
    }
}

#[async_trait]
impl RemoteClient for HttpCrmClient {
    async fn execute(&self, call: &RemoteCall) -> Result<RemoteResult> {
        let url = self.url(call);

        let mut params: Vec<(String, String)> = Vec::new();
        if let Some(token) = &self.auth_token {
            params.push(("authtoken".into(), token.clone()));
        }
        params.push(("scope".into(), "crmapi".into()));
        if let Some(id) = &call.id {
            params.push(("id".into(), id.clone()));
        }
        params.extend(query_pairs(&call.query));

        let mut builder = self.client.request(Method::from(call.method), &url);
        if !call.body.is_empty() {
            builder = builder.json(&json!({ "data": call.body }));
        }

        tracing::debug!(
            resource = %call.resource,
            operation = %call.operation,
            method = call.method.as_str(),
            id = call.id.as_deref().unwrap_or(""),
            "executing remote call"
        );

        let resp = builder.query(&params).send().await.map_err(|err| {
            ErrorBuilder::new(ErrorCode::TransportError, "crm request failed")
                .details(err.to_string())
                .build_error()
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(
                ErrorBuilder::new(ErrorCode::TransportError, "crm returned error status")
                    .details(format!("url={url}, status={status}"))
                    .build_error(),
            );
        }

        let payload = resp.json::<Value>().await.map_err(|err| {
            ErrorBuilder::new(ErrorCode::DeserializationError, "invalid crm response")
                .details(err.to_string())
                .build_error()
        })?;

        Ok(parse_payload(call, &payload))
    }
}

fn parse_payload(call: &RemoteCall, payload: &Value) -> RemoteResult {
    let response = payload.get("response").unwrap_or(payload);

    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return RemoteResult::error(message);
    }

    if response.get("nodata").is_some() {
        return RemoteResult::ok(Value::Null);
    }

    let Some(result) = response.get("result") else {
        return RemoteResult::ok(response.clone());
    };

    match result.get(&call.resource).and_then(|module| module.get("row")) {
        Some(rows) => {
            let records = normalize_rows(rows);
            if call.id.is_some() {
                RemoteResult::ok(records.into_iter().next().unwrap_or(Value::Null))
            } else {
                RemoteResult::ok(Value::Array(records))
            }
        }
        None => RemoteResult::ok(result.clone()),
    }
}

fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn normalize_rows(rows: &Value) -> Vec<Value> {
    as_list(rows)
        .into_iter()
        .map(|row| match row.get("FL") {
            Some(fields) => {
                let mut record = Map::new();
                for field in as_list(fields) {
                    if let Some(name) = field.get("val").and_then(Value::as_str) {
                        let content = field.get("content").cloned().unwrap_or(Value::Null);
                        record.insert(name.to_string(), content);
                    }
                }
                Value::Object(record)
            }
            None => row.clone(),
        })
        .collect()
}
