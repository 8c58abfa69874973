//! 远端 CRM 客户端抽象
//!
//! 适配器只依赖 `RemoteClient`：对指定 domain / resource 执行具名远端操作，
//! 返回 `RemoteResult`（或传输错误）。

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{HttpMethod, QueryOptions, Record};
use crate::dispatcher::RemoteResponse;
use crate::error::{AdapterError, ErrorBuilder, ErrorCode, Result};

pub use http::HttpCrmClient;

/// 一次远端调用
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub domain: String,
    pub resource: String,
    pub operation: String,
    /// 默认 GET；写操作由执行器按逻辑操作设置
    pub method: HttpMethod,
    pub id: Option<String>,
    pub query: QueryOptions,
    pub body: Vec<Record>,
}

impl RemoteCall {
    pub fn new<D, R, O>(domain: D, resource: R, operation: O) -> Self
    where
        D: Into<String>,
        R: Into<String>,
        O: Into<String>,
    {
        Self {
            domain: domain.into(),
            resource: resource.into(),
            operation: operation.into(),
            method: HttpMethod::Get,
            id: None,
            query: QueryOptions::new(),
            body: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_id<T: Into<String>>(mut self, id: Option<T>) -> Self {
        self.id = id.map(Into::into);
        self
    }

    pub fn with_query(mut self, query: QueryOptions) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Vec<Record>) -> Self {
        self.body = body;
        self
    }
}

/// 远端调用结果；传输成功但业务失败时 `is_error()` 为真
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResult {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    error: bool,
}

impl RemoteResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            message: None,
            error: false,
        }
    }

    pub fn error<T: Into<String>>(message: T) -> Self {
        Self {
            data: Value::Null,
            message: Some(message.into()),
            error: true,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }

    /// 远端业务错误转换为适配器错误
    pub fn to_error(&self, call: &RemoteCall) -> AdapterError {
        ErrorBuilder::new(ErrorCode::RemoteError, self.message())
            .details(format!(
                "domain={}, resource={}, operation={}",
                call.domain, call.resource, call.operation
            ))
            .build_error()
    }

    pub fn into_response(self) -> RemoteResponse {
        RemoteResponse::with_data(self.data)
    }
}

#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn execute(&self, call: &RemoteCall) -> Result<RemoteResult>;
}
