//! 单次调用的请求上下文
//!
//! `RequestContext` 在 before-hook 链中逐个传递，每个 Hook 依次独占修改；
//! 调用结束即丢弃，不在调用之间共享。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::ConnectionSettings;
use crate::error::{ErrorBuilder, ErrorCode, Result};

/// 单条记录
pub type Record = Value;
/// 查询选项（where / sort / limit 等），键唯一
pub type QueryOptions = Map<String, Value>;
/// 请求构建状态，由 before-hook 逐步填充
pub type OperationConfig = Map<String, Value>;

/// 约定的 endpoint 键，第一个 before-hook 负责写入
pub const ENDPOINT_KEY: &str = "endpoint";
/// 可选的 HTTP 方法键
pub const METHOD_KEY: &str = "method";

/// ORM 侧的逻辑操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Find,
    Create,
    Update,
    Destroy,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Find => "find",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Destroy => "destroy",
        }
    }

    pub fn default_method(&self) -> HttpMethod {
        match self {
            Operation::Find => HttpMethod::Get,
            Operation::Create => HttpMethod::Post,
            Operation::Update => HttpMethod::Put,
            Operation::Destroy => HttpMethod::Delete,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// 可直接发送的请求描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub endpoint: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query: QueryOptions,
    #[serde(default)]
    pub body: Option<Value>,
}

impl PreparedRequest {
    pub fn new<T: Into<String>>(method: HttpMethod, endpoint: T) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            headers: BTreeMap::new(),
            query: QueryOptions::new(),
            body: None,
        }
    }

    /// 合并查询参数
    pub fn query(mut self, options: &QueryOptions) -> Self {
        for (key, value) in options {
            self.query.insert(key.clone(), value.clone());
        }
        self
    }

    /// 设置请求体（记录数组）
    pub fn send(mut self, values: &[Record]) -> Self {
        self.body = Some(Value::Array(values.to_vec()));
        self
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// 请求上下文
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub operation: Operation,
    /// 连接配置（只读）
    pub connection: Arc<ConnectionSettings>,
    pub collection: String,
    pub options: QueryOptions,
    pub values: Vec<Record>,
    pub config: OperationConfig,
    /// Hook 可以直接给出完整请求；否则由 `config.endpoint` 构造
    pub request: Option<PreparedRequest>,
}

impl RequestContext {
    pub fn new<T: Into<String>>(
        operation: Operation,
        connection: Arc<ConnectionSettings>,
        collection: T,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            operation,
            connection,
            collection: collection.into(),
            options: QueryOptions::new(),
            values: Vec::new(),
            config: OperationConfig::new(),
            request: None,
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_values(mut self, values: Vec<Record>) -> Self {
        self.values = values;
        self
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.config.get(ENDPOINT_KEY).and_then(Value::as_str)
    }

    pub fn set_endpoint<T: Into<String>>(&mut self, endpoint: T) {
        self.config
            .insert(ENDPOINT_KEY.to_string(), Value::String(endpoint.into()));
    }

    /// 取出 Hook 构造的请求；若没有则按 `config.endpoint` / `config.method` 构造
    pub fn prepare_request(&mut self) -> Result<PreparedRequest> {
        if let Some(request) = self.request.take() {
            return Ok(request);
        }

        let endpoint = self.endpoint().map(str::to_string).ok_or_else(|| {
            ErrorBuilder::new(
                ErrorCode::ConfigurationError,
                "no before-hook established a request endpoint",
            )
            .details(format!(
                "operation={}, collection={}",
                self.operation, self.collection
            ))
            .build_error()
        })?;

        let method = match self.config.get(METHOD_KEY).and_then(Value::as_str) {
            Some(raw) => HttpMethod::parse(raw).ok_or_else(|| {
                ErrorBuilder::new(ErrorCode::InvalidRequest, "unsupported http method")
                    .details(format!("method={raw}"))
                    .build_error()
            })?,
            None => self.operation.default_method(),
        };

        Ok(PreparedRequest::new(method, endpoint))
    }
}
