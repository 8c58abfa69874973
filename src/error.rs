//! 适配器错误模块
//!
//! - 统一定义错误码 `ErrorCode` 与错误类型 `AdapterError`
//! - 通过 `ErrorBuilder` 以链式方式构造带详情的错误

use std::fmt;

use serde::{Deserialize, Serialize};

/// 错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// before-hook 主动终止调用
    HookRejected,
    /// after-hook 处理响应失败
    HookFailed,
    /// Hook 执行过程中 panic
    HookPanicked,
    /// 底层传输失败（网络、非 2xx 状态码等）
    TransportError,
    /// 远端调用成功，但结果自身标记为错误
    RemoteError,
    ConfigurationError,
    OperationNotSupported,
    ConnectionNotFound,
    DeserializationError,
    InvalidRequest,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::HookRejected => "HOOK_REJECTED",
            ErrorCode::HookFailed => "HOOK_FAILED",
            ErrorCode::HookPanicked => "HOOK_PANICKED",
            ErrorCode::TransportError => "TRANSPORT_ERROR",
            ErrorCode::RemoteError => "REMOTE_ERROR",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::OperationNotSupported => "OPERATION_NOT_SUPPORTED",
            ErrorCode::ConnectionNotFound => "CONNECTION_NOT_FOUND",
            ErrorCode::DeserializationError => "DESERIALIZATION_ERROR",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
        }
    }

    /// 是否来自 Hook 本身（而非远端调用）
    pub fn is_hook_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::HookRejected | ErrorCode::HookFailed | ErrorCode::HookPanicked
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 适配器统一错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct AdapterError {
    code: ErrorCode,
    message: String,
    details: Option<String>,
}

impl AdapterError {
    pub fn new<M: Into<String>>(code: ErrorCode, message: M) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }
}

pub type Result<T, E = AdapterError> = std::result::Result<T, E>;

/// 错误构造器
#[derive(Debug)]
pub struct ErrorBuilder {
    code: ErrorCode,
    message: String,
    details: Option<String>,
}

impl ErrorBuilder {
    pub fn new<M: Into<String>>(code: ErrorCode, message: M) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn details<D: Into<String>>(mut self, details: D) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn build_error(self) -> AdapterError {
        AdapterError {
            code: self.code,
            message: self.message,
            details: self.details,
        }
    }
}
