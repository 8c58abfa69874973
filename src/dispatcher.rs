//! 响应分发
//!
//! 远端调用结束后（无论成功失败）先执行 after-hook 链，再把结果归一化为
//! `Result<Option<Value>>` 交给调用方。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AdapterError, Result};
use crate::hooks::HookChain;

/// 远端响应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteResponse {
    /// HTTP 状态码；CRM 客户端调用没有状态码
    #[serde(default)]
    pub status: Option<u16>,
    /// 归一化后的数据
    #[serde(default)]
    pub data: Option<Value>,
}

impl RemoteResponse {
    pub fn with_data(data: Value) -> Self {
        Self {
            status: None,
            data: Some(data),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// after-hook 链共享的 (error, response) 对
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseEnvelope {
    pub error: Option<AdapterError>,
    pub response: Option<RemoteResponse>,
}

impl ResponseEnvelope {
    pub fn new(error: Option<AdapterError>, response: Option<RemoteResponse>) -> Self {
        Self { error, response }
    }

    pub fn success(response: RemoteResponse) -> Self {
        Self::new(None, Some(response))
    }

    pub fn failure(error: AdapterError) -> Self {
        Self::new(Some(error), None)
    }

    /// 二元完成回调的归一化：有响应且无错误时错误显式为 `None`
    pub fn from_result(result: Result<RemoteResponse>) -> Self {
        match result {
            Ok(response) => Self::success(response),
            Err(error) => Self::failure(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn data(&self) -> Option<&Value> {
        self.response.as_ref().and_then(|resp| resp.data.as_ref())
    }
}

pub struct ResponseDispatcher<'a> {
    after: &'a HookChain<ResponseEnvelope>,
}

impl<'a> ResponseDispatcher<'a> {
    pub fn new(after: &'a HookChain<ResponseEnvelope>) -> Self {
        Self { after }
    }

    pub async fn dispatch(&self, mut envelope: ResponseEnvelope) -> Result<Option<Value>> {
        // after-hook 报错时覆盖原始错误
        self.after.run(&mut envelope).await?;

        match envelope {
            ResponseEnvelope {
                error: Some(error),
                response,
            } => {
                if let Some(data) = response.and_then(|resp| resp.data) {
                    tracing::debug!(error = %error, %data, "dropping response data of failed call");
                }
                Err(error)
            }
            ResponseEnvelope {
                error: None,
                response: None,
            } => Ok(None),
            ResponseEnvelope {
                error: None,
                response: Some(response),
            } => Ok(response.data),
        }
    }

    pub async fn dispatch_result(&self, result: Result<RemoteResponse>) -> Result<Option<Value>> {
        self.dispatch(ResponseEnvelope::from_result(result)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::error::{ErrorBuilder, ErrorCode};
    use crate::hooks::{HookMetadata, HookPhase, hook_fn};

    fn transport_error() -> AdapterError {
        ErrorBuilder::new(ErrorCode::TransportError, "connection reset").build_error()
    }

    #[tokio::test]
    async fn no_response_and_no_error_is_null_data() {
        let chain = HookChain::new(HookPhase::After);
        let out = ResponseDispatcher::new(&chain)
            .dispatch(ResponseEnvelope::default())
            .await;
        assert_eq!(out, Ok(None));
    }

    #[tokio::test]
    async fn success_surfaces_response_data() {
        let chain = HookChain::new(HookPhase::After);
        let out = ResponseDispatcher::new(&chain)
            .dispatch_result(Ok(RemoteResponse::with_data(json!([{"id": 1}]))))
            .await;
        assert_eq!(out, Ok(Some(json!([{"id": 1}]))));
    }

    #[tokio::test]
    async fn after_hooks_observe_failed_calls() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut chain = HookChain::new(HookPhase::After);
        chain.register(
            HookMetadata::named("observer"),
            Arc::new(hook_fn(move |env: &mut ResponseEnvelope| {
                sink.lock().unwrap().push(env.is_error());
                Ok(())
            })),
        );

        let out = ResponseDispatcher::new(&chain)
            .dispatch(ResponseEnvelope::failure(transport_error()))
            .await;
        assert_eq!(out.unwrap_err().code(), ErrorCode::TransportError);
        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn after_hook_error_supersedes_remote_error() {
        let mut chain = HookChain::new(HookPhase::After);
        chain.register(
            HookMetadata::named("strict"),
            Arc::new(hook_fn(|_: &mut ResponseEnvelope| {
                Err(ErrorBuilder::new(ErrorCode::HookFailed, "bad payload").build_error())
            })),
        );

        let envelope = ResponseEnvelope::new(
            Some(transport_error()),
            Some(RemoteResponse::with_data(json!({"ok": false}))),
        );
        let err = ResponseDispatcher::new(&chain)
            .dispatch(envelope)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::HookFailed);
    }

    #[tokio::test]
    async fn after_hook_can_recover_from_error() {
        let mut chain = HookChain::new(HookPhase::After);
        chain.register(
            HookMetadata::named("fallback"),
            Arc::new(hook_fn(|env: &mut ResponseEnvelope| {
                env.error = None;
                env.response = Some(RemoteResponse::with_data(json!([])));
                Ok(())
            })),
        );

        let out = ResponseDispatcher::new(&chain)
            .dispatch(ResponseEnvelope::failure(transport_error()))
            .await;
        assert_eq!(out, Ok(Some(json!([]))));
    }

    #[tokio::test]
    async fn error_with_response_returns_error() {
        let chain = HookChain::new(HookPhase::After);
        let envelope = ResponseEnvelope::new(
            Some(transport_error()),
            Some(RemoteResponse::with_data(json!({"detail": "nope"})).with_status(500)),
        );
        let out = ResponseDispatcher::new(&chain).dispatch(envelope).await;
        assert_eq!(out, Err(transport_error()));
    }
}
