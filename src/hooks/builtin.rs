use async_trait::async_trait;

use crate::context::RequestContext;

use super::types::{Hook, HookOutcome};

/// 内置 endpoint Hook
///
/// 将集合名拼接到 API 根路径上，例如 `http://localhost:8080/api/v1` 与集合
/// `user` 得到 `http://localhost:8080/api/v1/user`。通常注册为第一个 before-hook。
#[derive(Debug, Clone)]
pub struct EndpointHook {
    base_url: String,
}

impl EndpointHook {
    pub fn new<T: Into<String>>(base_url: T) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn resolve(&self, collection: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            collection.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Hook<RequestContext> for EndpointHook {
    async fn handle(&self, ctx: &mut RequestContext) -> HookOutcome {
        let endpoint = self.resolve(&ctx.collection);
        tracing::trace!(request_id = %ctx.request_id, %endpoint, "endpoint resolved");
        ctx.set_endpoint(endpoint);
        HookOutcome::Continue
    }
}
