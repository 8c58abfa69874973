//! 请求 / 响应 Hook 管道
//!
//! - `HookChain` 为 before / after 两个阶段共用的有序、短路执行引擎
//! - before-hook 独占修改 `RequestContext`，可构造请求或终止调用
//! - after-hook 独占修改 `ResponseEnvelope`，可改写响应或拦截错误
//! - 支持本地注册、WebHook 远程回调与内置 endpoint Hook 的配置化装配

pub mod adapters;
mod builtin;
mod chain;
mod config;
mod types;

pub use adapters::{DefaultHookFactory, WebhookHookFactory};
pub use builtin::EndpointHook;
pub use chain::HookChain;
pub use config::{HookConfig, HookDefinition, HookFactory, HookHandlerConfig};
pub use types::{FnHook, Hook, HookMetadata, HookOutcome, HookPhase, hook_fn};
