use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, ErrorBuilder, ErrorCode, Result};

/// Hook 阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    /// 构造/发送请求之前，可改写请求上下文或终止调用
    Before,
    /// 远端调用完成之后（无论成功失败），可改写响应或拦截错误
    After,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Before => write!(f, "before"),
            HookPhase::After => write!(f, "after"),
        }
    }
}

/// Hook 执行结果
#[derive(Debug)]
pub enum HookOutcome {
    Continue,
    Abort(AdapterError),
}

impl HookOutcome {
    pub fn is_continue(&self) -> bool {
        matches!(self, HookOutcome::Continue)
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            HookOutcome::Continue => Ok(()),
            HookOutcome::Abort(err) => Err(err),
        }
    }
}

impl From<Result<()>> for HookOutcome {
    fn from(value: Result<()>) -> Self {
        match value {
            Ok(_) => HookOutcome::Continue,
            Err(err) => HookOutcome::Abort(err),
        }
    }
}

impl fmt::Display for HookOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookOutcome::Continue => write!(f, "continue"),
            HookOutcome::Abort(error) => write!(f, "abort: {error}"),
        }
    }
}

/// 通用 Hook Trait
///
/// `S` 为 Hook 链共享的可变状态：before 阶段是 `RequestContext`，
/// after 阶段是 `ResponseEnvelope`。同一条链上的 Hook 串行执行，
/// 每个 Hook 执行期间独占 `&mut S`。
#[async_trait]
pub trait Hook<S: Send + ?Sized>: Send + Sync {
    async fn handle(&self, state: &mut S) -> HookOutcome;
}

#[async_trait]
impl<S, T> Hook<S> for Arc<T>
where
    S: Send + ?Sized,
    T: Hook<S> + ?Sized,
{
    async fn handle(&self, state: &mut S) -> HookOutcome {
        (**self).handle(state).await
    }
}

/// 将同步闭包适配为 Hook
pub struct FnHook<F> {
    f: F,
}

pub fn hook_fn<S, F>(f: F) -> FnHook<F>
where
    S: Send + ?Sized,
    F: Fn(&mut S) -> Result<()> + Send + Sync,
{
    FnHook { f }
}

#[async_trait]
impl<S, F> Hook<S> for FnHook<F>
where
    S: Send + ?Sized,
    F: Fn(&mut S) -> Result<()> + Send + Sync,
{
    async fn handle(&self, state: &mut S) -> HookOutcome {
        (self.f)(state).into()
    }
}

/// Hook 注册元信息
#[derive(Debug, Clone)]
pub struct HookMetadata {
    pub name: Arc<str>,
    pub description: Option<Arc<str>>,
    pub phase: HookPhase,
    pub priority: i32,
}

impl Default for HookMetadata {
    fn default() -> Self {
        Self {
            name: Arc::from("anonymous"),
            description: None,
            phase: HookPhase::Before,
            priority: 0,
        }
    }
}

impl HookMetadata {
    pub fn named<T: Into<Arc<str>>>(name: T) -> Self {
        Self::default().with_name(name)
    }

    pub fn with_phase(mut self, phase: HookPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_name<T: Into<Arc<str>>>(mut self, name: T) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description<T: Into<Arc<str>>>(mut self, description: Option<T>) -> Self {
        self.description = description.map(Into::into);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn build_error(&self, code: ErrorCode, message: &str) -> AdapterError {
        ErrorBuilder::new(code, message)
            .details(format!("hook={}, phase={}", self.name, self.phase))
            .build_error()
    }
}
