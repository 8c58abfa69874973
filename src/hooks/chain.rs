use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::error::{ErrorCode, Result};

use super::types::{Hook, HookMetadata, HookOutcome, HookPhase};

struct ChainEntry<S: Send + ?Sized> {
    metadata: HookMetadata,
    handler: Arc<dyn Hook<S>>,
}

impl<S: Send + ?Sized> Clone for ChainEntry<S> {
    fn clone(&self) -> Self {
        Self {
            metadata: self.metadata.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

/// 有序、短路的 Hook 链
///
/// before / after 两个阶段共用同一套执行机制，只是共享状态 `S` 不同。
/// 链在 `Connection` 构建完成后只读，调用方之间可并发共享。
pub struct HookChain<S: Send + ?Sized> {
    phase: HookPhase,
    entries: Vec<ChainEntry<S>>,
}

impl<S: Send + ?Sized> Clone for HookChain<S> {
    fn clone(&self) -> Self {
        Self {
            phase: self.phase,
            entries: self.entries.clone(),
        }
    }
}

impl<S: Send + ?Sized> fmt::Debug for HookChain<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChain")
            .field("phase", &self.phase)
            .field("hooks", &self.names())
            .finish()
    }
}

impl<S: Send + ?Sized> HookChain<S> {
    pub fn new(phase: HookPhase) -> Self {
        Self {
            phase,
            entries: Vec::new(),
        }
    }

    pub fn phase(&self) -> HookPhase {
        self.phase
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<Arc<str>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.metadata.name))
            .collect()
    }

    /// 注册 Hook。按 priority 升序排列，同优先级保持注册顺序（稳定排序）。
    pub fn register(&mut self, metadata: HookMetadata, handler: Arc<dyn Hook<S>>) {
        self.entries.push(ChainEntry {
            metadata: metadata.with_phase(self.phase),
            handler,
        });
        self.entries
            .sort_by(|a, b| a.metadata.priority.cmp(&b.metadata.priority));
    }

    /// 依序执行全部 Hook，遇到第一个失败立即返回该错误，后续 Hook 不再执行。
    pub async fn run(&self, state: &mut S) -> Result<()> {
        for entry in &self.entries {
            let fut = entry.handler.handle(state);
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(HookOutcome::Continue) => {
                    tracing::trace!(hook = %entry.metadata.name, phase = %self.phase, "hook passed");
                }
                Ok(HookOutcome::Abort(error)) => {
                    tracing::debug!(
                        hook = %entry.metadata.name,
                        phase = %self.phase,
                        error = %error,
                        "hook aborted chain"
                    );
                    return Err(error);
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(
                        hook = %entry.metadata.name,
                        phase = %self.phase,
                        panic = %message,
                        "hook panicked"
                    );
                    return Err(entry
                        .metadata
                        .build_error(ErrorCode::HookPanicked, &message));
                }
            }
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
