use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionBuilder;
use crate::context::RequestContext;
use crate::dispatcher::ResponseEnvelope;
use crate::error::Result;

use super::types::{Hook, HookMetadata, HookPhase};

/// 连接上声明的 Hook 列表，按声明顺序注册
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HookConfig {
    pub before: Vec<HookDefinition>,
    pub after: Vec<HookDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HookHandlerConfig {
    /// 进程内注册的具名 Hook
    Local { target: String },
    /// 通过 HTTP 回调的远程 Hook
    Webhook {
        endpoint: String,
        #[serde(default)]
        secret: Option<String>,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    /// 内置：根据 base_url + collection 生成 endpoint（仅 before 阶段）
    Endpoint { base_url: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HookDefinition {
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub priority: i32,
    pub handler: HookHandlerConfig,
    pub metadata: HashMap<String, String>,
}

impl Default for HookDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            enabled: true,
            priority: 0,
            handler: HookHandlerConfig::Local {
                target: String::new(),
            },
            metadata: HashMap::new(),
        }
    }
}

impl HookDefinition {
    pub fn metadata(&self, phase: HookPhase) -> HookMetadata {
        HookMetadata::default()
            .with_phase(phase)
            .with_name(self.name.clone())
            .with_description(self.description.clone())
            .with_priority(self.priority)
    }
}

pub trait HookFactory: Send + Sync {
    fn build_before(&self, def: &HookDefinition) -> Result<Arc<dyn Hook<RequestContext>>>;

    fn build_after(&self, def: &HookDefinition) -> Result<Arc<dyn Hook<ResponseEnvelope>>>;
}

impl HookConfig {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    /// 通过工厂构建并注册到连接构建器
    pub fn install(
        &self,
        mut builder: ConnectionBuilder,
        factory: &dyn HookFactory,
    ) -> Result<ConnectionBuilder> {
        for def in &self.before {
            if !def.enabled {
                tracing::info!(hook = %def.name, "before hook disabled, skip");
                continue;
            }
            let handler = factory.build_before(def)?;
            builder = builder.before(def.metadata(HookPhase::Before), handler);
        }

        for def in &self.after {
            if !def.enabled {
                tracing::info!(hook = %def.name, "after hook disabled, skip");
                continue;
            }
            let handler = factory.build_after(def)?;
            builder = builder.after(def.metadata(HookPhase::After), handler);
        }

        Ok(builder)
    }
}
