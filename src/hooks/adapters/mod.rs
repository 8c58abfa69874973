mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::dispatcher::ResponseEnvelope;
use crate::error::{ErrorBuilder, ErrorCode, Result};

use super::builtin::EndpointHook;
use super::config::{HookDefinition, HookFactory, HookHandlerConfig};
use super::types::Hook;

pub use webhook::WebhookHookFactory;

/// 默认的 Hook 工厂，支持 WebHook / 本地实现 / 内置 endpoint
pub struct DefaultHookFactory {
    webhook: WebhookHookFactory,
    before_locals: HashMap<String, Arc<dyn Hook<RequestContext>>>,
    after_locals: HashMap<String, Arc<dyn Hook<ResponseEnvelope>>>,
}

impl DefaultHookFactory {
    pub fn new() -> Result<Self> {
        Ok(Self {
            webhook: WebhookHookFactory::new()?,
            before_locals: HashMap::new(),
            after_locals: HashMap::new(),
        })
    }

    pub fn register_before_local<S: Into<String>>(
        &mut self,
        name: S,
        hook: Arc<dyn Hook<RequestContext>>,
    ) {
        self.before_locals.insert(name.into(), hook);
    }

    pub fn register_after_local<S: Into<String>>(
        &mut self,
        name: S,
        hook: Arc<dyn Hook<ResponseEnvelope>>,
    ) {
        self.after_locals.insert(name.into(), hook);
    }
}

impl HookFactory for DefaultHookFactory {
    fn build_before(&self, def: &HookDefinition) -> Result<Arc<dyn Hook<RequestContext>>> {
        match &def.handler {
            HookHandlerConfig::Endpoint { base_url } => Ok(Arc::new(EndpointHook::new(base_url))),
            HookHandlerConfig::Webhook {
                endpoint,
                secret,
                headers,
            } => Ok(self
                .webhook
                .build_before(def, endpoint, secret.clone(), headers.clone())),
            HookHandlerConfig::Local { target } => {
                self.before_locals.get(target).cloned().ok_or_else(|| {
                    ErrorBuilder::new(ErrorCode::ConfigurationError, "local before hook not found")
                        .details(format!("hook={}, target={target}", def.name))
                        .build_error()
                })
            }
        }
    }

    fn build_after(&self, def: &HookDefinition) -> Result<Arc<dyn Hook<ResponseEnvelope>>> {
        match &def.handler {
            HookHandlerConfig::Endpoint { .. } => Err(ErrorBuilder::new(
                ErrorCode::ConfigurationError,
                "endpoint hook is only valid in the before phase",
            )
            .details(format!("hook={}", def.name))
            .build_error()),
            HookHandlerConfig::Webhook {
                endpoint,
                secret,
                headers,
            } => Ok(self
                .webhook
                .build_after(def, endpoint, secret.clone(), headers.clone())),
            HookHandlerConfig::Local { target } => {
                self.after_locals.get(target).cloned().ok_or_else(|| {
                    ErrorBuilder::new(ErrorCode::ConfigurationError, "local after hook not found")
                        .details(format!("hook={}, target={target}", def.name))
                        .build_error()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::hook_fn;

    fn definition(handler: HookHandlerConfig) -> HookDefinition {
        HookDefinition {
            name: "under-test".into(),
            handler,
            ..Default::default()
        }
    }

    #[test]
    fn resolves_local_hooks_by_target() {
        let mut factory = DefaultHookFactory::new().unwrap();
        factory.register_after_local(
            "audit",
            Arc::new(hook_fn(|_: &mut ResponseEnvelope| Ok(()))),
        );

        let found = factory.build_after(&definition(HookHandlerConfig::Local {
            target: "audit".into(),
        }));
        assert!(found.is_ok());

        let missing = factory.build_before(&definition(HookHandlerConfig::Local {
            target: "audit".into(),
        }));
        assert_eq!(
            missing.err().map(|e| e.code()),
            Some(ErrorCode::ConfigurationError)
        );
    }

    #[test]
    fn endpoint_hook_rejected_in_after_phase() {
        let factory = DefaultHookFactory::new().unwrap();
        let handler = HookHandlerConfig::Endpoint {
            base_url: "http://localhost".into(),
        };
        assert!(factory.build_before(&definition(handler.clone())).is_ok());
        assert!(factory.build_after(&definition(handler)).is_err());
    }
}
