//! 连接：配置 + 两条 Hook 链 + 远端协作者
//!
//! `Connection` 构建后不可变，可通过 `Arc` 在并发调用之间共享。

use std::fmt;
use std::sync::Arc;

use crate::config::ConnectionSettings;
use crate::context::RequestContext;
use crate::dispatcher::ResponseEnvelope;
use crate::error::Result;
use crate::hooks::{Hook, HookChain, HookFactory, HookMetadata, HookPhase};
use crate::remote::{HttpCrmClient, RemoteClient};
use crate::transport::{HttpTransport, ReqwestTransport};

pub struct Connection {
    settings: Arc<ConnectionSettings>,
    before: HookChain<RequestContext>,
    after: HookChain<ResponseEnvelope>,
    client: Arc<dyn RemoteClient>,
    transport: Arc<dyn HttpTransport>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("settings", &self.settings)
            .field("before", &self.before)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn builder(settings: ConnectionSettings) -> ConnectionBuilder {
        ConnectionBuilder::new(settings)
    }

    pub fn identity(&self) -> &str {
        &self.settings.identity
    }

    pub fn settings(&self) -> &Arc<ConnectionSettings> {
        &self.settings
    }

    pub fn before_hooks(&self) -> &HookChain<RequestContext> {
        &self.before
    }

    pub fn after_hooks(&self) -> &HookChain<ResponseEnvelope> {
        &self.after
    }

    pub fn client(&self) -> &Arc<dyn RemoteClient> {
        &self.client
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }
}

pub struct ConnectionBuilder {
    settings: ConnectionSettings,
    before: HookChain<RequestContext>,
    after: HookChain<ResponseEnvelope>,
    client: Option<Arc<dyn RemoteClient>>,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl ConnectionBuilder {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            before: HookChain::new(HookPhase::Before),
            after: HookChain::new(HookPhase::After),
            client: None,
            transport: None,
        }
    }

    pub fn before(mut self, metadata: HookMetadata, hook: Arc<dyn Hook<RequestContext>>) -> Self {
        self.before.register(metadata, hook);
        self
    }

    pub fn after(mut self, metadata: HookMetadata, hook: Arc<dyn Hook<ResponseEnvelope>>) -> Self {
        self.after.register(metadata, hook);
        self
    }

    pub fn client(mut self, client: Arc<dyn RemoteClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 按配置中声明的 Hook 定义注册
    pub fn install_hooks(self, factory: &dyn HookFactory) -> Result<Self> {
        let hooks = self.settings.hooks.clone();
        hooks.install(self, factory)
    }

    /// 未显式指定的协作者使用默认的 reqwest 实现
    pub fn build(self) -> Result<Connection> {
        let client = match self.client {
            Some(client) => client,
            None => Arc::new(HttpCrmClient::from_settings(&self.settings)?),
        };
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        tracing::debug!(
            identity = %self.settings.identity,
            before = self.before.len(),
            after = self.after.len(),
            "connection built"
        );

        Ok(Connection {
            settings: Arc::new(self.settings),
            before: self.before,
            after: self.after,
            client,
            transport,
        })
    }
}
