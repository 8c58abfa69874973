//! 适配器入口
//!
//! 按连接标识管理 `Connection`，并对 ORM 暴露 find / create / update / destroy。
//! 每个入口恰好返回一次结果。

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::AdapterConfig;
use crate::connection::Connection;
use crate::context::{QueryOptions, Record};
use crate::error::{ErrorBuilder, ErrorCode, Result};
use crate::executor::OperationExecutor;
use crate::hooks::HookFactory;

#[derive(Default)]
pub struct CrmAdapter {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl CrmAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置构建全部连接；Hook 通过工厂装配，协作者使用默认实现
    pub async fn from_config(config: &AdapterConfig, factory: &dyn HookFactory) -> Result<Self> {
        let adapter = Self::new();
        for settings in &config.connections {
            let connection = Connection::builder(settings.clone())
                .install_hooks(factory)?
                .build()?;
            adapter.register_connection(connection).await?;
        }
        Ok(adapter)
    }

    pub async fn register_connection(&self, connection: Connection) -> Result<Arc<Connection>> {
        let mut guard = self.connections.write().await;
        let identity = connection.identity().to_string();
        if guard.contains_key(&identity) {
            return Err(
                ErrorBuilder::new(ErrorCode::ConfigurationError, "connection already registered")
                    .details(format!("identity={identity}"))
                    .build_error(),
            );
        }
        let connection = Arc::new(connection);
        guard.insert(identity.clone(), Arc::clone(&connection));
        tracing::info!(%identity, "connection registered");
        Ok(connection)
    }

    /// 移除指定连接；`None` 时移除全部
    pub async fn teardown(&self, identity: Option<&str>) {
        let mut guard = self.connections.write().await;
        match identity {
            Some(identity) => {
                if guard.remove(identity).is_some() {
                    tracing::info!(%identity, "connection torn down");
                }
            }
            None => {
                tracing::info!(count = guard.len(), "tearing down all connections");
                guard.clear();
            }
        }
    }

    pub async fn connection(&self, identity: &str) -> Result<Arc<Connection>> {
        let guard = self.connections.read().await;
        guard.get(identity).cloned().ok_or_else(|| {
            ErrorBuilder::new(ErrorCode::ConnectionNotFound, "unknown connection")
                .details(format!("identity={identity}"))
                .build_error()
        })
    }

    pub async fn find(
        &self,
        identity: &str,
        collection: &str,
        options: QueryOptions,
    ) -> Result<Option<Value>> {
        let connection = self.connection(identity).await?;
        OperationExecutor::new(&connection)
            .find(collection, options)
            .await
    }

    pub async fn create(
        &self,
        identity: &str,
        collection: &str,
        values: Vec<Record>,
    ) -> Result<Option<Value>> {
        let connection = self.connection(identity).await?;
        OperationExecutor::new(&connection)
            .create(collection, values)
            .await
    }

    pub async fn update(
        &self,
        identity: &str,
        collection: &str,
        options: QueryOptions,
        values: Vec<Record>,
    ) -> Result<Option<Value>> {
        let connection = self.connection(identity).await?;
        OperationExecutor::new(&connection)
            .update(collection, options, values)
            .await
    }

    pub async fn destroy(
        &self,
        identity: &str,
        collection: &str,
        options: QueryOptions,
    ) -> Result<Option<Value>> {
        let connection = self.connection(identity).await?;
        OperationExecutor::new(&connection)
            .destroy(collection, options)
            .await
    }
}
