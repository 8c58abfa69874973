//! 逻辑操作执行
//!
//! 每个操作都遵循同一流程：构建 `RequestContext` -> before-hook 链 ->
//! 远端调用 -> after-hook 链（`ResponseDispatcher`）-> 调用方。
//! before-hook 失败时直接返回错误，不发起远端调用，也不执行 after-hook。

use std::sync::Arc;

use serde_json::Value;

use crate::config::ConnectionSettings;
use crate::connection::Connection;
use crate::context::{Operation, PreparedRequest, QueryOptions, Record, RequestContext};
use crate::dispatcher::{ResponseDispatcher, ResponseEnvelope};
use crate::error::{ErrorBuilder, ErrorCode, Result};
use crate::remote::RemoteCall;

/// Waterline 风格查询条件所在的键
const WHERE_KEY: &str = "where";

pub struct OperationExecutor<'a> {
    connection: &'a Connection,
}

impl<'a> OperationExecutor<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        Self { connection }
    }

    /// 查询记录
    ///
    /// 别名集合（如 `member`）映射到远端资源；若选项中带有别名的 id 字段，
    /// 按 id 取单条并包装为单元素数组，否则取全部记录。其余选项当前不参与远端调用。
    pub async fn find(&self, collection: &str, options: QueryOptions) -> Result<Option<Value>> {
        let ctx = self
            .prepare(Operation::Find, collection, options, Vec::new())
            .await?;

        let settings = self.connection.settings();
        let (resource, id) = resolve_target(settings, &ctx.collection, &ctx.options);
        let operations = &settings.remote_operations;
        let (operation, single) = match id {
            Some(_) => (&operations.find_by_id, true),
            None => (&operations.find_all, false),
        };

        let call = RemoteCall::new(&settings.domain, resource, operation)
            .with_method(ctx.operation.default_method())
            .with_id(id);
        let envelope = self.call_remote(&ctx, &call, single).await;
        self.dispatcher().dispatch(envelope).await
    }

    /// 创建记录
    ///
    /// 配置了 `remote_operations.create` 时走 CRM 客户端；否则使用 before-hook
    /// 构造的请求，附加请求体后通过 `HttpTransport` 发送。
    pub async fn create(&self, collection: &str, values: Vec<Record>) -> Result<Option<Value>> {
        let mut ctx = self
            .prepare(Operation::Create, collection, QueryOptions::new(), values)
            .await?;

        let settings = self.connection.settings();
        if let Some(operation) = &settings.remote_operations.create {
            let (resource, _) = resolve_target(settings, &ctx.collection, &ctx.options);
            let call = RemoteCall::new(&settings.domain, resource, operation)
                .with_method(ctx.operation.default_method())
                .with_body(std::mem::take(&mut ctx.values));
            let envelope = self.call_remote(&ctx, &call, false).await;
            return self.dispatcher().dispatch(envelope).await;
        }

        let request = ctx.prepare_request()?.send(&ctx.values);
        self.send_prepared(&ctx, request).await
    }

    /// 更新记录：`options` 作为查询条件，`values` 作为请求体
    ///
    /// 优先使用 `remote_operations.update`；未配置时退回 before-hook 构造的请求。
    pub async fn update(
        &self,
        collection: &str,
        options: QueryOptions,
        values: Vec<Record>,
    ) -> Result<Option<Value>> {
        let mut ctx = self
            .prepare(Operation::Update, collection, options, values)
            .await?;

        let settings = self.connection.settings();
        if let Some(operation) = &settings.remote_operations.update {
            let (resource, id) = resolve_target(settings, &ctx.collection, &ctx.options);
            let call = RemoteCall::new(&settings.domain, resource, operation)
                .with_method(ctx.operation.default_method())
                .with_id(id)
                .with_query(ctx.options.clone())
                .with_body(ctx.values.clone());
            let envelope = self.call_remote(&ctx, &call, false).await;
            return self.dispatcher().dispatch(envelope).await;
        }

        let request = self
            .hook_request(&mut ctx)?
            .query(&ctx.options)
            .send(&ctx.values);
        self.send_prepared(&ctx, request).await
    }

    /// 删除记录：只携带 `options` 作为查询条件
    pub async fn destroy(&self, collection: &str, options: QueryOptions) -> Result<Option<Value>> {
        let mut ctx = self
            .prepare(Operation::Destroy, collection, options, Vec::new())
            .await?;

        let settings = self.connection.settings();
        if let Some(operation) = &settings.remote_operations.destroy {
            let (resource, id) = resolve_target(settings, &ctx.collection, &ctx.options);
            let call = RemoteCall::new(&settings.domain, resource, operation)
                .with_method(ctx.operation.default_method())
                .with_id(id)
                .with_query(ctx.options.clone());
            let envelope = self.call_remote(&ctx, &call, false).await;
            return self.dispatcher().dispatch(envelope).await;
        }

        let request = self.hook_request(&mut ctx)?.query(&ctx.options);
        self.send_prepared(&ctx, request).await
    }

    async fn prepare(
        &self,
        operation: Operation,
        collection: &str,
        options: QueryOptions,
        values: Vec<Record>,
    ) -> Result<RequestContext> {
        let mut ctx = RequestContext::new(
            operation,
            Arc::clone(self.connection.settings()),
            collection,
        )
        .with_options(options)
        .with_values(values);

        tracing::debug!(
            request_id = %ctx.request_id,
            connection = %self.connection.identity(),
            %operation,
            collection,
            "running before hooks"
        );

        if let Err(error) = self.connection.before_hooks().run(&mut ctx).await {
            tracing::warn!(
                request_id = %ctx.request_id,
                %operation,
                collection,
                error = %error,
                "before hooks aborted call"
            );
            return Err(error);
        }
        Ok(ctx)
    }

    /// 远端业务错误与传输错误都会进入 after-hook 链并返回给调用方
    async fn call_remote(
        &self,
        ctx: &RequestContext,
        call: &RemoteCall,
        single: bool,
    ) -> ResponseEnvelope {
        match self.connection.client().execute(call).await {
            Ok(result) if result.is_error() => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    resource = %call.resource,
                    operation = %call.operation,
                    message = result.message(),
                    "remote reported error"
                );
                let error = result.to_error(call);
                ResponseEnvelope::new(Some(error), Some(result.into_response()))
            }
            Ok(mut result) => {
                if single {
                    result.data = wrap_single(result.data);
                }
                ResponseEnvelope::success(result.into_response())
            }
            Err(error) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    resource = %call.resource,
                    operation = %call.operation,
                    error = %error,
                    "remote call failed"
                );
                ResponseEnvelope::failure(error)
            }
        }
    }

    /// update / destroy 未配置远端操作时，只接受 before-hook 给出的请求或 endpoint
    fn hook_request(&self, ctx: &mut RequestContext) -> Result<PreparedRequest> {
        if ctx.request.is_none() && ctx.endpoint().is_none() {
            return Err(ErrorBuilder::new(
                ErrorCode::OperationNotSupported,
                "no remote operation or hook endpoint configured",
            )
            .details(format!(
                "operation={}, collection={}, connection={}",
                ctx.operation,
                ctx.collection,
                self.connection.identity()
            ))
            .build_error());
        }
        ctx.prepare_request()
    }

    async fn send_prepared(
        &self,
        ctx: &RequestContext,
        request: PreparedRequest,
    ) -> Result<Option<Value>> {
        tracing::debug!(
            request_id = %ctx.request_id,
            operation = %ctx.operation,
            method = request.method.as_str(),
            endpoint = %request.endpoint,
            "sending prepared request"
        );
        let envelope = self.connection.transport().send(request).await;
        self.dispatcher().dispatch(envelope).await
    }

    fn dispatcher(&self) -> ResponseDispatcher<'_> {
        ResponseDispatcher::new(self.connection.after_hooks())
    }
}

/// 解析别名：返回远端资源名与（可选的）记录 id
fn resolve_target(
    settings: &ConnectionSettings,
    collection: &str,
    options: &QueryOptions,
) -> (String, Option<String>) {
    match settings.alias(collection) {
        Some(alias) => {
            let id = alias
                .id_field
                .as_deref()
                .and_then(|field| extract_id(options, field));
            (alias.resource.clone(), id)
        }
        None => (collection.to_string(), None),
    }
}

/// 先查顶层字段，再查 `where` 条件；空字符串不算 id
fn extract_id(options: &QueryOptions, field: &str) -> Option<String> {
    let value = options.get(field).or_else(|| {
        options
            .get(WHERE_KEY)
            .and_then(|conditions| conditions.get(field))
    })?;
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn wrap_single(data: Value) -> Value {
    match data {
        Value::Null => Value::Array(Vec::new()),
        record => Value::Array(vec![record]),
    }
}
