//! CRM 数据库适配器
//!
//! 将 ORM 的 find / create / update / destroy 调用经由 before / after Hook 管道
//! 转发到 CRM 风格的 HTTP API，并把结果归一化后返回。

pub mod adapter;
pub mod config;
pub mod connection;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod logging;
pub mod remote;
pub mod transport;

pub use adapter::CrmAdapter;
pub use config::{
    AdapterConfig, ConnectionSettings, LoggingConfig, RemoteOperations, ResourceAlias, load_config,
};
pub use connection::{Connection, ConnectionBuilder};
pub use context::{
    HttpMethod, Operation, OperationConfig, PreparedRequest, QueryOptions, Record, RequestContext,
};
pub use dispatcher::{RemoteResponse, ResponseDispatcher, ResponseEnvelope};
pub use error::{AdapterError, ErrorBuilder, ErrorCode, Result};
pub use executor::OperationExecutor;
pub use hooks::*;
pub use logging::init_tracing_from_config;
pub use remote::{HttpCrmClient, RemoteCall, RemoteClient, RemoteResult};
pub use transport::{HttpTransport, ReqwestTransport};
