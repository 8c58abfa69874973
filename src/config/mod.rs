//! 适配器配置模块
//!
//! 该模块提供：
//! - 连接配置（凭证、CRM 域、资源别名、远端操作名、Hook 定义）
//! - 日志配置
//! - 从单个 TOML 文件或配置目录（base.toml + overrides）加载

use std::collections::HashMap;
use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Deserializer, Serialize};
use toml::Value;
use tracing::warn;

use crate::error::{ErrorBuilder, ErrorCode, Result};
use crate::hooks::HookConfig;

/// 选择环境覆盖文件的环境变量
pub const ENV_VAR: &str = "CRM_ADAPTER_ENV";

/// 日志配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（`RUST_LOG` 优先）
    pub level: String,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_file: bool,
    pub with_line_number: bool,
    /// 以 JSON 格式输出
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
            json: false,
        }
    }
}

/// 资源别名：逻辑集合名 -> 远端资源名，以及用于单条查询的 id 字段
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceAlias {
    pub resource: String,
    #[serde(default)]
    pub id_field: Option<String>,
}

/// 各逻辑操作对应的远端操作名
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteOperations {
    pub find_all: String,
    pub find_by_id: String,
    /// 未配置时 create 走 before-hook 构造的 HTTP 请求
    pub create: Option<String>,
    /// update / destroy 必须显式配置
    pub update: Option<String>,
    pub destroy: Option<String>,
}

impl Default for RemoteOperations {
    fn default() -> Self {
        Self {
            find_all: "getRecords".to_string(),
            find_by_id: "getRecordById".to_string(),
            create: None,
            update: None,
            destroy: None,
        }
    }
}

/// 单个连接配置
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub identity: String,
    pub auth_token: Option<String>,
    /// CRM 域，例如 `crm`
    pub domain: String,
    /// CRM API 根地址
    pub base_url: String,
    /// 配置的别名与内置别名合并，同名时以配置为准
    #[serde(deserialize_with = "merge_default_aliases")]
    pub aliases: HashMap<String, ResourceAlias>,
    pub remote_operations: RemoteOperations,
    pub hooks: HookConfig,
}

/// 内置别名：`member` -> `Contacts`（id 字段 `CONTACTID`）
fn default_aliases() -> HashMap<String, ResourceAlias> {
    let mut aliases = HashMap::new();
    aliases.insert(
        "member".to_string(),
        ResourceAlias {
            resource: "Contacts".to_string(),
            id_field: Some("CONTACTID".to_string()),
        },
    );
    aliases
}

fn merge_default_aliases<'de, D>(
    deserializer: D,
) -> std::result::Result<HashMap<String, ResourceAlias>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut aliases = HashMap::<String, ResourceAlias>::deserialize(deserializer)?;
    for (collection, alias) in default_aliases() {
        aliases.entry(collection).or_insert(alias);
    }
    Ok(aliases)
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let aliases = default_aliases();
        Self {
            identity: "default".to_string(),
            auth_token: None,
            domain: "crm".to_string(),
            base_url: "https://crm.zoho.com".to_string(),
            aliases,
            remote_operations: RemoteOperations::default(),
            hooks: HookConfig::default(),
        }
    }
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("identity", &self.identity)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .field("domain", &self.domain)
            .field("base_url", &self.base_url)
            .field("aliases", &self.aliases)
            .field("remote_operations", &self.remote_operations)
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl ConnectionSettings {
    pub fn new<T: Into<String>>(identity: T) -> Self {
        Self {
            identity: identity.into(),
            ..Default::default()
        }
    }

    pub fn with_auth_token<T: Into<String>>(mut self, token: T) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_alias<T: Into<String>>(mut self, collection: T, alias: ResourceAlias) -> Self {
        self.aliases.insert(collection.into(), alias);
        self
    }

    pub fn with_remote_operations(mut self, operations: RemoteOperations) -> Self {
        self.remote_operations = operations;
        self
    }

    pub fn alias(&self, collection: &str) -> Option<&ResourceAlias> {
        self.aliases.get(collection)
    }
}

/// 适配器整体配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub logging: LoggingConfig,
    pub connections: Vec<ConnectionSettings>,
}

impl AdapterConfig {
    pub fn connection(&self, identity: &str) -> Option<&ConnectionSettings> {
        self.connections.iter().find(|conn| conn.identity == identity)
    }
}

/// 加载配置
///
/// 未指定路径时依次尝试 `config/` 目录与 `crm-adapter.toml`，都失败时返回默认配置。
pub fn load_config(path: Option<&Path>) -> Result<AdapterConfig> {
    let candidates: Vec<PathBuf> = match path {
        Some(p) => vec![p.to_path_buf()],
        None => vec![PathBuf::from("config"), PathBuf::from("crm-adapter.toml")],
    };

    let explicit = path.is_some();
    for candidate in &candidates {
        match load_config_from_source(candidate) {
            Ok(cfg) => return Ok(cfg),
            Err(err) if explicit => {
                return Err(ErrorBuilder::new(
                    ErrorCode::ConfigurationError,
                    "failed to load adapter config",
                )
                .details(format!("{err:#}"))
                .build_error());
            }
            Err(err) => {
                warn!("failed to load config from {}: {err:#}", candidate.display());
            }
        }
    }

    warn!("no configuration source succeeded, falling back to defaults");
    Ok(AdapterConfig::default())
}

/// 从源加载配置
fn load_config_from_source(path: &Path) -> anyhow::Result<AdapterConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "configuration path {} does not exist",
            path.display()
        ));
    }

    let metadata = path
        .metadata()
        .with_context(|| format!("unable to read metadata for {}", path.display()))?;

    if metadata.is_dir() {
        load_config_from_directory(path)
    } else {
        load_config_from_file(path)
    }
}

/// 从文件加载配置
fn load_config_from_file(path: &Path) -> anyhow::Result<AdapterConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file: {}", path.display()))?;
    let cfg: AdapterConfig = toml::from_str(&content)
        .with_context(|| format!("invalid config format: {}", path.display()))?;
    Ok(cfg)
}

/// 从目录加载配置：base.toml <- overrides/*.toml <- environments/{env}.toml
fn load_config_from_directory(path: &Path) -> anyhow::Result<AdapterConfig> {
    let base_file = path.join("base.toml");
    if !base_file.exists() {
        return Err(anyhow!(
            "missing base configuration: {}",
            base_file.display()
        ));
    }

    let mut merged = load_toml_value(&base_file)?;

    if !merged.is_table() {
        return Err(anyhow!(
            "base configuration must be a table: {}",
            base_file.display()
        ));
    }

    merge_directory(&mut merged, &path.join("overrides"))?;

    if let Ok(environment) = env::var(ENV_VAR) {
        let env_file = path
            .join("environments")
            .join(format!("{environment}.toml"));
        if env_file.exists() {
            let overlay = load_toml_value(&env_file)?;
            merge_value(&mut merged, overlay);
        }
    }

    let cfg: AdapterConfig = merged
        .try_into()
        .with_context(|| format!("invalid configuration after merging {}", path.display()))?;

    Ok(cfg)
}

fn merge_directory(root: &mut Value, dir: &Path) -> anyhow::Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("unable to read config directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(OsStr::to_str)
                .map(|ext| ext.eq_ignore_ascii_case("toml"))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let value = load_toml_value(&entry.path())?;
        merge_value(root, value);
    }

    Ok(())
}

fn load_toml_value(path: &Path) -> anyhow::Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config fragment {}", path.display()))?;
    let value: Value = toml::from_str(&content)
        .with_context(|| format!("invalid TOML content in fragment {}", path.display()))?;
    Ok(value)
}

/// 表按键递归合并，其余值（含数组）整体覆盖
fn merge_value(base: &mut Value, overlay: Value) {
    match overlay {
        Value::Table(overlay_table) => {
            if let Value::Table(base_table) = base {
                for (key, overlay_value) in overlay_table.into_iter() {
                    match base_table.get_mut(&key) {
                        Some(base_value) => merge_value(base_value, overlay_value),
                        None => {
                            base_table.insert(key, overlay_value);
                        }
                    }
                }
            } else {
                *base = Value::Table(overlay_table);
            }
        }
        other => {
            *base = other;
        }
    }
}
