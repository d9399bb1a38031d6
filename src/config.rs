//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEE__*` 覆盖（双下划线表示嵌套，如 `BEE__SESSION__URL=ws://host/ws/chat`）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::SessionError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub boot: BootSection,
    #[serde(default)]
    pub rest: RestSection,
}

/// [session] 段：后端实时端点与消息日志保留上限
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_url")]
    pub url: String,
    /// 内存中最多保留的消息条数，超出后从最旧一端淘汰
    #[serde(default = "default_retention_cap")]
    pub retention_cap: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            retention_cap: default_retention_cap(),
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:8000/ws/chat".to_string()
}

fn default_retention_cap() -> usize {
    200
}

/// [reconnect] 段：指数退避参数
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectSection {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// 抖动比例（0 关闭），实际延迟在 [delay * (1 - jitter), delay] 内随机
    #[serde(default)]
    pub jitter: f64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: 0.0,
        }
    }
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

/// [boot] 段：等待首次连接的超时
#[derive(Debug, Clone, Deserialize)]
pub struct BootSection {
    #[serde(default = "default_boot_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BootSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_boot_timeout_secs(),
        }
    }
}

fn default_boot_timeout_secs() -> u64 {
    15
}

impl BootSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// [rest] 段：非实时的 HTTP 旁路（转写、打开文件、读写配置）
#[derive(Debug, Clone, Deserialize)]
pub struct RestSection {
    #[serde(default = "default_rest_base_url")]
    pub base_url: String,
    #[serde(default = "default_rest_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RestSection {
    fn default() -> Self {
        Self {
            base_url: default_rest_base_url(),
            timeout_secs: default_rest_timeout_secs(),
        }
    }
}

fn default_rest_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_rest_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    /// 检查取值范围，避免退避参数或保留上限把会话带入不可用状态
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.session.retention_cap == 0 {
            return Err(SessionError::InvalidConfig(
                "session.retention_cap must be at least 1".into(),
            ));
        }
        let r = &self.reconnect;
        if r.base_delay_ms == 0 {
            return Err(SessionError::InvalidConfig(
                "reconnect.base_delay_ms must be positive".into(),
            ));
        }
        if r.max_delay_ms < r.base_delay_ms {
            return Err(SessionError::InvalidConfig(format!(
                "reconnect.max_delay_ms ({}) is below base_delay_ms ({})",
                r.max_delay_ms, r.base_delay_ms
            )));
        }
        if !(r.multiplier >= 1.0) {
            return Err(SessionError::InvalidConfig(
                "reconnect.multiplier must be >= 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&r.jitter) {
            return Err(SessionError::InvalidConfig(
                "reconnect.jitter must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// 默认配置文件的候选位置（不含扩展名），从仓库根、子目录或安装目录启动都能找到
const DEFAULT_CONFIG_CANDIDATES: [&str; 3] = ["config/default", "../config/default", "default"];

fn default_config_file() -> Option<&'static str> {
    DEFAULT_CONFIG_CANDIDATES
        .into_iter()
        .find(|name| Path::new(&format!("{}.toml", name)).exists())
}

/// 加载会话配置并校验
///
/// 后面的来源覆盖前面的：内置默认值 < 第一个存在的默认配置文件 < 命令行给出的文件 <
/// `BEE__SECTION__KEY` 环境变量。命令行文件不存在时只记录警告。
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, SessionError> {
    let mut builder = config::Config::builder();

    if let Some(name) = default_config_file() {
        tracing::debug!("Using default config {}.toml", name);
        builder = builder.add_source(config::File::with_name(name).required(false));
    }

    match config_path {
        Some(path) if path.exists() => {
            builder = builder.add_source(config::File::from(path));
        }
        Some(path) => tracing::warn!("Config file {} not found, ignoring", path.display()),
        None => {}
    }

    let cfg: AppConfig = builder
        .add_source(
            config::Environment::with_prefix("BEE")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}
