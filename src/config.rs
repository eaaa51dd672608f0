//! 应用配置管理模块
//!
//! 统一管理应用的所有配置，支持从环境变量和配置文件加载配置

use figment::{
    providers::{Env, Format, Toml},
    Error as FigmentError, Figment,
};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::helpers::pagination::DEFAULT_WINDOW_SIZE;

/// 配置加载错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置加载错误: {0}")]
    Loading(#[from] FigmentError),
    #[error("配置验证错误: {0}")]
    Validation(String),
}

/// 数据库配置
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 2,
            acquire_timeout_seconds: 5,
            idle_timeout_seconds: 300,
        }
    }
}

/// 服务器配置
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub graceful_shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            graceful_shutdown_timeout_seconds: 5,
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 分页配置
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PaginationConfig {
    /// 导航条中最多显示的页码数量（偶数会向下取奇数）
    pub window_size: i64,
    /// 未指定 per_page 时的每页数量
    pub default_per_page: i64,
    /// per_page 的上限
    pub max_per_page: i64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            default_per_page: 10,
            max_per_page: 100,
        }
    }
}

/// 应用配置
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub pagination: PaginationConfig,
    pub log_level: String,
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            pagination: PaginationConfig::default(),
            log_level: "info".to_string(),
            environment: "development".to_string(),
        }
    }
}

impl AppConfig {
    /// 从默认位置加载配置
    pub fn load() -> Result<Self, ConfigError> {
        // 配置文件搜索路径
        let config_paths = [
            PathBuf::from("./config.toml"),
            PathBuf::from("../config.toml"),
            PathBuf::from("./config/config.toml"),
        ];

        let mut figment = Figment::new();

        // 只加载第一个存在的配置文件
        if let Some(path) = config_paths.into_iter().find(|p| p.exists()) {
            tracing::info!("从配置文件加载: {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        // 环境变量优先级最高，例如 APP_SERVER.PORT=8080
        figment = figment.merge(Env::prefixed("APP_").split("."));

        Self::from_figment(figment)
    }

    /// 从给定的 figment 提取并验证配置
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置
    fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(
            self.environment.to_lowercase().as_str(),
            "development" | "staging" | "production"
        ) {
            return Err(ConfigError::Validation(
                "环境必须是 development、staging 或 production".to_string(),
            ));
        }

        if !matches!(
            self.log_level.to_lowercase().as_str(),
            "error" | "warn" | "info" | "debug" | "trace"
        ) {
            return Err(ConfigError::Validation(
                "日志级别必须是 error、warn、info、debug 或 trace".to_string(),
            ));
        }

        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::Validation(
                "最大连接数不能小于最小连接数".to_string(),
            ));
        }

        let pagination = &self.pagination;
        if pagination.window_size < 1 {
            return Err(ConfigError::Validation(
                "分页窗口大小必须大于等于 1".to_string(),
            ));
        }
        if pagination.default_per_page < 1 || pagination.default_per_page > pagination.max_per_page {
            return Err(ConfigError::Validation(
                "默认每页数量必须在 1 到 max_per_page 之间".to_string(),
            ));
        }

        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

// 全局配置实例
lazy_static::lazy_static! {
    pub static ref CONFIG: AppConfig = AppConfig::load()
        .unwrap_or_else(|e| {
            eprintln!("警告: 无法加载配置: {}. 使用默认配置.", e);
            AppConfig::default()
        });
}
