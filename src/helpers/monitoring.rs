//! 监控和运维功能模块
//!
//! 提供健康检查、性能指标收集和应用共享状态

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use metrics::{histogram, increment_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;

/// 健康检查响应
#[derive(Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: u64,
    pub database: String,
}

/// 应用状态，包含启动时间、数据库连接池、配置和指标句柄
#[derive(Clone)]
pub struct AppState {
    pub start_time: Instant,
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(pool: SqlitePool, config: Arc<AppConfig>) -> Self {
        Self {
            start_time: Instant::now(),
            pool,
            config,
            metrics: None,
        }
    }

    /// 附加 Prometheus 指标句柄
    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    /// 获取应用运行时间（秒）
    pub fn uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// 分页导航条的窗口大小
    pub fn window_size(&self) -> i64 {
        self.config.pagination.window_size
    }
}

/// 安装 Prometheus 指标收集器
///
/// 全局只能安装一次，失败时记录日志并在没有指标的情况下继续运行
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("无法安装 Prometheus 指标收集器: {}", e);
            None
        }
    }
}

/// 健康检查处理器
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::error!("数据库健康检查失败: {}", e);
            "error"
        }
    };

    let response = HealthCheckResponse {
        status: if db_status == "ok" { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.uptime(),
        database: db_status.to_string(),
    };

    (StatusCode::OK, Json(response))
}

/// 指标处理器 - 暴露 Prometheus 文本格式的指标
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// 指标收集中间件
pub async fn metrics_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> impl IntoResponse {
    let start = Instant::now();
    let path = req.uri().path().to_string();
    let method = req.method().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status().as_u16().to_string();

    if response.status().is_client_error() || response.status().is_server_error() {
        increment_counter!("http_requests_errors_total", "status" => status.clone(), "method" => method.clone(), "path" => path.clone());
    } else {
        increment_counter!("http_requests_total", "status" => status.clone(), "method" => method.clone(), "path" => path.clone());
    }

    histogram!("http_request_duration_seconds", duration.as_secs_f64(),
        "status" => status,
        "method" => method,
        "path" => path
    );

    response
}

/// 数据库查询监控帮助函数
pub async fn track_db_query<T, F>(query_name: &'static str, f: F) -> Result<T, sqlx::Error>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    increment_counter!("db_queries_total", "query" => query_name);

    let start = Instant::now();
    let result = f.await;
    let status = if result.is_ok() { "success" } else { "error" };

    if result.is_err() {
        increment_counter!("db_queries_errors_total", "query" => query_name);
    }

    histogram!("db_query_duration_seconds", start.elapsed().as_secs_f64(),
        "query" => query_name,
        "status" => status
    );

    result
}
