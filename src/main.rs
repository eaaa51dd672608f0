mod config;
mod db;
mod helpers;
mod routes;
mod security;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppConfig, CONFIG};
use crate::helpers::monitoring::{init_metrics, AppState};

#[tokio::main]
async fn main() {
    let config = Arc::new(CONFIG.clone());
    init_tracing(&config);

    if let Err(e) = run(config).await {
        tracing::error!("❌ 服务异常退出: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(config: &AppConfig) {
    let default_filter = format!(
        "klog_dashboard={},tower_http=info,sqlx=warn",
        config.log_level
    );

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_ansi(!config.is_production()))
        .init();
}

async fn run(config: Arc<AppConfig>) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("🔧 正在连接数据库...");
    let pool = db::create_pool(&config.database).await?;
    db::init_db(&pool).await?;
    tracing::info!("✅ 数据库初始化完成");

    let state = AppState::new(pool.clone(), config.clone()).with_metrics(init_metrics());
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(config.server.server_addr()).await?;
    tracing::info!(
        "🚀 Klog 后台已启动: http://{} ({})",
        listener.local_addr()?,
        config.environment
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 等待连接池关闭，超时则直接退出
    let timeout = Duration::from_secs(config.server.graceful_shutdown_timeout_seconds);
    if tokio::time::timeout(timeout, pool.close()).await.is_err() {
        tracing::warn!("关闭数据库连接池超时");
    }

    tracing::info!("👋 服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("无法监听 Ctrl+C 信号: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("无法监听 SIGTERM 信号: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("收到停止信号，正在关闭服务...");
}
