//! 页面路由处理模块
//!
//! 提供后台首页（概览）的渲染功能

use askama::Template;
use askama_axum::IntoResponse;
use axum::{extract::State, http::StatusCode, response::Redirect};
use sqlx::SqlitePool;

use crate::helpers::monitoring::{track_db_query, AppState};

/// 概览统计
#[derive(Clone, Debug, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct DashboardStats {
    pub post_count: i64,
    pub published_count: i64,
    pub category_count: i64,
    pub tag_count: i64,
    pub pending_comment_count: i64,
}

#[derive(Template)]
#[template(path = "modules/home/index.html")]
pub struct IndexTemplate {
    pub stats: DashboardStats,
}

/// 使用单个SQL查询获取所有统计数据
pub async fn get_stats(pool: &SqlitePool) -> Result<DashboardStats, sqlx::Error> {
    sqlx::query_as::<_, DashboardStats>(
        "SELECT
            (SELECT COUNT(*) FROM posts) AS post_count,
            (SELECT COUNT(*) FROM posts WHERE status = 'published') AS published_count,
            (SELECT COUNT(*) FROM categories) AS category_count,
            (SELECT COUNT(*) FROM tags) AS tag_count,
            (SELECT COUNT(*) FROM comments WHERE status = 'pending') AS pending_comment_count",
    )
    .fetch_one(pool)
    .await
}

/// 根路径跳转到后台首页
pub async fn root() -> Redirect {
    Redirect::to("/dashboard")
}

/// 后台首页
pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    match track_db_query("dashboard_stats", get_stats(&state.pool)).await {
        Ok(stats) => IndexTemplate { stats }.into_response(),
        Err(e) => {
            tracing::error!("获取概览统计失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "获取概览统计失败").into_response()
        }
    }
}
