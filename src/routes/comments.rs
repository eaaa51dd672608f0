//! 评论审核路由
//!
//! 按状态筛选评论、分页浏览，并提供通过/标记垃圾/删除操作

use askama::Template;
use askama_axum::IntoResponse;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::Form;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::str::FromStr;
use validator::Validate;

use crate::helpers::monitoring::{track_db_query, AppState};
use crate::helpers::pagination::{
    calculate_display_range, PageItem, PageLinks, PageQuery, Pagination, PaginationNav,
};
use crate::security::{validate_input, FormError};

/// 后台回复使用的作者信息
const REPLY_AUTHOR: &str = "管理员";
const REPLY_EMAIL: &str = "admin@klog.local";

/// 评论状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommentStatus {
    Pending,
    Approved,
    Spam,
}

impl CommentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentStatus::Pending => "pending",
            CommentStatus::Approved => "approved",
            CommentStatus::Spam => "spam",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CommentStatus::Pending => "待审核",
            CommentStatus::Approved => "已通过",
            CommentStatus::Spam => "垃圾评论",
        }
    }
}

impl FromStr for CommentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommentStatus::Pending),
            "approved" => Ok(CommentStatus::Approved),
            "spam" => Ok(CommentStatus::Spam),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub post_title: String,
    pub author: String,
    pub email: String,
    pub content: String,
    pub status: String,
    pub parent_id: Option<i64>,
    pub created_at: String,
}

impl Comment {
    pub fn status_label(&self) -> &'static str {
        CommentStatus::from_str(&self.status)
            .map(|s| s.label())
            .unwrap_or("未知")
    }

    pub fn is_pending(&self) -> bool {
        self.status == CommentStatus::Pending.as_str()
    }

    pub fn is_spam(&self) -> bool {
        self.status == CommentStatus::Spam.as_str()
    }

    pub fn created_display(&self) -> &str {
        self.created_at.get(..16).unwrap_or(&self.created_at)
    }
}

/// 各状态的评论数量
#[derive(Clone, Debug, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct StatusCounts {
    pub all: i64,
    pub pending: i64,
    pub approved: i64,
    pub spam: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentListQuery {
    status: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

#[derive(Template)]
#[template(path = "modules/comments/counts.html")]
pub struct CommentCountsTemplate {
    pub counts: StatusCounts,
}

#[derive(Template)]
#[template(path = "modules/comments/item.html")]
pub struct CommentItemTemplate {
    pub comment: Comment,
}

#[derive(Template)]
#[template(path = "modules/comments/list.html")]
pub struct CommentListTemplate {
    pub comments: Vec<Comment>,
    pub current_status: String,
    pub current_label: String,
    pub pagination: Pagination,
    pub nav: PaginationNav,
    pub start_item: i64,
    pub end_item: i64,
    pub links: PageLinks,
}

#[derive(Template)]
#[template(path = "modules/comments/index.html")]
pub struct CommentsPageTemplate {
    pub counts: CommentCountsTemplate,
    pub list: CommentListTemplate,
}

const COMMENT_COLUMNS: &str = "SELECT cm.id, cm.post_id, p.title AS post_title, cm.author, cm.email, \
     cm.content, cm.status, cm.parent_id, cm.created_at \
     FROM comments cm JOIN posts p ON p.id = cm.post_id";

/// 单次查询统计各状态数量
pub async fn get_status_counts(pool: &SqlitePool) -> Result<StatusCounts, sqlx::Error> {
    sqlx::query_as::<_, StatusCounts>(
        "SELECT COUNT(*) AS \"all\",
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) AS pending,
                COALESCE(SUM(CASE WHEN status = 'approved' THEN 1 ELSE 0 END), 0) AS approved,
                COALESCE(SUM(CASE WHEN status = 'spam' THEN 1 ELSE 0 END), 0) AS spam
         FROM comments",
    )
    .fetch_one(pool)
    .await
}

/// 统计失败时记录日志并显示为 0
async fn load_counts(pool: &SqlitePool) -> StatusCounts {
    get_status_counts(pool)
        .await
        .inspect_err(|e| tracing::warn!("统计评论数量失败: {}", e))
        .unwrap_or_default()
}

/// 评论项加上带外更新的状态计数
fn item_with_counts(comment: Comment, counts: StatusCounts) -> Html<String> {
    let item_html = CommentItemTemplate { comment }.render().unwrap_or_default();
    let counts_html = CommentCountsTemplate { counts }.render().unwrap_or_default();

    Html(format!(
        "{}<div id=\"comment-counts\" hx-swap-oob=\"true\">{}</div>",
        item_html, counts_html
    ))
}

pub async fn get_comment(pool: &SqlitePool, id: i64) -> Result<Comment, sqlx::Error> {
    sqlx::query_as::<_, Comment>(&format!("{} WHERE cm.id = ?", COMMENT_COLUMNS))
        .bind(id)
        .fetch_one(pool)
        .await
}

/// 查询一页评论，`status` 为 None 时返回全部
pub async fn get_comment_page(
    state: &AppState,
    status: Option<CommentStatus>,
    page_query: &PageQuery,
) -> Result<(Vec<Comment>, Pagination), sqlx::Error> {
    let pool = &state.pool;
    let status = status.map(|s| s.as_str());

    let total: i64 = track_db_query(
        "count_comments",
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE (?1 IS NULL OR status = ?1)")
            .bind(status)
            .fetch_one(pool),
    )
    .await?;

    let pagination = page_query.resolve(&state.config.pagination, total);

    let sql = format!(
        "{} WHERE (?1 IS NULL OR cm.status = ?1) ORDER BY cm.created_at DESC, cm.id DESC LIMIT ?2 OFFSET ?3",
        COMMENT_COLUMNS
    );
    let comments = track_db_query(
        "list_comments",
        sqlx::query_as::<_, Comment>(&sql)
            .bind(status)
            .bind(pagination.per_page)
            .bind(pagination.offset())
            .fetch_all(pool),
    )
    .await?;

    Ok((comments, pagination))
}

async fn load_list(state: &AppState, query: &CommentListQuery) -> Result<CommentListTemplate, sqlx::Error> {
    let status = query.status.as_deref().and_then(|s| s.parse::<CommentStatus>().ok());
    let page_query = PageQuery {
        page: query.page,
        per_page: query.per_page,
    };

    let (comments, pagination) = get_comment_page(state, status, &page_query).await?;
    let (start_item, end_item) =
        calculate_display_range(pagination.current_page, pagination.per_page, comments.len());
    let nav = PaginationNav::build(&pagination, state.window_size());

    Ok(CommentListTemplate {
        comments,
        current_status: status.map(|s| s.as_str()).unwrap_or("all").to_string(),
        current_label: status.map(|s| s.label()).unwrap_or("全部").to_string(),
        pagination,
        nav,
        start_item,
        end_item,
        links: PageLinks::new("/block/comments", "/dashboard/comments", "#comment-list")
            .include("#comment-filter")
            .filter("status", status.map(|s| s.as_str()).unwrap_or_default()),
    })
}

/// 直接访问 /dashboard/comments 返回完整页面
pub async fn page(State(state): State<AppState>, Query(query): Query<CommentListQuery>) -> impl IntoResponse {
    let counts = load_counts(&state.pool).await;

    match load_list(&state, &query).await {
        Ok(list) => CommentsPageTemplate {
            counts: CommentCountsTemplate { counts },
            list,
        }
        .into_response(),
        Err(e) => {
            tracing::error!("获取评论列表失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "获取评论列表失败").into_response()
        }
    }
}

/// 切换筛选状态或翻页时返回列表片段
pub async fn block(State(state): State<AppState>, Query(query): Query<CommentListQuery>) -> impl IntoResponse {
    match load_list(&state, &query).await {
        Ok(list) => list.into_response(),
        Err(e) => {
            tracing::error!("获取评论列表失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "获取评论列表失败").into_response()
        }
    }
}

async fn set_status(pool: &SqlitePool, id: i64, status: CommentStatus) -> impl IntoResponse {
    let result = sqlx::query("UPDATE comments SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => return StatusCode::NOT_FOUND.into_response(),
        Ok(_) => {}
        Err(e) => {
            tracing::error!("更新评论状态失败: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    tracing::info!("评论 {} 标记为 {}", id, status.as_str());

    let comment = match get_comment(pool, id).await {
        Ok(comment) => comment,
        Err(e) => {
            tracing::error!("获取评论失败: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let counts = load_counts(pool).await;

    // 返回评论项，并用 hx-swap-oob 更新状态计数
    item_with_counts(comment, counts).into_response()
}

pub async fn approve(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    set_status(&state.pool, id, CommentStatus::Approved).await
}

pub async fn spam(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    set_status(&state.pool, id, CommentStatus::Spam).await
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReplyForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 1000, message = "回复内容长度必须在 1 到 1000 个字符之间"))]
    pub content: String,
}

/// 以管理员身份回复评论，回复直接通过审核
pub async fn create_reply(pool: &SqlitePool, parent_id: i64, content: &str) -> Result<Comment, FormError> {
    let id: Option<i64> = sqlx::query_scalar(
        "INSERT INTO comments (post_id, author, email, content, status, parent_id)
         SELECT post_id, ?, ?, ?, 'approved', id FROM comments WHERE id = ?
         RETURNING id",
    )
    .bind(REPLY_AUTHOR)
    .bind(REPLY_EMAIL)
    .bind(content)
    .bind(parent_id)
    .fetch_optional(pool)
    .await?;

    let id = id.ok_or(FormError::NotFound)?;
    Ok(get_comment(pool, id).await?)
}

/// 回复内容插入到被回复的评论之后
pub async fn reply(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<ReplyForm>,
) -> Result<Html<String>, FormError> {
    let form = ReplyForm {
        content: form.content.trim().to_string(),
    };
    validate_input(&form)?;

    let comment = create_reply(&state.pool, id, &form.content).await?;
    tracing::info!("回复评论 {} -> {}", id, comment.id);

    let counts = load_counts(&state.pool).await;
    Ok(item_with_counts(comment, counts))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    let result = sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => StatusCode::NOT_FOUND.into_response(),
        Ok(_) => {
            let counts = load_counts(&state.pool).await;
            let counts_html = CommentCountsTemplate { counts }.render().unwrap_or_default();
            Html(format!(
                "<div id=\"comment-counts\" hx-swap-oob=\"true\">{}</div>",
                counts_html
            ))
            .into_response()
        }
        Err(e) => {
            tracing::error!("删除评论失败: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
