//! 文章管理路由
//!
//! 文章列表支持按标题、分类、状态筛选，并使用分页导航条

use askama::Template;
use askama_axum::IntoResponse;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Form;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use validator::Validate;

use super::categories::{get_all_categories, Category};
use crate::helpers::monitoring::{track_db_query, AppState};
use crate::helpers::pagination::{
    calculate_display_range, PageItem, PageLinks, PageQuery, Pagination, PaginationNav,
};
use crate::security::{sanitize_log_message, validate_input, FormError, SLUG_REGEX};

/// 文章状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostStatus {
    Draft,
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PostStatus::Draft => "草稿",
            PostStatus::Published => "已发布",
            PostStatus::Archived => "已归档",
        }
    }
}

impl FromStr for PostStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            "archived" => Ok(PostStatus::Archived),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub summary: String,
    pub status: String,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub view_count: i64,
    pub comment_count: i64,
    pub created_at: String,
}

impl Post {
    pub fn status_label(&self) -> &'static str {
        PostStatus::from_str(&self.status)
            .map(|s| s.label())
            .unwrap_or("未知")
    }

    /// 精确到分钟的创建时间
    pub fn created_display(&self) -> &str {
        self.created_at.get(..16).unwrap_or(&self.created_at)
    }
}

/// 文章列表查询参数，空值和无法识别的筛选值会被忽略
#[derive(Debug, Default, Deserialize)]
pub struct PostListQuery {
    title: Option<String>,
    category: Option<String>,
    status: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

/// 解析后的文章筛选条件
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostFilters {
    pub title: String,
    pub category: Option<i64>,
    pub status: Option<PostStatus>,
}

impl PostFilters {
    pub fn from_query(query: &PostListQuery) -> Self {
        Self {
            title: query.title.as_deref().unwrap_or("").trim().to_string(),
            category: query
                .category
                .as_deref()
                .and_then(|c| c.trim().parse().ok()),
            status: query.status.as_deref().and_then(|s| s.parse().ok()),
        }
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if !self.title.is_empty() {
            qb.push(" AND p.title LIKE ")
                .push_bind(format!("%{}%", self.title));
        }
        if let Some(category) = self.category {
            qb.push(" AND p.category_id = ").push_bind(category);
        }
        if let Some(status) = self.status {
            qb.push(" AND p.status = ").push_bind(status.as_str());
        }
    }

    pub fn is_category(&self, id: &i64) -> bool {
        self.category == Some(*id)
    }

    pub fn is_status(&self, status: &str) -> bool {
        self.status.map(|s| s.as_str()) == Some(status)
    }
}

/// 一页文章及其分页信息
pub struct PostPage {
    pub posts: Vec<Post>,
    pub pagination: Pagination,
    pub start_item: i64,
    pub end_item: i64,
}

/// 统计满足筛选条件的文章数量
pub async fn count_posts(pool: &SqlitePool, filters: &PostFilters) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p");
    filters.push_where(&mut qb);
    let total = qb.build_query_scalar::<i64>().fetch_one(pool).await?;
    Ok(total)
}

/// 查询一页文章，页码超出范围时回落到最后一页
pub async fn get_post_page(
    state: &AppState,
    filters: &PostFilters,
    page_query: &PageQuery,
) -> Result<PostPage, sqlx::Error> {
    let pool = &state.pool;
    let total = track_db_query("count_posts", count_posts(pool, filters)).await?;
    let pagination = page_query.resolve(&state.config.pagination, total);

    let mut qb = QueryBuilder::new(
        "SELECT p.id, p.title, p.slug, p.summary, p.status, p.category_id, \
         c.name AS category_name, p.view_count, \
         (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count, \
         p.created_at \
         FROM posts p LEFT JOIN categories c ON c.id = p.category_id",
    );
    filters.push_where(&mut qb);
    qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ")
        .push_bind(pagination.per_page)
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let posts = track_db_query("list_posts", qb.build_query_as::<Post>().fetch_all(pool)).await?;
    let (start_item, end_item) =
        calculate_display_range(pagination.current_page, pagination.per_page, posts.len());

    Ok(PostPage {
        posts,
        pagination,
        start_item,
        end_item,
    })
}

// 文章列表片段（表格 + 分页导航）
#[derive(Template)]
#[template(path = "modules/posts/list.html")]
pub struct PostListTemplate {
    pub posts: Vec<Post>,
    pub pagination: Pagination,
    pub nav: PaginationNav,
    pub start_item: i64,
    pub end_item: i64,
    pub links: PageLinks,
}

// 完整页面（包含筛选表单）
#[derive(Template)]
#[template(path = "modules/posts/index.html")]
pub struct PostsPageTemplate {
    pub list: PostListTemplate,
    pub categories: Vec<Category>,
    pub filters: PostFilters,
}

async fn load_list(state: &AppState, query: &PostListQuery) -> Result<(PostFilters, PostListTemplate), sqlx::Error> {
    let filters = PostFilters::from_query(query);
    let page_query = PageQuery {
        page: query.page,
        per_page: query.per_page,
    };

    let page = get_post_page(state, &filters, &page_query).await?;
    let nav = PaginationNav::build(&page.pagination, state.window_size());

    let links = PageLinks::new("/block/posts", "/dashboard/posts", "#post-list")
        .include("#post-filters")
        .filter("title", filters.title.as_str())
        .filter("category", filters.category.map(|c| c.to_string()).unwrap_or_default())
        .filter("status", filters.status.map(|s| s.as_str()).unwrap_or_default());

    let list = PostListTemplate {
        posts: page.posts,
        pagination: page.pagination,
        nav,
        start_item: page.start_item,
        end_item: page.end_item,
        links,
    };

    Ok((filters, list))
}

/// 直接访问 /dashboard/posts 返回完整页面
pub async fn page(State(state): State<AppState>, Query(query): Query<PostListQuery>) -> impl IntoResponse {
    let categories = get_all_categories(&state.pool)
        .await
        .inspect_err(|e| tracing::warn!("获取分类列表失败: {}", e))
        .unwrap_or_default();

    match load_list(&state, &query).await {
        Ok((filters, list)) => PostsPageTemplate {
            list,
            categories,
            filters,
        }
        .into_response(),
        Err(e) => {
            tracing::error!("获取文章列表失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "获取文章列表失败").into_response()
        }
    }
}

/// 筛选或翻页时返回列表片段
pub async fn block(State(state): State<AppState>, Query(query): Query<PostListQuery>) -> impl IntoResponse {
    match load_list(&state, &query).await {
        Ok((_, list)) => list.into_response(),
        Err(e) => {
            tracing::error!("获取文章列表失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "获取文章列表失败").into_response()
        }
    }
}

/// 删除文章，评论和标签关联随之级联删除
pub async fn delete(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    let result = sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => StatusCode::NOT_FOUND.into_response(),
        Ok(_) => {
            tracing::info!("删除文章 {}", id);
            // 返回空内容，htmx 会移除当前行
            StatusCode::OK.into_response()
        }
        Err(e) => {
            tracing::error!("删除文章失败: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// 编辑表单中展示的文章数据，`tags` 为逗号分隔的标签别名
#[derive(Clone, Debug, Default, sqlx::FromRow)]
pub struct PostDraft {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub summary: String,
    pub content: String,
    pub status: String,
    pub category_id: Option<i64>,
    pub tags: String,
}

impl PostDraft {
    pub fn is_new(&self) -> bool {
        self.id == 0
    }

    pub fn is_category(&self, id: &i64) -> bool {
        self.category_id == Some(*id)
    }

    pub fn is_status(&self, status: &str) -> bool {
        self.status == status
    }
}

/// 新建/编辑文章页面
#[derive(Template)]
#[template(path = "modules/posts/form.html")]
pub struct PostFormTemplate {
    pub post: PostDraft,
    pub categories: Vec<Category>,
}

/// 保存成功后的提示
#[derive(Template)]
#[template(path = "modules/posts/saved.html")]
pub struct PostSavedTemplate {
    pub id: i64,
    pub title: String,
}

/// 文章表单
#[derive(Debug, Default, Deserialize, Validate)]
pub struct PostForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "文章标题长度必须在 1 到 100 个字符之间"))]
    pub title: String,
    #[serde(default)]
    #[validate(
        length(min = 1, max = 100, message = "文章别名长度必须在 1 到 100 个字符之间"),
        regex(path = "SLUG_REGEX", message = "文章别名只能包含小写字母、数字和连字符")
    )]
    pub slug: String,
    #[serde(default)]
    #[validate(length(max = 300, message = "文章摘要不能超过 300 个字符"))]
    pub summary: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "文章内容不能为空"))]
    pub content: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: String,
}

/// 校验通过的文章数据
#[derive(Debug, PartialEq, Eq)]
pub struct PostInput {
    pub title: String,
    pub slug: String,
    pub summary: String,
    pub content: String,
    pub status: PostStatus,
    pub category_id: Option<i64>,
    pub tag_slugs: Vec<String>,
}

impl PostForm {
    /// 去掉首尾空白后校验，并解析状态、分类和标签
    pub fn into_input(self) -> Result<PostInput, FormError> {
        let form = PostForm {
            title: self.title.trim().to_string(),
            slug: self.slug.trim().to_string(),
            summary: self.summary.trim().to_string(),
            content: self.content.trim().to_string(),
            ..self
        };
        validate_input(&form)?;

        let status = form
            .status
            .trim()
            .parse::<PostStatus>()
            .map_err(|_| FormError::Validation("文章状态无效".to_string()))?;

        let category_id = match form.category.trim() {
            "" => None,
            id => Some(
                id.parse::<i64>()
                    .map_err(|_| FormError::Validation("文章分类无效".to_string()))?,
            ),
        };

        let mut tag_slugs: Vec<String> = form
            .tags
            .split(',')
            .map(str::trim)
            .filter(|slug| !slug.is_empty())
            .map(str::to_string)
            .collect();
        tag_slugs.sort();
        tag_slugs.dedup();

        Ok(PostInput {
            title: form.title,
            slug: form.slug,
            summary: form.summary,
            content: form.content,
            status,
            category_id,
            tag_slugs,
        })
    }
}

pub async fn get_post_draft(pool: &SqlitePool, id: i64) -> Result<Option<PostDraft>, sqlx::Error> {
    sqlx::query_as::<_, PostDraft>(
        "SELECT p.id, p.title, p.slug, p.summary, p.content, p.status, p.category_id,
                COALESCE((SELECT GROUP_CONCAT(t.slug, ',')
                          FROM post_tags pt JOIN tags t ON t.id = pt.tag_id
                          WHERE pt.post_id = p.id), '') AS tags
         FROM posts p WHERE p.id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// 在一个事务内写入文章及其标签，`id` 为 None 时新建
///
/// 分类或标签不存在时返回验证错误，别名重复时返回冲突
pub async fn save_post(pool: &SqlitePool, id: Option<i64>, input: &PostInput) -> Result<i64, FormError> {
    let mut tx = pool.begin().await?;

    if let Some(category_id) = input.category_id {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE id = ?")
            .bind(category_id)
            .fetch_one(&mut *tx)
            .await?;
        if exists == 0 {
            return Err(FormError::Validation("文章分类不存在".to_string()));
        }
    }

    let mut tag_ids = Vec::with_capacity(input.tag_slugs.len());
    for slug in &input.tag_slugs {
        let tag_id: Option<i64> = sqlx::query_scalar("SELECT id FROM tags WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&mut *tx)
            .await?;
        match tag_id {
            Some(tag_id) => tag_ids.push(tag_id),
            None => return Err(FormError::Validation(format!("标签不存在: {}", slug))),
        }
    }

    let post_id = match id {
        None => sqlx::query_scalar::<_, i64>(
            "INSERT INTO posts (title, slug, summary, content, status, category_id)
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&input.title)
        .bind(&input.slug)
        .bind(&input.summary)
        .bind(&input.content)
        .bind(input.status.as_str())
        .bind(input.category_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| FormError::from_write(e, "文章别名"))?,
        Some(id) => {
            let done = sqlx::query(
                "UPDATE posts SET title = ?, slug = ?, summary = ?, content = ?, status = ?, category_id = ?
                 WHERE id = ?",
            )
            .bind(&input.title)
            .bind(&input.slug)
            .bind(&input.summary)
            .bind(&input.content)
            .bind(input.status.as_str())
            .bind(input.category_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| FormError::from_write(e, "文章别名"))?;
            if done.rows_affected() == 0 {
                return Err(FormError::NotFound);
            }

            sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            id
        }
    };

    for tag_id in tag_ids {
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(post_id)
}

async fn form_page(state: &AppState, post: PostDraft) -> Response {
    match get_all_categories(&state.pool).await {
        Ok(categories) => PostFormTemplate { post, categories }.into_response(),
        Err(e) => {
            tracing::error!("获取分类列表失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "获取分类列表失败").into_response()
        }
    }
}

/// 新建文章页面
pub async fn new_page(State(state): State<AppState>) -> impl IntoResponse {
    let post = PostDraft {
        status: PostStatus::Draft.as_str().to_string(),
        ..Default::default()
    };
    form_page(&state, post).await
}

/// 编辑文章页面
pub async fn edit_page(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match get_post_draft(&state.pool, id).await {
        Ok(Some(post)) => form_page(&state, post).await,
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!("获取文章失败: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// 新建文章，成功后让 htmx 跳转到编辑页
pub async fn create(State(state): State<AppState>, Form(form): Form<PostForm>) -> Result<Response, FormError> {
    let input = form.into_input()?;
    let id = save_post(&state.pool, None, &input).await?;

    tracing::info!("创建文章 {}: {}", id, sanitize_log_message(&input.title));
    Ok([("HX-Redirect", format!("/dashboard/posts/{}/edit", id))].into_response())
}

/// 保存文章修改
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<PostForm>,
) -> Result<PostSavedTemplate, FormError> {
    let input = form.into_input()?;
    save_post(&state.pool, Some(id), &input).await?;

    tracing::info!("更新文章 {}", id);
    Ok(PostSavedTemplate {
        id,
        title: input.title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::test_pool;
    use std::sync::Arc;

    async fn state() -> AppState {
        AppState::new(test_pool().await, Arc::new(AppConfig::default()))
    }

    fn query(pairs: &[(&str, &str)]) -> PostListQuery {
        let mut q = PostListQuery::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "title" => q.title = value,
                "category" => q.category = value,
                "status" => q.status = value,
                _ => unreachable!(),
            }
        }
        q
    }

    #[test]
    fn filters_ignore_empty_and_unknown_values() {
        let filters = PostFilters::from_query(&query(&[
            ("title", "  "),
            ("category", ""),
            ("status", "deleted"),
        ]));
        assert_eq!(filters, PostFilters::default());

        let filters = PostFilters::from_query(&query(&[
            ("title", " 示例 "),
            ("category", "2"),
            ("status", "draft"),
        ]));
        assert_eq!(filters.title, "示例");
        assert!(filters.is_category(&2));
        assert!(filters.is_status("draft"));
        assert!(!filters.is_status("published"));
    }

    #[tokio::test]
    async fn first_page_uses_default_page_size() {
        let state = state().await;
        let page = get_post_page(&state, &PostFilters::default(), &PageQuery::default())
            .await
            .unwrap();

        assert_eq!(page.pagination.total, 47);
        assert_eq!(page.pagination.total_pages, 5);
        assert_eq!(page.posts.len(), 10);
        assert_eq!((page.start_item, page.end_item), (1, 10));
    }

    #[tokio::test]
    async fn page_past_the_end_falls_back_to_last_page() {
        let state = state().await;
        let page_query = PageQuery {
            page: Some(99),
            per_page: None,
        };
        let page = get_post_page(&state, &PostFilters::default(), &page_query)
            .await
            .unwrap();

        assert_eq!(page.pagination.current_page, 5);
        assert_eq!(page.posts.len(), 7);
        assert_eq!((page.start_item, page.end_item), (41, 47));
    }

    #[tokio::test]
    async fn status_filter_narrows_results() {
        let state = state().await;
        let filters = PostFilters {
            status: Some(PostStatus::Draft),
            ..Default::default()
        };

        let total = count_posts(&state.pool, &filters).await.unwrap();
        let page = get_post_page(&state, &filters, &PageQuery::default())
            .await
            .unwrap();

        assert!(total > 0 && total < 47);
        assert!(page.posts.iter().all(|p| p.status == "draft"));
    }

    #[tokio::test]
    async fn title_filter_without_matches_is_empty() {
        let state = state().await;
        let filters = PostFilters {
            title: "不存在的标题".to_string(),
            ..Default::default()
        };
        let page = get_post_page(&state, &filters, &PageQuery::default())
            .await
            .unwrap();

        assert!(page.posts.is_empty());
        assert_eq!(page.pagination.total_pages, 0);
        assert!(PaginationNav::build(&page.pagination, 5).is_empty());
    }

    fn post_form(title: &str, slug: &str, status: &str, category: &str, tags: &str) -> PostForm {
        PostForm {
            title: title.to_string(),
            slug: slug.to_string(),
            summary: String::new(),
            content: "正文".to_string(),
            status: status.to_string(),
            category: category.to_string(),
            tags: tags.to_string(),
        }
    }

    #[test]
    fn post_form_is_trimmed_and_parsed() {
        let input = post_form(" 新文章 ", "new-post", "published", "2", "rust, htmx,,rust ")
            .into_input()
            .unwrap();

        assert_eq!(input.title, "新文章");
        assert_eq!(input.status, PostStatus::Published);
        assert_eq!(input.category_id, Some(2));
        assert_eq!(input.tag_slugs, vec!["htmx".to_string(), "rust".to_string()]);

        let input = post_form("无分类", "no-category", "draft", "", "").into_input().unwrap();
        assert_eq!(input.category_id, None);
        assert!(input.tag_slugs.is_empty());
    }

    #[test]
    fn post_form_rejects_invalid_values() {
        for form in [
            post_form("", "empty-title", "draft", "", ""),
            post_form("标题", "Bad Slug", "draft", "", ""),
            post_form("标题", "ok", "deleted", "", ""),
            post_form("标题", "ok", "draft", "abc", ""),
            PostForm {
                content: "   ".to_string(),
                ..post_form("标题", "ok", "draft", "", "")
            },
        ] {
            assert!(matches!(form.into_input(), Err(FormError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn save_post_creates_and_updates_tags() {
        let pool = test_pool().await;

        let input = post_form("新文章", "brand-new", "draft", "1", "rust,htmx")
            .into_input()
            .unwrap();
        let id = save_post(&pool, None, &input).await.unwrap();

        let draft = get_post_draft(&pool, id).await.unwrap().unwrap();
        assert_eq!(draft.title, "新文章");
        assert_eq!(draft.category_id, Some(1));
        let mut tags: Vec<&str> = draft.tags.split(',').collect();
        tags.sort();
        assert_eq!(tags, vec!["htmx", "rust"]);

        let input = post_form("改过的标题", "brand-new", "published", "", "sqlite")
            .into_input()
            .unwrap();
        assert_eq!(save_post(&pool, Some(id), &input).await.unwrap(), id);

        let draft = get_post_draft(&pool, id).await.unwrap().unwrap();
        assert_eq!(draft.title, "改过的标题");
        assert_eq!(draft.status, "published");
        assert_eq!(draft.category_id, None);
        assert_eq!(draft.tags, "sqlite");
    }

    #[tokio::test]
    async fn save_post_rejects_unknown_references_and_duplicates() {
        let pool = test_pool().await;

        let unknown_tag = post_form("标题", "fresh-slug", "draft", "", "nope")
            .into_input()
            .unwrap();
        assert!(matches!(
            save_post(&pool, None, &unknown_tag).await,
            Err(FormError::Validation(_))
        ));

        let unknown_category = post_form("标题", "fresh-slug", "draft", "999", "")
            .into_input()
            .unwrap();
        assert!(matches!(
            save_post(&pool, None, &unknown_category).await,
            Err(FormError::Validation(_))
        ));

        let duplicate = post_form("标题", "sample-post-1", "draft", "", "")
            .into_input()
            .unwrap();
        assert!(matches!(
            save_post(&pool, None, &duplicate).await,
            Err(FormError::Conflict(_))
        ));

        let missing = post_form("标题", "fresh-slug", "draft", "", "")
            .into_input()
            .unwrap();
        assert!(matches!(
            save_post(&pool, Some(999), &missing).await,
            Err(FormError::NotFound)
        ));
    }
}
