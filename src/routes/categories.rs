use askama::Template;
use askama_axum::IntoResponse;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Form,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::helpers::monitoring::{track_db_query, AppState};
use crate::security::{sanitize_log_message, validate_input, FormError, SLUG_REGEX};

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub post_count: i64,
}

#[derive(Template)]
#[template(path = "modules/categories/index.html")]
pub struct CategoriesPageTemplate {
    pub categories: Vec<Category>,
}

#[derive(Template)]
#[template(path = "modules/categories/item.html")]
pub struct CategoryItemTemplate {
    pub category: Category,
}

#[derive(Template)]
#[template(path = "modules/categories/edit.html")]
pub struct CategoryEditTemplate {
    pub category: Category,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryForm {
    #[validate(length(min = 1, max = 50, message = "分类名称长度必须在 1 到 50 个字符之间"))]
    pub name: String,
    #[validate(
        length(min = 1, max = 50, message = "分类别名长度必须在 1 到 50 个字符之间"),
        regex(path = "SLUG_REGEX", message = "分类别名只能包含小写字母、数字和连字符")
    )]
    pub slug: String,
    #[serde(default)]
    #[validate(length(max = 200, message = "分类描述不能超过 200 个字符"))]
    pub description: String,
}

impl CategoryForm {
    fn trimmed(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            slug: self.slug.trim().to_string(),
            description: self.description.trim().to_string(),
        }
    }
}

/// 获取所有分类及其文章数量
pub async fn get_all_categories(pool: &SqlitePool) -> Result<Vec<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>(
        "SELECT c.id, c.name, c.slug, c.description, COUNT(p.id) AS post_count
         FROM categories c LEFT JOIN posts p ON p.category_id = c.id
         GROUP BY c.id ORDER BY c.id",
    )
    .fetch_all(pool)
    .await
}

pub async fn get_category(pool: &SqlitePool, id: i64) -> Result<Option<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>(
        "SELECT c.id, c.name, c.slug, c.description,
                (SELECT COUNT(*) FROM posts p WHERE p.category_id = c.id) AS post_count
         FROM categories c WHERE c.id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn page(State(state): State<AppState>) -> impl IntoResponse {
    match track_db_query("list_categories", get_all_categories(&state.pool)).await {
        Ok(categories) => CategoriesPageTemplate { categories }.into_response(),
        Err(e) => {
            tracing::error!("获取分类列表失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "获取分类列表失败").into_response()
        }
    }
}

pub async fn create(
    State(state): State<AppState>,
    Form(form): Form<CategoryForm>,
) -> Result<CategoryItemTemplate, FormError> {
    let form = form.trimmed();
    validate_input(&form)?;

    let category = sqlx::query_as::<_, Category>(
        "INSERT INTO categories (name, slug, description) VALUES (?, ?, ?)
         RETURNING id, name, slug, description, 0 AS post_count",
    )
    .bind(&form.name)
    .bind(&form.slug)
    .bind(&form.description)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| FormError::from_write(e, "分类别名"))?;

    tracing::info!("创建分类: {}", sanitize_log_message(&category.name));
    Ok(CategoryItemTemplate { category })
}

/// 取消编辑时返回分类卡片
pub async fn item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<CategoryItemTemplate, FormError> {
    let category = get_category(&state.pool, id).await?.ok_or(FormError::NotFound)?;
    Ok(CategoryItemTemplate { category })
}

/// 用编辑表单替换分类卡片
pub async fn edit_form(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<CategoryEditTemplate, FormError> {
    let category = get_category(&state.pool, id).await?.ok_or(FormError::NotFound)?;
    Ok(CategoryEditTemplate { category })
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<CategoryForm>,
) -> Result<CategoryItemTemplate, FormError> {
    let form = form.trimmed();
    validate_input(&form)?;

    let done = sqlx::query("UPDATE categories SET name = ?, slug = ?, description = ? WHERE id = ?")
        .bind(&form.name)
        .bind(&form.slug)
        .bind(&form.description)
        .bind(id)
        .execute(&state.pool)
        .await
        .map_err(|e| FormError::from_write(e, "分类别名"))?;
    if done.rows_affected() == 0 {
        return Err(FormError::NotFound);
    }

    tracing::info!("更新分类 {}: {}", id, sanitize_log_message(&form.name));
    let category = get_category(&state.pool, id).await?.ok_or(FormError::NotFound)?;
    Ok(CategoryItemTemplate { category })
}

/// 删除分类，该分类下的文章变为未分类
pub async fn delete(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    let result = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => StatusCode::NOT_FOUND.into_response(),
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::error!("删除分类失败: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
