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
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub post_count: i64,
}

impl Tag {
    /// 标签云中的字号等级（1-4），按文章数量分档
    pub fn weight(&self) -> u8 {
        match self.post_count {
            0..=2 => 1,
            3..=9 => 2,
            10..=19 => 3,
            _ => 4,
        }
    }
}

#[derive(Template)]
#[template(path = "modules/tags/index.html")]
pub struct TagsPageTemplate {
    pub tags: Vec<Tag>,
}

#[derive(Template)]
#[template(path = "modules/tags/item.html")]
pub struct TagItemTemplate {
    pub tag: Tag,
}

#[derive(Template)]
#[template(path = "modules/tags/edit.html")]
pub struct TagEditTemplate {
    pub tag: Tag,
}

/// 标签表单，校验规则与分类的名称和别名一致
#[derive(Debug, Deserialize, Validate)]
pub struct TagForm {
    #[validate(length(min = 1, max = 50, message = "标签名称长度必须在 1 到 50 个字符之间"))]
    pub name: String,
    #[validate(
        length(min = 1, max = 50, message = "标签别名长度必须在 1 到 50 个字符之间"),
        regex(path = "SLUG_REGEX", message = "标签别名只能包含小写字母、数字和连字符")
    )]
    pub slug: String,
}

impl TagForm {
    fn trimmed(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            slug: self.slug.trim().to_string(),
        }
    }
}

pub async fn get_all_tags(pool: &SqlitePool) -> Result<Vec<Tag>, sqlx::Error> {
    sqlx::query_as::<_, Tag>(
        "SELECT t.id, t.name, t.slug, COUNT(pt.post_id) AS post_count
         FROM tags t LEFT JOIN post_tags pt ON pt.tag_id = t.id
         GROUP BY t.id ORDER BY post_count DESC, t.name",
    )
    .fetch_all(pool)
    .await
}

pub async fn get_tag(pool: &SqlitePool, id: i64) -> Result<Option<Tag>, sqlx::Error> {
    sqlx::query_as::<_, Tag>(
        "SELECT t.id, t.name, t.slug,
                (SELECT COUNT(*) FROM post_tags pt WHERE pt.tag_id = t.id) AS post_count
         FROM tags t WHERE t.id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn page(State(state): State<AppState>) -> impl IntoResponse {
    match track_db_query("list_tags", get_all_tags(&state.pool)).await {
        Ok(tags) => TagsPageTemplate { tags }.into_response(),
        Err(e) => {
            tracing::error!("获取标签列表失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "获取标签列表失败").into_response()
        }
    }
}

pub async fn create(
    State(state): State<AppState>,
    Form(form): Form<TagForm>,
) -> Result<TagItemTemplate, FormError> {
    let form = form.trimmed();
    validate_input(&form)?;

    let tag = sqlx::query_as::<_, Tag>(
        "INSERT INTO tags (name, slug) VALUES (?, ?) RETURNING id, name, slug, 0 AS post_count",
    )
    .bind(&form.name)
    .bind(&form.slug)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| FormError::from_write(e, "标签别名"))?;

    tracing::info!("创建标签: {}", sanitize_log_message(&tag.name));
    Ok(TagItemTemplate { tag })
}

pub async fn item(State(state): State<AppState>, Path(id): Path<i64>) -> Result<TagItemTemplate, FormError> {
    let tag = get_tag(&state.pool, id).await?.ok_or(FormError::NotFound)?;
    Ok(TagItemTemplate { tag })
}

pub async fn edit_form(State(state): State<AppState>, Path(id): Path<i64>) -> Result<TagEditTemplate, FormError> {
    let tag = get_tag(&state.pool, id).await?.ok_or(FormError::NotFound)?;
    Ok(TagEditTemplate { tag })
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<TagForm>,
) -> Result<TagItemTemplate, FormError> {
    let form = form.trimmed();
    validate_input(&form)?;

    let done = sqlx::query("UPDATE tags SET name = ?, slug = ? WHERE id = ?")
        .bind(&form.name)
        .bind(&form.slug)
        .bind(id)
        .execute(&state.pool)
        .await
        .map_err(|e| FormError::from_write(e, "标签别名"))?;
    if done.rows_affected() == 0 {
        return Err(FormError::NotFound);
    }

    tracing::info!("更新标签 {}: {}", id, sanitize_log_message(&form.name));
    let tag = get_tag(&state.pool, id).await?.ok_or(FormError::NotFound)?;
    Ok(TagItemTemplate { tag })
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    let result = sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => StatusCode::NOT_FOUND.into_response(),
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::error!("删除标签失败: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
