//! 路由模块
//!
//! /dashboard 开头返回完整页面，/block 开头返回 HTML 片段，
//! /api 开头执行修改操作后返回 HTML 片段

pub mod categories;
pub mod comments;
pub mod pages;
pub mod posts;
pub mod static_assets;
pub mod tags;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::helpers::monitoring::{health_check, metrics_handler, metrics_middleware, AppState};

/// 表单请求体上限
const MAX_BODY_BYTES: usize = 64 * 1024;

/// 组装全部路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::root))
        .route("/dashboard", get(pages::index))
        .route("/dashboard/posts", get(posts::page))
        .route("/dashboard/posts/new", get(posts::new_page))
        .route("/dashboard/posts/:id/edit", get(posts::edit_page))
        .route("/dashboard/comments", get(comments::page))
        .route("/dashboard/categories", get(categories::page))
        .route("/dashboard/tags", get(tags::page))
        .route("/block/posts", get(posts::block))
        .route("/block/comments", get(comments::block))
        .route("/block/categories/:id", get(categories::item))
        .route("/block/categories/:id/edit", get(categories::edit_form))
        .route("/block/tags/:id", get(tags::item))
        .route("/block/tags/:id/edit", get(tags::edit_form))
        .route("/api/posts", post(posts::create))
        .route("/api/posts/:id", put(posts::update).delete(posts::delete))
        .route("/api/comments/:id", delete(comments::delete))
        .route("/api/comments/:id/approve", put(comments::approve))
        .route("/api/comments/:id/spam", put(comments::spam))
        .route("/api/comments/:id/reply", post(comments::reply))
        .route("/api/categories", post(categories::create))
        .route("/api/categories/:id", put(categories::update).delete(categories::delete))
        .route("/api/tags", post(tags::create))
        .route("/api/tags/:id", put(tags::update).delete(tags::delete))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/static/*path", get(static_assets::static_handler))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::test_pool;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> Router {
        router(AppState::new(test_pool().await, Arc::new(AppConfig::default())))
    }

    async fn send(app: Router, method: Method, uri: &str, form: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match form {
            Some(form) => {
                builder = builder.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
                Body::from(form.to_string())
            }
            None => Body::empty(),
        };

        let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn get_page(uri: &str) -> (StatusCode, String) {
        send(app().await, Method::GET, uri, None).await
    }

    #[tokio::test]
    async fn root_redirects_to_dashboard() {
        let response = app()
            .await
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/dashboard");
    }

    #[tokio::test]
    async fn dashboard_shows_counts() {
        let (status, body) = get_page("/dashboard").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("待审核评论"));
        assert!(body.contains("<h3>47</h3>"));
    }

    #[tokio::test]
    async fn posts_page_renders_first_window() {
        let (status, body) = get_page("/dashboard/posts").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("id=\"post-filters\""));
        assert!(body.contains("显示第 1–10 篇，共 47 篇"));
        assert!(body.contains("aria-current=\"page\""));
        // 5 页正好等于窗口大小，不需要省略号
        assert!(!body.contains("class=\"ellipsis\""));
        assert!(body.contains("hx-get=\"/block/posts?page=5&per_page=10\""));
        assert!(body.contains("href=\"/dashboard/posts?page=5&per_page=10\""));
        assert!(body.contains("<span class=\"disabled\" aria-disabled=\"true\">上一页</span>"));
    }

    #[tokio::test]
    async fn posts_block_respects_page_and_per_page() {
        let (status, body) = get_page("/block/posts?page=7&per_page=5").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.contains("<html"));
        assert!(body.contains("显示第 31–35 篇，共 47 篇"));
        // 共 10 页，当前第 7 页：1 … 5 6 7 8 9 10
        assert!(body.contains("class=\"ellipsis\""));
        assert!(body.contains("hx-get=\"/block/posts?page=1&per_page=5\""));
        assert!(body.contains("hx-get=\"/block/posts?page=10&per_page=5\""));
        assert!(!body.contains("hx-get=\"/block/posts?page=4&"));
    }

    #[tokio::test]
    async fn following_next_link_keeps_page_size() {
        let (_, body) = get_page("/block/posts?page=7&per_page=5").await;
        let next = "hx-get=\"/block/posts?page=8&per_page=5\"";
        assert!(body.contains(next));

        let (status, body) = get_page("/block/posts?page=8&per_page=5").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("显示第 36–40 篇，共 47 篇"));
    }

    #[tokio::test]
    async fn plain_links_point_at_full_pages_with_filters() {
        let (_, body) = get_page("/block/posts?status=published&title=%E7%A4%BA%E4%BE%8B&per_page=5").await;
        assert!(body.contains("href=\"/dashboard/posts?page=2&per_page=5&title=%E7%A4%BA%E4%BE%8B&status=published\""));
        assert!(body.contains("hx-get=\"/block/posts?page=2&per_page=5\""));
        assert!(!body.contains("href=\"/block/"));

        let (_, body) = get_page("/block/comments?status=spam&per_page=5").await;
        assert!(body.contains("href=\"/dashboard/comments?page=2&per_page=5&status=spam\""));
    }

    #[tokio::test]
    async fn posts_block_with_unmatched_filter_is_empty() {
        let (status, body) = get_page("/block/posts?title=nothing-here&status=&category=").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("没有符合条件的文章"));
        assert!(!body.contains("class=\"pagination\""));
    }

    #[tokio::test]
    async fn comments_filter_by_status() {
        let (status, body) = get_page("/dashboard/comments?status=spam").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("value=\"spam\""));
        assert!(body.contains("垃圾评论 (16)"));
        assert!(!body.contains(">通过</button>"));
    }

    #[tokio::test]
    async fn approving_a_comment_updates_counts() {
        let app = app().await;
        // 第 4 条评论是待审核状态
        let (status, body) = send(app.clone(), Method::PUT, "/api/comments/4/approve", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("id=\"comment-4\""));
        assert!(body.contains("hx-swap-oob=\"true\""));
        assert!(body.contains("待审核 (15)"));

        let (status, _) = send(app, Method::PUT, "/api/comments/9999/spam", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn creating_categories_validates_and_rejects_duplicates() {
        let app = app().await;

        let (status, body) =
            send(app.clone(), Method::POST, "/api/categories", Some("name=Go&slug=Go+Lang")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.contains("分类别名只能包含小写字母、数字和连字符"));

        let (status, body) =
            send(app.clone(), Method::POST, "/api/categories", Some("name=Go&slug=go")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/go · 0 篇文章"));

        let (status, _) = send(app, Method::POST, "/api/categories", Some("name=Go&slug=go")).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn creating_and_deleting_tags() {
        let app = app().await;

        let (status, body) = send(app.clone(), Method::POST, "/api/tags", Some("name=Axum&slug=axum")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("#Axum"));

        let (status, _) = send(app.clone(), Method::DELETE, "/api/tags/1", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(app, Method::DELETE, "/api/tags/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleting_missing_post_is_not_found() {
        let (status, _) = send(app().await, Method::DELETE, "/api/posts/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_and_static_assets() {
        let (status, body) = get_page("/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["database"], "ok");

        let response = app()
            .await
            .oneshot(
                Request::builder()
                    .uri("/static/css/dashboard.css")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");

        let (status, _) = get_page("/static/missing.js").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleting_comments_updates_counts() {
        let app = app().await;

        let (status, body) = send(app.clone(), Method::DELETE, "/api/comments/4", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("hx-swap-oob=\"true\""));
        assert!(body.contains("全部 (63)"));
        assert!(body.contains("待审核 (15)"));

        let (status, _) = send(app, Method::DELETE, "/api/comments/4", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleting_a_category_leaves_posts_uncategorized() {
        let app = app().await;

        let (status, _) = send(app.clone(), Method::DELETE, "/api/categories/1", None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(app.clone(), Method::GET, "/block/posts?category=1", None).await;
        assert!(body.contains("没有符合条件的文章"));

        let (_, body) = send(app.clone(), Method::GET, "/dashboard", None).await;
        assert!(body.contains("<h3>47</h3>"));
        assert!(body.contains("<h3>2</h3>"));

        let (status, _) = send(app, Method::DELETE, "/api/categories/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn tag_names_up_to_fifty_characters_are_accepted() {
        let app = app().await;

        let form = format!("name={}&slug=long-tag", "a".repeat(50));
        let (status, _) = send(app.clone(), Method::POST, "/api/tags", Some(&form)).await;
        assert_eq!(status, StatusCode::OK);

        let form = format!("name={}&slug=longer-tag", "a".repeat(51));
        let (status, body) = send(app, Method::POST, "/api/tags", Some(&form)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.contains("标签名称长度必须在 1 到 50 个字符之间"));
    }

    #[tokio::test]
    async fn creating_and_editing_a_post() {
        let app = app().await;

        let (status, body) = send(app.clone(), Method::GET, "/dashboard/posts/new", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("hx-post=\"/api/posts\""));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/posts")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(
                        "title=Hello&slug=hello-htmx&summary=&content=body&status=draft&category=1&tags=rust%2Chtmx",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["HX-Redirect"], "/dashboard/posts/48/edit");

        let (status, body) = send(app.clone(), Method::GET, "/dashboard/posts/48/edit", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("hx-put=\"/api/posts/48\""));
        assert!(body.contains("value=\"hello-htmx\""));

        let (status, body) = send(
            app.clone(),
            Method::PUT,
            "/api/posts/48",
            Some("title=Hello+again&slug=hello-htmx&content=body&status=published&category=&tags="),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("已保存《Hello again》"));

        let (_, body) = send(app.clone(), Method::GET, "/block/posts?status=published&title=Hello", None).await;
        assert!(body.contains("Hello again"));
        assert!(body.contains("未分类"));

        let (status, body) = send(
            app.clone(),
            Method::POST,
            "/api/posts",
            Some("title=Dup&slug=hello-htmx&content=x&status=draft"),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.contains("文章别名已存在"));

        let (status, _) = send(
            app.clone(),
            Method::PUT,
            "/api/posts/999",
            Some("title=Gone&slug=gone&content=x&status=draft"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(app, Method::GET, "/dashboard/posts/999/edit", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn editing_categories_and_tags() {
        let app = app().await;

        let (status, body) = send(app.clone(), Method::GET, "/block/categories/1/edit", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("hx-put=\"/api/categories/1\""));

        let (status, body) = send(
            app.clone(),
            Method::PUT,
            "/api/categories/1",
            Some("name=Engineering&slug=engineering&description="),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<h3>Engineering</h3>"));
        assert!(body.contains("/engineering"));

        let (status, _) = send(
            app.clone(),
            Method::PUT,
            "/api/categories/2",
            Some("name=Dup&slug=engineering"),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(app.clone(), Method::PUT, "/api/tags/1", Some("name=Rustacean&slug=rustacean")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("#Rustacean"));

        let (status, body) = send(app.clone(), Method::GET, "/block/tags/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("id=\"tag-1\""));

        let (status, _) = send(app, Method::PUT, "/api/tags/999", Some("name=x&slug=x")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn replying_to_a_comment() {
        let app = app().await;

        let (status, body) = send(
            app.clone(),
            Method::POST,
            "/api/comments/4/reply",
            Some("content=%E6%84%9F%E8%B0%A2"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("回复 #4"));
        assert!(body.contains("感谢"));
        assert!(body.contains("全部 (65)"));
        assert!(body.contains("已通过 (33)"));

        let (status, _) = send(app.clone(), Method::POST, "/api/comments/4/reply", Some("content=+++")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(app, Method::POST, "/api/comments/9999/reply", Some("content=hi")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
