//! 安全模块
//!
//! 提供表单输入验证、表单错误响应、日志脱敏等安全功能

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use regex::Regex;
use thiserror::Error;
use validator::Validate;

lazy_static::lazy_static! {
    /// 别名（slug）只允许小写字母、数字和连字符
    pub static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();

    static ref EMAIL_REGEX: Regex =
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap();
    static ref PHONE_REGEX: Regex = Regex::new(r"\b\d{10,15}\b").unwrap();
    static ref PASSWORD_REGEX: Regex =
        Regex::new(r#"(?i)password\s*=\s*['"]?([^'"\s&]+)['"]?"#).unwrap();
    static ref TOKEN_REGEX: Regex =
        Regex::new(r#"(?i)token\s*=\s*['"]?([^'"\s&]+)['"]?"#).unwrap();
}

/// 表单处理错误类型
#[derive(Error, Debug)]
pub enum FormError {
    #[error("输入验证失败: {0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("记录不存在")]
    NotFound,
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
}

impl FormError {
    /// 将写入时的唯一约束冲突转换为 Conflict，其余错误保持为数据库错误
    pub fn from_write(err: sqlx::Error, what: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                FormError::Conflict(format!("{}已存在", what))
            }
            _ => FormError::Database(err),
        }
    }
}

/// 表单错误提示片段
#[derive(Template)]
#[template(path = "partials/form_error.html")]
pub struct FormErrorTemplate {
    pub message: String,
}

/// 错误提示统一渲染到页面的 #form-message 中
pub const FORM_MESSAGE_TARGET: &str = "#form-message";

impl IntoResponse for FormError {
    fn into_response(self) -> Response {
        let status = match &self {
            FormError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FormError::Conflict(_) => StatusCode::CONFLICT,
            FormError::NotFound => return StatusCode::NOT_FOUND.into_response(),
            FormError::Database(e) => {
                tracing::error!("表单处理数据库错误: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "服务器内部错误").into_response();
            }
        };

        let html = FormErrorTemplate {
            message: self.to_string(),
        }
        .render()
        .unwrap_or_default();

        (
            status,
            [("HX-Retarget", FORM_MESSAGE_TARGET), ("HX-Reswap", "innerHTML")],
            Html(html),
        )
            .into_response()
    }
}

/// 输入验证工具
pub mod validation {
    use super::*;
    use validator::ValidationErrors;

    /// 验证输入数据并返回友好的错误消息
    pub fn validate_input<T: Validate>(input: &T) -> Result<(), FormError> {
        input
            .validate()
            .map_err(|errors| FormError::Validation(format_validation_errors(&errors)))
    }

    /// 格式化验证错误为友好的错误消息，按字段名排序保证输出稳定
    fn format_validation_errors(errors: &ValidationErrors) -> String {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));

        let mut messages = Vec::new();
        for (field, field_errors) in fields {
            for error in field_errors {
                let message = match &error.message {
                    Some(msg) => msg.to_string(),
                    None => format!("字段 '{}' 验证失败: {}", field, error.code),
                };
                messages.push(message);
            }
        }

        messages.join(", ")
    }
}

/// 日志脱敏工具
pub mod sanitization {
    use super::*;

    /// 脱敏敏感信息（邮箱、手机号、密码、令牌）
    pub fn sanitize_log_message(message: &str) -> String {
        let result = EMAIL_REGEX.replace_all(message, "***@***.***");

        let result = PHONE_REGEX.replace_all(&result, |caps: &regex::Captures| {
            let num = &caps[0];
            format!("{}****{}", &num[..3], &num[num.len() - 3..])
        });

        let result = PASSWORD_REGEX.replace_all(&result, "password=***");
        let result = TOKEN_REGEX.replace_all(&result, "token=***");

        result.into_owned()
    }
}

pub use self::sanitization::sanitize_log_message;
pub use self::validation::validate_input;
