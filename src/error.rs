use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::models::router::RouterError;

/// 错误码
///
/// 对外暴露的稳定字符串，日志与 `RouterError.code` 都使用它。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// 连接失败、超时、连接被重置
    NetworkError,
    /// 429
    RateLimit,
    /// 401 / 403
    AuthError,
    /// 与模型无关的 400
    BadRequest,
    /// 与模型相关的 400（参数不被该模型支持等）
    ModelError,
    /// 500 / 502 / 503
    ProviderError,
    UnknownError,
    /// 传输成功但内容为空
    ModelEmptyResponse,
    /// 传输成功但内容无法修复为 JSON
    ModelNonJson,
    /// 批量评分结果缺失或格式错误
    AiGradingParseError,
    /// 批量评分调用本身失败
    AiGradingFailed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::ModelError => "MODEL_ERROR",
            ErrorCode::ProviderError => "PROVIDER_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
            ErrorCode::ModelEmptyResponse => "MODEL_EMPTY_RESPONSE",
            ErrorCode::ModelNonJson => "MODEL_NON_JSON",
            ErrorCode::AiGradingParseError => "AI_GRADING_PARSE_ERROR",
            ErrorCode::AiGradingFailed => "AI_GRADING_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 路由层最终失败（两次尝试都失败或不可重试）
    #[error("路由错误: {0}")]
    Router(#[from] RouterError),
    /// 评分错误
    #[error("评分错误: {0}")]
    Grading(#[from] GradingError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 出题结果没有可用题目
    #[error("出题失败: {detail}")]
    Generation { detail: String },
    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),
}

/// 评分错误
#[derive(Debug, Error)]
pub enum GradingError {
    /// 模型返回的批量结果没有合法的 results 数组
    #[error("AI grading batch could not be parsed: {detail}")]
    BatchParse { detail: String },
    /// 批量评分调用在路由层失败
    #[error("AI grading call failed: {0}")]
    RouterFailed(RouterError),
    /// 同一份测验中题目 id 重复
    #[error("duplicate question id: {0}")]
    DuplicateQuestionId(String),
}

impl GradingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GradingError::BatchParse { .. } | GradingError::DuplicateQuestionId(_) => {
                ErrorCode::AiGradingParseError
            }
            GradingError::RouterFailed(_) => ErrorCode::AiGradingFailed,
        }
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量不存在
    #[error("环境变量 {var_name} 不存在")]
    EnvVarNotFound { var_name: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建出题失败错误
    pub fn generation(detail: impl Into<String>) -> Self {
        AppError::Generation {
            detail: detail.into(),
        }
    }

    /// 创建缺少环境变量错误
    pub fn env_var_missing(var_name: impl Into<String>) -> Self {
        AppError::Config(ConfigError::EnvVarNotFound {
            var_name: var_name.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::ModelEmptyResponse).unwrap();
        assert_eq!(json, "\"MODEL_EMPTY_RESPONSE\"");
        assert_eq!(ErrorCode::RateLimit.to_string(), "RATE_LIMIT");
    }

    #[test]
    fn test_grading_error_codes() {
        let err: AppError = GradingError::BatchParse {
            detail: "results missing".into(),
        }
        .into();
        match err {
            AppError::Grading(e) => assert_eq!(e.code(), ErrorCode::AiGradingParseError),
            other => panic!("unexpected: {other}"),
        }

        let err: AppError = GradingError::RouterFailed(RouterError {
            code: ErrorCode::AuthError,
            message: "bad key".into(),
            recoverable: false,
            provider_status: Some(401),
            provider_message: None,
        })
        .into();
        assert!(err.to_string().starts_with("评分错误"));
    }
}
