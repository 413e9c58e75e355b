//! 错误分类
//!
//! 失败 -> {是否可重试, 原因, 错误码}。是否允许切换备用模型只看这里的结果。

use serde::Serialize;

use crate::clients::ProviderError;
use crate::error::ErrorCode;
use crate::services::response_validator::OutputError;

/// 一次尝试失败的原因
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    /// 传输层或服务端
    Provider(ProviderError),
    /// 传输成功但内容不可用
    Output(OutputError),
}

impl AttemptFailure {
    pub fn provider_status(&self) -> Option<u16> {
        match self {
            AttemptFailure::Provider(e) => e.status(),
            AttemptFailure::Output(_) => None,
        }
    }

    pub fn provider_message(&self) -> Option<&str> {
        match self {
            AttemptFailure::Provider(e) => e.provider_message(),
            AttemptFailure::Output(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorClassification {
    pub retryable: bool,
    pub reason: String,
    pub code: ErrorCode,
}

impl ErrorClassification {
    fn new(retryable: bool, reason: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            retryable,
            reason: reason.into(),
            code,
        }
    }
}

/// 400 里提示"换个模型可能就好"的关键词
const MODEL_RELATED_MARKERS: [&str; 7] = [
    "model",
    "unsupported",
    "temperature",
    "max_tokens",
    "max_completion_tokens",
    "response_format",
    "reasoning",
];

pub fn classify_error(failure: &AttemptFailure) -> ErrorClassification {
    match failure {
        AttemptFailure::Provider(err) => classify_provider_error(err),
        AttemptFailure::Output(err) => {
            let reason = match err {
                OutputError::Empty { .. } => "model_returned_empty_content",
                OutputError::NonJson { .. } => "model_returned_non_json",
            };
            // 换一个模型有可能遵守 JSON 格式
            ErrorClassification::new(true, reason, err.code())
        }
    }
}

fn classify_provider_error(err: &ProviderError) -> ErrorClassification {
    match err {
        ProviderError::Connection(_) => {
            ErrorClassification::new(true, "connection_failed", ErrorCode::NetworkError)
        }
        ProviderError::Timeout { .. } => {
            ErrorClassification::new(true, "request_timed_out", ErrorCode::NetworkError)
        }
        ProviderError::Status { status, message } => classify_status(*status, message),
        // 无状态码、无类型的服务端错误按 5xx 处理
        ProviderError::Api { .. } => {
            ErrorClassification::new(true, "untyped_provider_error", ErrorCode::ProviderError)
        }
        ProviderError::InvalidRequest(_) => {
            ErrorClassification::new(false, "request_build_failed", ErrorCode::BadRequest)
        }
        ProviderError::Malformed(_) => {
            ErrorClassification::new(true, "malformed_provider_response", ErrorCode::ProviderError)
        }
    }
}

/// 按 HTTP 状态码分类
pub fn classify_status(status: u16, message: &str) -> ErrorClassification {
    match status {
        400 => {
            let lowered = message.to_lowercase();
            if MODEL_RELATED_MARKERS.iter().any(|m| lowered.contains(m)) {
                ErrorClassification::new(true, "model_rejected_request", ErrorCode::ModelError)
            } else {
                ErrorClassification::new(false, "bad_request", ErrorCode::BadRequest)
            }
        }
        // 换模型解决不了凭证问题
        401 | 403 => ErrorClassification::new(false, "authentication_failed", ErrorCode::AuthError),
        429 => ErrorClassification::new(true, "rate_limited", ErrorCode::RateLimit),
        500 | 502 | 503 => {
            ErrorClassification::new(true, "provider_unavailable", ErrorCode::ProviderError)
        }
        _ => ErrorClassification::new(false, format!("unexpected_status_{status}"), ErrorCode::UnknownError),
    }
}

/// 把错误码 / 原因规范成小写下划线形式
///
/// 每一段都会处理，`MODEL-Non JSON` -> `model_non_json`。
pub fn normalize_reason(raw: &str) -> String {
    raw.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|seg| !seg.is_empty())
        .map(|seg| seg.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}
