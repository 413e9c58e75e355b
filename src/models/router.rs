//! 路由层的请求 / 结果 / 指标类型
//!
//! 全部是请求级别的值对象，不做持久化。

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::error::ErrorCode;
use crate::models::question::{QuestionType, QuizConfig};

/// 路由任务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    QuizGeneration,
    GradeMcq,
    GradeShort,
    GradeLong,
}

impl Task {
    pub fn is_generation(self) -> bool {
        matches!(self, Task::QuizGeneration)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Task::QuizGeneration => "quiz_generation",
            Task::GradeMcq => "grade_mcq",
            Task::GradeShort => "grade_short",
            Task::GradeLong => "grade_long",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 模型能力分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// 不接受自定义 temperature，token 上限参数名不同
    Reasoning,
    Standard,
}

impl ModelFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelFamily::Reasoning => "reasoning",
            ModelFamily::Standard => "standard",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 请求上下文
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_type: Option<QuestionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_reference: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_config: Option<QuizConfig>,
}

/// 路由请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterRequest {
    pub task: Task,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// 只对 standard 模型生效
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub context: RequestContext,
}

impl RouterRequest {
    pub fn new(task: Task, prompt: impl Into<String>) -> Self {
        Self {
            task,
            prompt: prompt.into(),
            system_prompt: None,
            temperature: None,
            context: RequestContext::default(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }
}

/// 每次路由都会产生的指标记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterMetrics {
    pub correlation_id: String,
    pub model_used: String,
    pub model_family: ModelFamily,
    pub fallback_triggered: bool,
    pub model_decision_reason: String,
    /// 1 或 2
    pub attempt_count: u8,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_prompt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_completion: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_total: Option<u32>,
}

/// 路由最终失败
///
/// `message` 是给用户看的简短文案，诊断信息只进日志。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct RouterError {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message: Option<String>,
}

/// 路由结果，content 与 error 恰好有一个
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub metrics: RouterMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RouterError>,
}

impl RouterResult {
    pub fn ok(content: String, metrics: RouterMetrics) -> Self {
        Self {
            success: true,
            content: Some(content),
            metrics,
            error: None,
        }
    }

    pub fn failed(error: RouterError, metrics: RouterMetrics) -> Self {
        Self {
            success: false,
            content: None,
            metrics,
            error: Some(error),
        }
    }

    /// 拆成内容或错误，供上层用 `?` 传播
    pub fn into_content(self) -> Result<(String, RouterMetrics), RouterError> {
        match (self.content, self.error) {
            (Some(content), None) => Ok((content, self.metrics)),
            (_, Some(error)) => Err(error),
            (None, None) => Err(RouterError {
                code: ErrorCode::UnknownError,
                message: "The AI service returned no result.".to_string(),
                recoverable: false,
                provider_status: None,
                provider_message: None,
            }),
        }
    }
}
