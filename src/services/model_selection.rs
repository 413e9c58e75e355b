//! 模型选择策略

use crate::config::Config;
use crate::models::router::{ModelFamily, RouterRequest};
use crate::services::model_family::classify;

pub const REASON_DEFAULT: &str = "task_default";
pub const REASON_FREE_TEXT_PREFERS_REASONING: &str = "free_text_majority_prefers_reasoning";
pub const REASON_FREE_TEXT_ALREADY_REASONING: &str = "free_text_majority_default_is_reasoning";

/// 本次请求的主 / 备模型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub primary: String,
    /// 未配置或与主模型相同时为 None
    pub fallback: Option<String>,
    pub decision_reason: &'static str,
}

/// 按任务读取默认 / 备用模型
///
/// 出题时如果自由文本题过半，而备用模型是 reasoning、默认模型不是，则两者互换。
pub fn select_models(config: &Config, request: &RouterRequest) -> ModelSelection {
    let (default_model, fallback_model) = config.models_for(request.task);
    let mut primary = default_model.trim().to_string();
    let mut fallback = fallback_model.trim().to_string();
    let mut decision_reason = REASON_DEFAULT;

    if request.task.is_generation() && wants_free_text(request) {
        let primary_family = classify(&primary);
        let fallback_family = classify(&fallback);
        if primary_family == ModelFamily::Reasoning {
            decision_reason = REASON_FREE_TEXT_ALREADY_REASONING;
        } else if fallback_family == ModelFamily::Reasoning && !fallback.is_empty() {
            std::mem::swap(&mut primary, &mut fallback);
            decision_reason = REASON_FREE_TEXT_PREFERS_REASONING;
        }
    }

    let fallback = if fallback.is_empty() || fallback.eq_ignore_ascii_case(&primary) {
        None
    } else {
        Some(fallback)
    };

    ModelSelection {
        primary,
        fallback,
        decision_reason,
    }
}

fn wants_free_text(request: &RouterRequest) -> bool {
    if let Some(quiz_config) = &request.context.quiz_config {
        return quiz_config.is_free_text_majority();
    }
    request
        .context
        .question_type
        .map(|t| t.is_free_text())
        .unwrap_or(false)
}
