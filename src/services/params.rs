//! 调用参数构建
//!
//! 家族 + 任务 -> 合法的调用参数。

use crate::clients::{CallParams, TokenLimitParam};
use crate::models::router::{ModelFamily, Task};

/// 每道题的输出 token 预算
pub const GENERATION_TOKENS_PER_QUESTION: u32 = 150;
/// 出题的固定 token 开销
pub const GENERATION_BASE_TOKENS: u32 = 500;
pub const GENERATION_TOKEN_CAP: u32 = 4000;
/// 评分请求的固定预算，不随批量题数变化
pub const GRADING_TOKEN_BUDGET: u32 = 2000;
/// 未指定题数时的默认值
pub const DEFAULT_QUESTION_COUNT: u32 = 10;

/// 出题偏向多样性
pub const GENERATION_TEMPERATURE: f32 = 0.7;
/// 评分偏向确定性
pub const GRADING_TEMPERATURE: f32 = 0.1;

pub fn token_budget(task: Task, question_count: Option<u32>) -> u32 {
    if task.is_generation() {
        let count = question_count.unwrap_or(DEFAULT_QUESTION_COUNT);
        count
            .saturating_mul(GENERATION_TOKENS_PER_QUESTION)
            .saturating_add(GENERATION_BASE_TOKENS)
            .min(GENERATION_TOKEN_CAP)
    } else {
        GRADING_TOKEN_BUDGET
    }
}

pub fn default_temperature(task: Task) -> f32 {
    if task.is_generation() {
        GENERATION_TEMPERATURE
    } else {
        GRADING_TEMPERATURE
    }
}

/// 构建调用参数
///
/// reasoning 模型不设置 temperature（即使调用方传了），并使用 `max_completion_tokens`。
pub fn build_params(
    family: ModelFamily,
    task: Task,
    question_count: Option<u32>,
    temperature: Option<f32>,
) -> CallParams {
    let (temperature, token_param) = match family {
        ModelFamily::Reasoning => (None, TokenLimitParam::MaxCompletionTokens),
        ModelFamily::Standard => (
            Some(temperature.unwrap_or_else(|| default_temperature(task))),
            TokenLimitParam::MaxTokens,
        ),
    };

    CallParams {
        temperature,
        token_param,
        max_output_tokens: token_budget(task, question_count),
        json_mode: true,
    }
}
