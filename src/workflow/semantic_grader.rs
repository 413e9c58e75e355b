//! 模型评分
//!
//! 把剩余的简答题一次性交给模型评分，并逐条校验返回结果。
//! 顶层结构不对时整批失败；单条不合格只丢弃该条。
//!
//! 论述题另走一次量表判断，拿到四项分数交给评分量表。

use std::collections::{HashMap, HashSet};

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::GradingError;
use crate::models::grade::{clamp_score, AiGradingResult, Band, CriteriaScores};
use crate::models::question::QuestionType;
use crate::models::router::{RequestContext, RouterRequest, Task};
use crate::orchestrator::AiRouter;
use crate::services::prompts::{grading_batch_prompt, rubric_judgment_prompt, GradingItem};

/// 解析后的批量结果，按 id 索引
#[derive(Debug, Default)]
pub struct GradedBatch {
    pub results: HashMap<String, AiGradingResult>,
    /// 被丢弃的条目数（缺字段、未知 id、重复 id）
    pub dropped: usize,
}

/// 解析模型返回的批量评分
///
/// 接受 `{"results":[...]}` 或裸数组。`expected_ids` 之外的 id 会被丢弃。
/// 丢弃后一条结果都不剩时返回 `BatchParse`。
pub fn parse_grading_batch(
    content: &str,
    expected_ids: &HashSet<&str>,
) -> Result<GradedBatch, GradingError> {
    let value: JsonValue =
        serde_json::from_str(content).map_err(|e| GradingError::BatchParse {
            detail: format!("invalid JSON: {e}"),
        })?;

    let items = match &value {
        JsonValue::Array(items) => items,
        JsonValue::Object(map) => match map.get("results") {
            Some(JsonValue::Array(items)) => items,
            Some(_) => {
                return Err(GradingError::BatchParse {
                    detail: "\"results\" is not an array".to_string(),
                })
            }
            None => {
                return Err(GradingError::BatchParse {
                    detail: "missing \"results\" array".to_string(),
                })
            }
        },
        _ => {
            return Err(GradingError::BatchParse {
                detail: "expected an object or array".to_string(),
            })
        }
    };

    let mut batch = GradedBatch::default();
    for item in items {
        match parse_item(item) {
            Some(result) if !expected_ids.contains(result.id.as_str()) => {
                debug!(id = %result.id, "丢弃未知 id 的评分结果");
                batch.dropped += 1;
            }
            Some(result) if batch.results.contains_key(&result.id) => {
                debug!(id = %result.id, "丢弃重复 id 的评分结果");
                batch.dropped += 1;
            }
            Some(result) => {
                batch.results.insert(result.id.clone(), result);
            }
            None => batch.dropped += 1,
        }
    }

    // 一条可用结果都没有时整批失败
    if !expected_ids.is_empty() && batch.results.is_empty() {
        return Err(GradingError::BatchParse {
            detail: format!(
                "no usable results ({} returned, {} dropped)",
                items.len(),
                batch.dropped
            ),
        });
    }

    Ok(batch)
}

/// 单条校验：必须有 id 和有限数值的 score
fn parse_item(item: &JsonValue) -> Option<AiGradingResult> {
    let obj = item.as_object()?;

    let id = match obj.get("id")? {
        JsonValue::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        JsonValue::Number(n) => n.to_string(),
        _ => return None,
    };

    let raw_score = match obj.get("score")? {
        JsonValue::Number(n) => n.as_f64()?,
        JsonValue::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw_score.is_finite() {
        return None;
    }
    let score = clamp_score(raw_score);

    let band = obj
        .get("band")
        .and_then(JsonValue::as_str)
        .and_then(Band::parse)
        .unwrap_or_else(|| Band::from_score(score));

    Some(AiGradingResult {
        id,
        score,
        band,
        why: string_field(obj.get("why")).unwrap_or_default(),
        improvements: string_list(obj.get("improvements")),
        missing_terms: string_list(obj.get("missing_terms")),
        misconception: string_field(obj.get("misconception")),
    })
}

fn string_field(value: Option<&JsonValue>) -> Option<String> {
    value
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(value: Option<&JsonValue>) -> Vec<String> {
    match value {
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(|v| string_field(Some(v)))
            .collect(),
        Some(JsonValue::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// 路由一次批量评分请求并解析结果
pub async fn grade_batch(
    router: &AiRouter,
    items: &[GradingItem],
    correlation_id: Option<String>,
) -> Result<GradedBatch, GradingError> {
    let (user_message, system_message) = grading_batch_prompt(items);
    let request = RouterRequest::new(Task::GradeShort, user_message)
        .with_system_prompt(system_message)
        .with_context(RequestContext {
            question_count: Some(items.len() as u32),
            question_type: Some(QuestionType::Short),
            has_reference: Some(items.iter().any(|i| i.reference.is_some())),
            correlation_id,
            quiz_config: None,
        });

    let (content, metrics) = router
        .route(request)
        .await
        .into_content()
        .map_err(GradingError::RouterFailed)?;

    let expected: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
    let batch = parse_grading_batch(&content, &expected).map_err(|e| {
        warn!(
            event = "grading_batch_rejected",
            correlation_id = %metrics.correlation_id,
            model = %metrics.model_used,
            error = %e,
            "批量评分结果无法解析"
        );
        e
    })?;

    if batch.dropped > 0 || batch.results.len() < items.len() {
        warn!(
            event = "grading_items_dropped",
            correlation_id = %metrics.correlation_id,
            expected = items.len(),
            received = batch.results.len(),
            dropped = batch.dropped,
            "部分评分结果缺失或不合格"
        );
    }

    Ok(batch)
}

/// 解析量表判断：accuracy / clarity / conciseness 必须是有限数值
///
/// coverage 缺失时记 0，评分量表最终以概念命中计算 coverage。
pub fn parse_judgment(content: &str) -> Result<CriteriaScores, GradingError> {
    let value: JsonValue = serde_json::from_str(content).map_err(|e| GradingError::BatchParse {
        detail: format!("invalid JSON: {e}"),
    })?;
    let obj = value.as_object().ok_or_else(|| GradingError::BatchParse {
        detail: "expected a criteria object".to_string(),
    })?;

    let criterion = |name: &str| -> Result<f64, GradingError> {
        let raw = match obj.get(name) {
            Some(JsonValue::Number(n)) => n.as_f64(),
            Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        raw.filter(|v| v.is_finite())
            .ok_or_else(|| GradingError::BatchParse {
                detail: format!("missing or invalid \"{name}\""),
            })
    };

    Ok(CriteriaScores {
        coverage: criterion("coverage").unwrap_or(0.0),
        accuracy: criterion("accuracy")?,
        clarity: criterion("clarity")?,
        conciseness: criterion("conciseness")?,
    })
}

/// 路由一次论述题量表判断
pub async fn judge_long_answer(
    router: &AiRouter,
    prompt: &str,
    reference: &str,
    answer: &str,
    correlation_id: Option<String>,
) -> Result<CriteriaScores, GradingError> {
    let (user_message, system_message) = rubric_judgment_prompt(prompt, reference, answer);
    let request = RouterRequest::new(Task::GradeLong, user_message)
        .with_system_prompt(system_message)
        .with_context(RequestContext {
            question_count: Some(1),
            question_type: Some(QuestionType::Long),
            has_reference: Some(true),
            correlation_id,
            quiz_config: None,
        });

    let (content, _) = router
        .route(request)
        .await
        .into_content()
        .map_err(GradingError::RouterFailed)?;

    parse_judgment(&content)
}
