//! 混合评分流程 - 流程层
//!
//! 核心职责：定义"一份作答"的完整评分流程
//!
//! 流程顺序：
//! 1. 选择题：确定性比对（接受选项字母）
//! 2. 论述题：模型给出量表四项分数，拿不到时退回结构启发式
//! 3. 简答题：精确匹配 → 相似度 → 剩余题目合并成一次模型调用
//!
//! 空答案直接 0 分，不调用模型。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::GradingError;
use crate::models::grade::{BreakdownItem, GradeReport, LetterGrade};
use crate::models::question::{Question, QuestionType};
use crate::orchestrator::AiRouter;
use crate::services::prompts::GradingItem;
use crate::utils::text::{jaccard, normalize_answer};
use crate::workflow::rubric;
use crate::workflow::semantic_grader::{grade_batch, judge_long_answer};

/// 精确匹配得分
pub const EXACT_MATCH_SCORE: f64 = 1.0;
/// 相似度门槛
pub const SIMILARITY_THRESHOLD: f64 = 0.6;
/// 相似度命中得分（低于简答题判对阈值）
pub const SIMILARITY_SCORE: f64 = 0.85;

const EMPTY_ANSWER_FEEDBACK: &str = "No answer provided.";
const UNGRADED_FEEDBACK: &str =
    "This answer could not be graded automatically. Please ask an instructor to review it.";

/// 简答题前两道关卡的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateOutcome {
    Exact,
    Similar(f64),
    /// 需要模型判断
    Undecided,
}

/// 精确匹配与相似度关卡
pub fn apply_gates(answer: &str, reference: &str) -> GateOutcome {
    if normalize_answer(answer) == normalize_answer(reference) {
        return GateOutcome::Exact;
    }
    let similarity = jaccard(answer, reference);
    if similarity >= SIMILARITY_THRESHOLD {
        GateOutcome::Similar(similarity)
    } else {
        GateOutcome::Undecided
    }
}

/// 选择题判分：答案文本或对应选项字母都算对
pub fn grade_mcq(options: &[String], answer: &str, user_answer: &str) -> f64 {
    let expected = normalize_answer(answer);
    let given = normalize_answer(user_answer);
    if given.is_empty() {
        return 0.0;
    }
    if given == expected {
        return EXACT_MATCH_SCORE;
    }

    let expected_index = options
        .iter()
        .position(|o| normalize_answer(o) == expected)
        .or_else(|| option_index(answer, options.len()));

    let Some(expected_index) = expected_index else {
        return 0.0;
    };

    let by_letter = option_index(user_answer, options.len()) == Some(expected_index);
    let by_text = normalize_answer(&options[expected_index]) == given;
    if by_letter || by_text {
        EXACT_MATCH_SCORE
    } else {
        0.0
    }
}

/// "B"、"b)"、"(c)" 这类选项字母转下标
fn option_index(raw: &str, option_count: usize) -> Option<usize> {
    let trimmed = raw
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(['.', ')']);
    let mut chars = trimmed.chars();
    let letter = chars.next()?;
    if chars.next().is_some() || !letter.is_ascii_alphabetic() {
        return None;
    }
    let index = (letter.to_ascii_uppercase() as u8 - b'A') as usize;
    (index < option_count).then_some(index)
}

/// 评分流程
///
/// - 持有共享的路由器
/// - 简答题每份作答最多一次批量调用，论述题每题一次量表判断
pub struct GradingCascade {
    router: Arc<AiRouter>,
}

impl GradingCascade {
    pub fn new(router: Arc<AiRouter>) -> Self {
        Self { router }
    }

    /// 给一份作答评分
    ///
    /// 批量评分的顶层格式错误或调用失败会整体返回 Err，不会悄悄判 0 分。
    pub async fn grade_submission(
        &self,
        questions: &[Question],
        responses: &HashMap<String, String>,
        correlation_id: Option<String>,
    ) -> Result<GradeReport, GradingError> {
        let correlation_id = correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut seen = HashSet::new();
        for question in questions {
            if !seen.insert(question.id()) {
                return Err(GradingError::DuplicateQuestionId(question.id().to_string()));
            }
        }

        let mut slots: Vec<Option<BreakdownItem>> = vec![None; questions.len()];
        let mut pending: Vec<(usize, GradingItem)> = Vec::new();

        // ========== 第一轮: 不需要模型的题目 ==========
        for (index, question) in questions.iter().enumerate() {
            let user_answer = responses
                .get(question.id())
                .map(String::as_str)
                .unwrap_or_default();

            if user_answer.trim().is_empty() {
                slots[index] = Some(BreakdownItem::new(question, user_answer, 0.0, EMPTY_ANSWER_FEEDBACK));
                continue;
            }

            match question {
                Question::Mcq {
                    options, answer, ..
                } => {
                    let score = grade_mcq(options, answer, user_answer);
                    let feedback = if score >= EXACT_MATCH_SCORE {
                        "Correct.".to_string()
                    } else {
                        format!("The correct answer is \"{}\".", answer)
                    };
                    slots[index] = Some(BreakdownItem::new(question, user_answer, score, feedback));
                }
                Question::Long {
                    prompt, reference, ..
                } => {
                    let judged = match judge_long_answer(
                        &self.router,
                        prompt,
                        reference,
                        user_answer,
                        Some(correlation_id.clone()),
                    )
                    .await
                    {
                        Ok(scores) => Some(scores),
                        Err(e) => {
                            warn!(
                                event = "rubric_judgment_unavailable",
                                correlation_id = %correlation_id,
                                id = question.id(),
                                error = %e,
                                "论述题模型判断不可用，改用启发式"
                            );
                            None
                        }
                    };
                    let outcome = rubric::score_with_judgment(prompt, reference, user_answer, judged);
                    let improvement = outcome.improvement();
                    let missing = outcome
                        .missing
                        .iter()
                        .take(rubric::MAX_MISSING_IN_FEEDBACK)
                        .cloned()
                        .collect();
                    slots[index] = Some(
                        BreakdownItem::new(question, user_answer, outcome.score, outcome.feedback)
                            .with_improvement(improvement)
                            .with_missing_terms(missing),
                    );
                }
                Question::Short { prompt, .. } => {
                    let gate = question
                        .reference()
                        .map(|reference| apply_gates(user_answer, reference))
                        .unwrap_or(GateOutcome::Undecided);

                    match gate {
                        GateOutcome::Exact => {
                            debug!(id = question.id(), "精确匹配");
                            slots[index] = Some(BreakdownItem::new(
                                question,
                                user_answer,
                                EXACT_MATCH_SCORE,
                                "Matches the reference answer.",
                            ));
                        }
                        GateOutcome::Similar(similarity) => {
                            debug!(id = question.id(), similarity, "相似度命中");
                            slots[index] = Some(
                                BreakdownItem::new(
                                    question,
                                    user_answer,
                                    SIMILARITY_SCORE,
                                    "Very close to the reference answer.",
                                )
                                .with_improvement(Some(
                                    "Use the exact key terms from the reference answer.".to_string(),
                                )),
                            );
                        }
                        GateOutcome::Undecided => pending.push((
                            index,
                            GradingItem {
                                id: question.id().to_string(),
                                question: prompt.clone(),
                                reference: question.reference().map(str::to_string),
                                answer: user_answer.to_string(),
                            },
                        )),
                    }
                }
            }
        }

        // ========== 第二轮: 剩余简答题合并成一次模型调用 ==========
        if !pending.is_empty() {
            info!(
                event = "semantic_grading_started",
                correlation_id = %correlation_id,
                items = pending.len(),
                "剩余简答题交给模型评分"
            );

            let items: Vec<GradingItem> = pending.iter().map(|(_, item)| item.clone()).collect();
            let batch = grade_batch(&self.router, &items, Some(correlation_id.clone())).await?;

            for (index, item) in pending {
                let question = &questions[index];
                let breakdown = match batch.results.get(&item.id) {
                    Some(result) => {
                        let mut feedback = if result.why.is_empty() {
                            "Graded by meaning against the question.".to_string()
                        } else {
                            result.why.clone()
                        };
                        if let Some(misconception) = &result.misconception {
                            feedback.push_str(&format!(" Misconception: {}", misconception));
                        }
                        BreakdownItem::new(question, &item.answer, result.score, feedback)
                            .with_improvement(result.improvements.first().cloned())
                            .with_missing_terms(result.missing_terms.clone())
                    }
                    None => BreakdownItem::new(question, &item.answer, 0.0, UNGRADED_FEEDBACK),
                };
                slots[index] = Some(breakdown);
            }
        }

        let breakdown: Vec<BreakdownItem> = slots.into_iter().flatten().collect();
        let report = build_report(breakdown);

        info!(
            event = "grading_completed",
            correlation_id = %correlation_id,
            total = report.total,
            correct = report.correct_count,
            percent = report.percent,
            letter_grade = %report.letter_grade,
            "评分完成"
        );

        Ok(report)
    }
}

/// 汇总分数、等第与评语
pub fn build_report(breakdown: Vec<BreakdownItem>) -> GradeReport {
    let total = breakdown.len();
    let correct_count = breakdown.iter().filter(|b| b.correct).count();
    let percent = aggregate_percent(&breakdown);
    let letter_grade = LetterGrade::from_percent(percent);
    let summary = summarize(&breakdown, correct_count, percent, letter_grade);

    GradeReport {
        percent,
        correct_count,
        total,
        breakdown,
        summary,
        letter_grade,
        graded_at: Utc::now(),
    }
}

/// round(Σ score / count × 100)，限制在 [0,100]
pub fn aggregate_percent(breakdown: &[BreakdownItem]) -> u32 {
    if breakdown.is_empty() {
        return 0;
    }
    let sum: f64 = breakdown.iter().map(|b| b.score).sum();
    let percent = (sum / breakdown.len() as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u32
}

fn summarize(
    breakdown: &[BreakdownItem],
    correct_count: usize,
    percent: u32,
    letter_grade: LetterGrade,
) -> String {
    let mut summary = format!(
        "{}/{} correct ({}%), grade {}.",
        correct_count,
        breakdown.len(),
        percent,
        letter_grade
    );

    let weakest = breakdown
        .iter()
        .filter(|b| !b.correct)
        .min_by(|a, b| a.score.total_cmp(&b.score));
    if let Some(item) = weakest {
        let label = match item.question_type {
            QuestionType::Mcq => "multiple choice",
            QuestionType::Short => "short answer",
            QuestionType::Long => "long answer",
        };
        summary.push_str(&format!(
            " Focus next on {} ({}): {}",
            item.id, label, item.feedback
        ));
    }
    summary
}
