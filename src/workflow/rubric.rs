//! 评分量表
//!
//! 给论述题这类自由文本打一个 0-1 分，并给出结构化反馈。
//!
//! 四项标准每项 0-2 分：
//! - coverage：参考答案概念的命中率
//! - accuracy / clarity / conciseness：没有模型判断时用结构启发式
//!
//! 归一化后按 0.40 / 0.35 / 0.15 / 0.10 加权求和。

use std::collections::HashSet;

use crate::models::grade::{clamp_score, CriteriaScores};
use crate::utils::text::{concept_terms, token_set, tokens};

pub const COVERAGE_WEIGHT: f64 = 0.40;
pub const ACCURACY_WEIGHT: f64 = 0.35;
pub const CLARITY_WEIGHT: f64 = 0.15;
pub const CONCISENESS_WEIGHT: f64 = 0.10;

/// 单项满分
pub const CRITERION_MAX: f64 = 2.0;
/// 单项达到这个分数算优势，否则算短板
pub const STRENGTH_BAR: f64 = 1.5;
/// 反馈里最多列出的缺失概念
pub const MAX_MISSING_IN_FEEDBACK: usize = 3;

/// 评分量表结果
#[derive(Debug, Clone, PartialEq)]
pub struct RubricOutcome {
    pub score: f64,
    pub criteria: CriteriaScores,
    pub hits: Vec<String>,
    pub missing: Vec<String>,
    pub strengths: Vec<&'static str>,
    pub gaps: Vec<&'static str>,
    pub feedback: String,
}

impl RubricOutcome {
    /// 第一条改进建议
    pub fn improvement(&self) -> Option<String> {
        if let Some(term) = self.missing.first() {
            return Some(format!("Mention \"{}\" and explain how it relates to the question.", term));
        }
        self.gaps.first().map(|gap| match *gap {
            "accuracy" => "Stick closer to the key facts from the reference material.".to_string(),
            "clarity" => "Write in complete sentences that state the main point first.".to_string(),
            "conciseness" => "Trim repetition so the key points stand out.".to_string(),
            _ => "Cover more of the key ideas the question asks about.".to_string(),
        })
    }
}

/// 只用启发式打分
pub fn score_answer(prompt: &str, reference: &str, answer: &str) -> RubricOutcome {
    score_with_judgment(prompt, reference, answer, None)
}

/// 打分，`judged` 为模型给出的四项分数时优先使用（coverage 仍以概念命中为准）
pub fn score_with_judgment(
    prompt: &str,
    reference: &str,
    answer: &str,
    judged: Option<CriteriaScores>,
) -> RubricOutcome {
    let concepts = concept_terms(&format!("{} {}", prompt, reference));
    let answer_tokens = token_set(answer);
    let (hits, missing): (Vec<String>, Vec<String>) = concepts
        .iter()
        .cloned()
        .partition(|c| answer_tokens.contains(c));

    let answer_words = tokens(answer).len();
    let criteria = if answer_words == 0 {
        CriteriaScores {
            coverage: 0.0,
            accuracy: 0.0,
            clarity: 0.0,
            conciseness: 0.0,
        }
    } else {
        let coverage = coverage_score(hits.len(), concepts.len());
        match judged {
            Some(j) => CriteriaScores {
                coverage,
                accuracy: clamp_criterion(j.accuracy),
                clarity: clamp_criterion(j.clarity),
                conciseness: clamp_criterion(j.conciseness),
            },
            None => CriteriaScores {
                coverage,
                accuracy: accuracy_score(&concepts, answer, hits.len()),
                clarity: clarity_score(answer),
                conciseness: conciseness_score(answer_words, tokens(reference).len()),
            },
        }
    };

    let score = clamp_score(weighted(&criteria));
    let (strengths, gaps) = split_strengths(&criteria);
    let feedback = build_feedback(&missing, &strengths, &gaps, answer_words == 0);

    RubricOutcome {
        score,
        criteria,
        hits,
        missing,
        strengths,
        gaps,
        feedback,
    }
}

fn clamp_criterion(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, CRITERION_MAX)
    }
}

fn coverage_score(hits: usize, total: usize) -> f64 {
    if total == 0 {
        return CRITERION_MAX;
    }
    CRITERION_MAX * hits as f64 / total as f64
}

/// 命中率与"回答里的概念词有多少在参考范围内"各占一半
fn accuracy_score(concepts: &[String], answer: &str, hits: usize) -> f64 {
    let concept_set: HashSet<&str> = concepts.iter().map(String::as_str).collect();
    let answer_terms = concept_terms(answer);
    if answer_terms.is_empty() {
        return 0.0;
    }
    let on_topic = answer_terms
        .iter()
        .filter(|t| concept_set.contains(t.as_str()))
        .count();
    let precision = on_topic as f64 / answer_terms.len() as f64;
    let recall = if concepts.is_empty() {
        1.0
    } else {
        hits as f64 / concepts.len() as f64
    };
    clamp_criterion(CRITERION_MAX * (0.5 * precision + 0.5 * recall))
}

/// 句子结构：完整句子、平均句长
fn clarity_score(answer: &str) -> f64 {
    let words = answer.split_whitespace().count();
    let sentences: Vec<&str> = answer
        .split(|c| matches!(c, '.' | '!' | '?' | '\n'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let sentence_count = sentences.len().max(1);
    let avg_len = words as f64 / sentence_count as f64;

    if words < 3 {
        0.5
    } else if words < 5 {
        1.0
    } else if avg_len > 40.0 {
        1.0
    } else if answer.trim_end().ends_with(['.', '!', '?']) || sentence_count > 1 {
        2.0
    } else {
        1.5
    }
}

/// 回答长度相对参考答案的比例
fn conciseness_score(answer_words: usize, reference_words: usize) -> f64 {
    if reference_words == 0 {
        return if answer_words <= 120 { CRITERION_MAX } else { 1.0 };
    }
    let ratio = answer_words as f64 / reference_words as f64;
    if ratio < 0.25 {
        1.0
    } else if ratio <= 1.5 {
        2.0
    } else if ratio <= 2.5 {
        1.5
    } else if ratio <= 4.0 {
        1.0
    } else {
        0.5
    }
}

fn weighted(c: &CriteriaScores) -> f64 {
    (c.coverage / CRITERION_MAX) * COVERAGE_WEIGHT
        + (c.accuracy / CRITERION_MAX) * ACCURACY_WEIGHT
        + (c.clarity / CRITERION_MAX) * CLARITY_WEIGHT
        + (c.conciseness / CRITERION_MAX) * CONCISENESS_WEIGHT
}

fn split_strengths(c: &CriteriaScores) -> (Vec<&'static str>, Vec<&'static str>) {
    let mut strengths = Vec::new();
    let mut gaps = Vec::new();
    for (name, value) in [
        ("coverage", c.coverage),
        ("accuracy", c.accuracy),
        ("clarity", c.clarity),
        ("conciseness", c.conciseness),
    ] {
        if value >= STRENGTH_BAR {
            strengths.push(name);
        } else {
            gaps.push(name);
        }
    }
    (strengths, gaps)
}

fn build_feedback(
    missing: &[String],
    strengths: &[&'static str],
    gaps: &[&'static str],
    empty_answer: bool,
) -> String {
    if empty_answer {
        return "No answer provided.".to_string();
    }

    let mut parts = Vec::new();
    if !strengths.is_empty() {
        parts.push(format!("Strengths: {}.", strengths.join(", ")));
    }
    if !gaps.is_empty() {
        parts.push(format!("Needs work: {}.", gaps.join(", ")));
    }
    if !missing.is_empty() {
        let shown: Vec<&str> = missing
            .iter()
            .take(MAX_MISSING_IN_FEEDBACK)
            .map(String::as_str)
            .collect();
        parts.push(format!("Consider addressing: {}.", shown.join(", ")));
    }
    parts.join(" ")
}
