//! 评分结果类型与阈值

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::question::{Question, QuestionType};

/// 简答题判对阈值（模型置信）
pub const SHORT_CORRECT_THRESHOLD: f64 = 0.90;
/// 论述题判对阈值（评分量表）
pub const LONG_CORRECT_THRESHOLD: f64 = 0.70;
/// 选择题只有 0 / 1
pub const MCQ_CORRECT_THRESHOLD: f64 = 1.0;

pub fn threshold_for(question_type: QuestionType) -> f64 {
    match question_type {
        QuestionType::Mcq => MCQ_CORRECT_THRESHOLD,
        QuestionType::Short => SHORT_CORRECT_THRESHOLD,
        QuestionType::Long => LONG_CORRECT_THRESHOLD,
    }
}

/// 限制到 [0,1] 并保留两位小数，NaN 视为 0
pub fn clamp_score(raw: f64) -> f64 {
    if raw.is_nan() {
        return 0.0;
    }
    (raw.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

/// 模型给出的等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Correct,
    MostlyCorrect,
    Partial,
    Incorrect,
}

impl Band {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "correct" => Some(Band::Correct),
            "mostly_correct" => Some(Band::MostlyCorrect),
            "partial" | "partially_correct" => Some(Band::Partial),
            "incorrect" | "wrong" => Some(Band::Incorrect),
            _ => None,
        }
    }

    /// 模型没给等级时按分数推断
    pub fn from_score(score: f64) -> Self {
        if score >= SHORT_CORRECT_THRESHOLD {
            Band::Correct
        } else if score >= 0.7 {
            Band::MostlyCorrect
        } else if score >= 0.4 {
            Band::Partial
        } else {
            Band::Incorrect
        }
    }
}

/// 单题的模型评分（已校验）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiGradingResult {
    pub id: String,
    pub score: f64,
    pub band: Band,
    pub why: String,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub missing_terms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misconception: Option<String>,
}

/// 评分量表四项，每项 0-2
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriteriaScores {
    pub coverage: f64,
    pub accuracy: f64,
    pub clarity: f64,
    pub conciseness: f64,
}

/// 单题评分明细
///
/// `correct` 只能由分数和题型阈值推出，不单独设置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownItem {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub prompt: String,
    pub user_answer: String,
    pub correct: bool,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    pub feedback: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_terms: Option<Vec<String>>,
}

impl BreakdownItem {
    pub fn new(
        question: &Question,
        user_answer: &str,
        score: f64,
        feedback: impl Into<String>,
    ) -> Self {
        let question_type = question.question_type();
        let score = clamp_score(score);
        Self {
            id: question.id().to_string(),
            question_type,
            prompt: question.prompt().to_string(),
            user_answer: user_answer.to_string(),
            correct: score >= threshold_for(question_type),
            score,
            correct_answer: question.reference().map(str::to_string),
            feedback: feedback.into(),
            improvement: None,
            missing_terms: None,
        }
    }

    pub fn with_improvement(mut self, improvement: Option<String>) -> Self {
        self.improvement = improvement.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_missing_terms(mut self, terms: Vec<String>) -> Self {
        self.missing_terms = if terms.is_empty() { None } else { Some(terms) };
        self
    }
}

/// 等第
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    pub fn from_percent(percent: u32) -> Self {
        match percent {
            90..=u32::MAX => LetterGrade::A,
            80..=89 => LetterGrade::B,
            70..=79 => LetterGrade::C,
            60..=69 => LetterGrade::D,
            _ => LetterGrade::F,
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        };
        f.write_str(s)
    }
}

/// 一次作答的评分报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeReport {
    pub percent: u32,
    pub correct_count: usize,
    pub total: usize,
    pub breakdown: Vec<BreakdownItem>,
    pub summary: String,
    pub letter_grade: LetterGrade,
    pub graded_at: DateTime<Utc>,
}
