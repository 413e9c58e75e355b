//! 提示词构建
//!
//! 出题、批量评分与论述题量表判断三类提示词。返回 (user_message, system_message)。

use serde::Serialize;

use crate::models::question::{QuestionType, QuizConfig};
use crate::services::params::DEFAULT_QUESTION_COUNT;

/// 批量评分中的一道题
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradingItem {
    pub id: String,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub answer: String,
}

/// 构建批量评分的提示词
pub fn grading_batch_prompt(items: &[GradingItem]) -> (String, String) {
    let system_message = "You are a strict but fair teaching assistant grading short answers. \
                          Judge meaning, not wording. Reply with JSON only."
        .to_string();

    let items_json = serde_json::to_string_pretty(items).unwrap_or_default();

    let user_message = format!(
        r#"Grade each student answer below. When a reference answer is given, compare against it; otherwise judge factual correctness for the question.

Items:
{}

Return exactly this JSON object and nothing else:
{{"results":[{{"id":"<item id>","score":<number 0..1>,"band":"correct|mostly_correct|partial|incorrect","why":"<one sentence>","improvements":["<short tip>"],"missing_terms":["<key term>"],"misconception":"<optional>"}}]}}

Rules:
- One result per item, using the same id.
- score 1.0 means fully correct; 0.0 means wrong or empty.
- Keep "why" under 30 words."#,
        items_json
    );

    (user_message, system_message)
}

/// 构建论述题量表判断的提示词
pub fn rubric_judgment_prompt(prompt: &str, reference: &str, answer: &str) -> (String, String) {
    let system_message = "You are a teaching assistant scoring a long written answer against a rubric. \
                          Reply with JSON only."
        .to_string();

    let user_message = format!(
        r#"Question:
{prompt}

Reference answer:
{reference}

Student answer:
{answer}

Score each criterion from 0 to 2 (0 = missing, 1 = partial, 2 = strong):
- coverage: how many key ideas of the reference the answer covers
- accuracy: whether the statements are factually correct
- clarity: whether the answer is organized and easy to follow
- conciseness: whether it stays on point without padding

Return exactly this JSON object and nothing else:
{{"coverage":<0..2>,"accuracy":<0..2>,"clarity":<0..2>,"conciseness":<0..2>}}"#,
        prompt = prompt.trim(),
        reference = reference.trim(),
        answer = answer.trim(),
    );

    (user_message, system_message)
}

/// 构建出题提示词
pub fn quiz_generation_prompt(notes: &str, config: &QuizConfig) -> (String, String) {
    let system_message = "You write quizzes from study notes. Every question must be answerable \
                          from the notes. Reply with JSON only."
        .to_string();

    let count = if config.question_count == 0 {
        DEFAULT_QUESTION_COUNT
    } else {
        config.question_count
    };

    let types = if config.question_types.is_empty() {
        "mcq".to_string()
    } else {
        config
            .question_types
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let difficulty = config.difficulty.as_deref().unwrap_or("medium");

    let user_message = format!(
        r#"Write {count} questions from the notes below.
Question types to use (roughly in this mix): {types}
Difficulty: {difficulty}

Notes:
"""
{notes}
"""

Return exactly this JSON object:
{{"questions":[
  {{"type":"mcq","id":"q1","prompt":"...","options":["...","...","...","..."],"answer":"<one of options>"}},
  {{"type":"short","id":"q2","prompt":"...","reference":"<concise model answer>"}},
  {{"type":"long","id":"q3","prompt":"...","reference":"<model answer covering key points>"}}
]}}"#,
        count = count,
        types = types,
        difficulty = difficulty,
        notes = notes.trim(),
    );

    (user_message, system_message)
}

/// 出题请求的主题型（用于路由上下文）
pub fn dominant_type(config: &QuizConfig) -> Option<QuestionType> {
    if config.question_types.is_empty() {
        return None;
    }
    if config.is_free_text_majority() {
        let long = config
            .question_types
            .iter()
            .filter(|t| **t == QuestionType::Long)
            .count();
        let short = config
            .question_types
            .iter()
            .filter(|t| **t == QuestionType::Short)
            .count();
        Some(if long > short {
            QuestionType::Long
        } else {
            QuestionType::Short
        })
    } else {
        Some(QuestionType::Mcq)
    }
}
