//! 出题流程
//!
//! 笔记 → 提示词 → 路由 → 逐题校验。不合格的题目单独丢弃，不影响其他题目。

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::question::{GeneratedQuiz, Question, QuizConfig};
use crate::models::router::{RequestContext, RouterMetrics, RouterRequest, Task};
use crate::orchestrator::AiRouter;
use crate::services::prompts::{dominant_type, quiz_generation_prompt};
use crate::utils::text::normalize_answer;

/// 出题流程
pub struct QuizGenerator {
    router: Arc<AiRouter>,
}

impl QuizGenerator {
    pub fn new(router: Arc<AiRouter>) -> Self {
        Self { router }
    }

    /// 根据笔记出题，同时返回路由指标
    pub async fn generate_quiz(
        &self,
        notes: &str,
        config: &QuizConfig,
        correlation_id: Option<String>,
    ) -> AppResult<(GeneratedQuiz, RouterMetrics)> {
        if notes.trim().is_empty() {
            return Err(AppError::generation("notes are empty"));
        }

        let (user_message, system_message) = quiz_generation_prompt(notes, config);
        let request = RouterRequest::new(Task::QuizGeneration, user_message)
            .with_system_prompt(system_message)
            .with_context(RequestContext {
                question_count: Some(config.question_count).filter(|c| *c > 0),
                question_type: dominant_type(config),
                has_reference: None,
                correlation_id,
                quiz_config: Some(config.clone()),
            });

        let (content, metrics) = self.router.route(request).await.into_content()?;

        let (questions, rejected) = parse_questions(&content, config.question_count)?;
        if questions.is_empty() {
            warn!(
                event = "quiz_generation_empty",
                correlation_id = %metrics.correlation_id,
                rejected,
                "模型返回的题目全部不合格"
            );
            return Err(AppError::generation("no valid questions in model output"));
        }

        info!(
            event = "quiz_generated",
            correlation_id = %metrics.correlation_id,
            accepted = questions.len(),
            rejected,
            model_used = %metrics.model_used,
            "出题完成"
        );

        Ok((GeneratedQuiz { questions }, metrics))
    }
}

/// 解析并校验题目，返回 (合格题目, 丢弃数)
///
/// 接受 `{"questions":[...]}` 或裸数组。`limit` 为 0 时不截断。
pub fn parse_questions(content: &str, limit: u32) -> AppResult<(Vec<Question>, usize)> {
    let value: JsonValue = serde_json::from_str(content)?;
    let items = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => match map.remove("questions") {
            Some(JsonValue::Array(items)) => items,
            _ => return Err(AppError::generation("missing \"questions\" array")),
        },
        _ => return Err(AppError::generation("expected an object or array")),
    };

    let total = items.len();
    let mut questions: Vec<Question> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<Question>(item).ok())
        .filter_map(validate_question)
        .collect();

    if limit > 0 {
        questions.truncate(limit as usize);
    }
    renumber_ids(&mut questions);

    let rejected = total.saturating_sub(questions.len());
    Ok((questions, rejected))
}

/// 单题校验，MCQ 的字母答案会被替换成选项原文
fn validate_question(question: Question) -> Option<Question> {
    if question.prompt().trim().is_empty() {
        return None;
    }

    match question {
        Question::Mcq {
            id,
            prompt,
            options,
            answer,
        } => {
            let options: Vec<String> = options
                .into_iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if options.len() < 2 {
                return None;
            }
            let expected = normalize_answer(&answer);
            let matched = options
                .iter()
                .find(|o| normalize_answer(o) == expected)
                .or_else(|| letter_option(&answer, &options))?
                .clone();
            Some(Question::Mcq {
                id,
                prompt,
                options,
                answer: matched,
            })
        }
        Question::Long { ref reference, .. } if reference.trim().is_empty() => None,
        other => Some(other),
    }
}

fn letter_option<'a>(answer: &str, options: &'a [String]) -> Option<&'a String> {
    let mut chars = answer.trim().chars();
    let letter = chars.next()?;
    if chars.next().is_some() || !letter.is_ascii_alphabetic() {
        return None;
    }
    options.get((letter.to_ascii_uppercase() as u8 - b'A') as usize)
}

/// 空 id 或重复 id 改成 q{n}
fn renumber_ids(questions: &mut [Question]) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut next = 1usize;
    for question in questions.iter_mut() {
        let id = question.id().trim().to_string();
        if !id.is_empty() && !seen.contains(&id) {
            seen.insert(id);
            continue;
        }
        let fresh = loop {
            let candidate = format!("q{}", next);
            next += 1;
            if !seen.contains(&candidate) {
                break candidate;
            }
        };
        question.set_id(fresh.clone());
        seen.insert(fresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MockProvider;
    use crate::config::Config;
    use crate::models::question::QuestionType;

    #[test]
    fn test_item_level_rejection() {
        let content = r#"{"questions":[
            {"type":"mcq","id":"q1","prompt":"2+2?","options":["3","4"],"answer":"4"},
            {"type":"mcq","id":"q2","prompt":"Only one option","options":["x"],"answer":"x"},
            {"type":"mcq","id":"q3","prompt":"Answer missing","options":["a","b"],"answer":"c"},
            {"type":"short","id":"q4","prompt":"   "},
            {"type":"essay","id":"q5","prompt":"Unknown type"},
            {"type":"long","id":"q6","prompt":"Explain","reference":"Because."}
        ]}"#;
        let (questions, rejected) = parse_questions(content, 0).unwrap();
        let ids: Vec<&str> = questions.iter().map(Question::id).collect();
        assert_eq!(ids, vec!["q1", "q6"]);
        assert_eq!(rejected, 4);
    }

    #[test]
    fn test_duplicate_ids_renumbered() {
        let content = r#"[
            {"type":"short","id":"q1","prompt":"A?"},
            {"type":"short","id":"q1","prompt":"B?"},
            {"type":"short","id":"","prompt":"C?"}
        ]"#;
        let (questions, _) = parse_questions(content, 0).unwrap();
        let ids: Vec<&str> = questions.iter().map(Question::id).collect();
        assert_eq!(ids, vec!["q1", "q2", "q3"]);
    }

    #[test]
    fn test_letter_answer_resolved_and_limit() {
        let content = r#"{"questions":[
            {"type":"mcq","id":"a","prompt":"Pick","options":["red","blue"],"answer":"B"},
            {"type":"short","id":"b","prompt":"Extra?"}
        ]}"#;
        let (questions, rejected) = parse_questions(content, 1).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(rejected, 1);
        assert_eq!(questions[0].reference(), Some("blue"));
    }

    #[test]
    fn test_missing_questions_array() {
        assert!(parse_questions(r#"{"items":[]}"#, 0).is_err());
    }

    #[tokio::test]
    async fn test_generate_quiz_end_to_end() {
        let provider = Arc::new(MockProvider::new().push_text(
            r#"{"questions":[{"type":"short","id":"q1","prompt":"What is ATP?","reference":"Energy currency"}]}"#,
        ));
        let router = Arc::new(AiRouter::new(provider.clone(), Arc::new(Config::default())));
        let config = QuizConfig {
            question_count: 1,
            question_types: vec![QuestionType::Short],
            difficulty: None,
        };

        let (quiz, metrics) = QuizGenerator::new(router)
            .generate_quiz("ATP stores energy.", &config, Some("gen-1".into()))
            .await
            .unwrap();

        assert_eq!(quiz.questions.len(), 1);
        assert_eq!(metrics.correlation_id, "gen-1");
        // 自由文本过半时优先推理模型
        assert_eq!(provider.calls()[0].model, "gpt-5-mini");
    }
}
