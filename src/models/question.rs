use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// 选择题
    Mcq,
    /// 简答题
    Short,
    /// 论述题
    Long,
}

impl QuestionType {
    /// 简答 / 论述都算自由文本
    pub fn is_free_text(self) -> bool {
        !matches!(self, QuestionType::Mcq)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Mcq => "mcq",
            QuestionType::Short => "short",
            QuestionType::Long => "long",
        }
    }
}

/// 题目
///
/// id 在同一份测验内唯一。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Question {
    Mcq {
        id: String,
        prompt: String,
        options: Vec<String>,
        answer: String,
    },
    Short {
        id: String,
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
    },
    Long {
        id: String,
        prompt: String,
        reference: String,
    },
}

impl Question {
    pub fn id(&self) -> &str {
        match self {
            Question::Mcq { id, .. } | Question::Short { id, .. } | Question::Long { id, .. } => id,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            Question::Mcq { prompt, .. }
            | Question::Short { prompt, .. }
            | Question::Long { prompt, .. } => prompt,
        }
    }

    pub fn question_type(&self) -> QuestionType {
        match self {
            Question::Mcq { .. } => QuestionType::Mcq,
            Question::Short { .. } => QuestionType::Short,
            Question::Long { .. } => QuestionType::Long,
        }
    }

    /// 参考答案（选择题返回正确选项）
    pub fn reference(&self) -> Option<&str> {
        match self {
            Question::Mcq { answer, .. } => Some(answer),
            Question::Short { reference, .. } => reference.as_deref().filter(|r| !r.trim().is_empty()),
            Question::Long { reference, .. } => Some(reference),
        }
    }

    pub(crate) fn set_id(&mut self, new_id: String) {
        match self {
            Question::Mcq { id, .. } | Question::Short { id, .. } | Question::Long { id, .. } => {
                *id = new_id
            }
        }
    }
}

/// 出题配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizConfig {
    pub question_count: u32,
    /// 请求的题型组合，按条目计数（可重复）
    #[serde(default)]
    pub question_types: Vec<QuestionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

impl QuizConfig {
    /// 自由文本题型是否过半
    pub fn is_free_text_majority(&self) -> bool {
        if self.question_types.is_empty() {
            return false;
        }
        let free = self
            .question_types
            .iter()
            .filter(|t| t.is_free_text())
            .count();
        free * 2 > self.question_types.len()
    }
}

/// 一次作答提交（CLI 从 TOML 读取）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub quiz_id: Option<String>,
    pub questions: Vec<Question>,
    /// 题目 id -> 学生答案
    #[serde(default)]
    pub responses: HashMap<String, String>,
}

/// 模型生成并通过校验的测验
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratedQuiz {
    pub questions: Vec<Question>,
}
