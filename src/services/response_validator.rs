//! 响应校验与修复
//!
//! 模型返回的文本名义上是 JSON，实际上经常被包在 markdown 代码块里、夹着说明文字、
//! 或者被截断。这里只做一次性的判定：
//!
//! 1. 空白 => `MODEL_EMPTY_RESPONSE`
//! 2. 直接解析成功 => 原样返回
//! 3. 否则尝试修复：先取代码块内部，再做括号配对截取，对象优先
//! 4. 修复成功 => 返回修复后的文本
//! 5. 修复失败 => 判定内容形态、估计是否截断，返回 `MODEL_NON_JSON`
//!
//! 这里不做重试，重试策略只在路由层。

use regex::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::warn;

use crate::error::ErrorCode;
use crate::utils::truncate_text;

/// 诊断信息里保留的预览长度
const PREVIEW_CHARS: usize = 200;
/// 括号配对最多尝试的起点数量
const MAX_SCAN_CANDIDATES: usize = 16;

/// 无法修复时内容的大致形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentShape {
    Empty,
    JsonLike,
    Fenced,
    Refusal,
    Prose,
}

/// 失败诊断，只进日志
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputDiagnostics {
    pub shape: ContentShape,
    pub likely_truncated: bool,
    pub finish_reason: Option<String>,
    pub length: usize,
    pub preview: String,
}

/// 模型输出形态错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OutputError {
    #[error("模型返回内容为空")]
    Empty { finish_reason: Option<String> },
    #[error("模型返回内容不是合法 JSON")]
    NonJson { diagnostics: OutputDiagnostics },
}

impl OutputError {
    pub fn code(&self) -> ErrorCode {
        match self {
            OutputError::Empty { .. } => ErrorCode::ModelEmptyResponse,
            OutputError::NonJson { .. } => ErrorCode::ModelNonJson,
        }
    }
}

/// 校验通过的文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedJson {
    pub text: String,
    /// 经过修复（对调用方不可见，只用于日志）
    pub repaired: bool,
}

/// 校验并在必要时修复模型输出
///
/// # 参数
/// - `content`: 模型返回的文本
/// - `finish_reason`: 模型给出的结束原因
/// - `strict`: 为 false 时修复失败返回原文而不是报错（空内容仍然报错）
pub fn validate_response(
    content: Option<&str>,
    finish_reason: Option<&str>,
    strict: bool,
) -> Result<ValidatedJson, OutputError> {
    let text = content.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(OutputError::Empty {
            finish_reason: finish_reason.map(str::to_string),
        });
    }

    if is_valid_json(text) {
        return Ok(ValidatedJson {
            text: text.to_string(),
            repaired: false,
        });
    }

    if let Some(repaired) = extract_json(text) {
        return Ok(ValidatedJson {
            text: repaired,
            repaired: true,
        });
    }

    let diagnostics = diagnose(text, finish_reason);
    if !strict {
        warn!(
            event = "json_repair_skipped",
            shape = ?diagnostics.shape,
            likely_truncated = diagnostics.likely_truncated,
            "JSON 修复失败，非严格模式返回原文"
        );
        return Ok(ValidatedJson {
            text: text.to_string(),
            repaired: false,
        });
    }

    Err(OutputError::NonJson { diagnostics })
}

/// 从夹杂文字的输出中提取 JSON
///
/// 候选顺序：代码块内部，然后括号配对。对象或以对象开头的数组优先；
/// 正文里的 `[1]` 这类标量片段只在没有结构化候选时才返回。都失败返回 None。
pub fn extract_json(text: &str) -> Option<String> {
    let fenced = fence_re()
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|inner| inner.as_str().trim());
    let scanned = text
        .char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .take(MAX_SCAN_CANDIDATES)
        .filter_map(|(start, _)| {
            let end = matching_close(&text[start..])?;
            Some(&text[start..start + end])
        });

    let mut scalar: Option<&str> = None;
    for candidate in fenced.chain(scanned) {
        let Ok(value) = serde_json::from_str::<JsonValue>(candidate) else {
            continue;
        };
        if is_structured(&value) {
            return Some(candidate.to_string());
        }
        scalar.get_or_insert(candidate);
    }
    scalar.map(str::to_string)
}

/// 对象，或第一个元素是对象的数组
fn is_structured(value: &JsonValue) -> bool {
    match value {
        JsonValue::Object(_) => true,
        JsonValue::Array(items) => items.first().is_some_and(JsonValue::is_object),
        _ => false,
    }
}

fn is_valid_json(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text.trim()).is_ok()
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_-]*[ \t]*\r?\n?([\s\S]*?)```").expect("static regex"))
}

/// 从开括号开始配对，返回配对闭括号之后的字节偏移
///
/// 字符串内部的括号与转义字符不计入深度。
fn matching_close(text: &str) -> Option<usize> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(idx + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn diagnose(text: &str, finish_reason: Option<&str>) -> OutputDiagnostics {
    let shape = classify_shape(text);
    let trimmed = text.trim_end();
    let length_limited = finish_reason
        .map(|r| r.eq_ignore_ascii_case("length"))
        .unwrap_or(false);
    let unterminated = shape == ContentShape::JsonLike
        && !(trimmed.ends_with('}') || trimmed.ends_with(']'));

    OutputDiagnostics {
        shape,
        likely_truncated: length_limited || unterminated,
        finish_reason: finish_reason.map(str::to_string),
        length: text.chars().count(),
        preview: truncate_text(text.trim(), PREVIEW_CHARS),
    }
}

/// 判定内容形态
pub fn classify_shape(text: &str) -> ContentShape {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ContentShape::Empty;
    }
    if trimmed.contains("```") {
        return ContentShape::Fenced;
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return ContentShape::JsonLike;
    }
    let lowered = trimmed.to_lowercase();
    const REFUSAL_MARKERS: [&str; 6] = [
        "i'm sorry",
        "i am sorry",
        "i cannot",
        "i can't",
        "unable to comply",
        "as an ai",
    ];
    if REFUSAL_MARKERS.iter().any(|m| lowered.contains(m)) {
        return ContentShape::Refusal;
    }
    ContentShape::Prose
}
