use std::time::Duration;

use crate::models::router::Task;

/// 程序配置
///
/// 全部来自环境变量，启动时读取一次，之后只读共享。
#[derive(Clone, Debug)]
pub struct Config {
    // --- 模型选择 ---
    pub generation_default_model: String,
    pub generation_fallback_model: String,
    pub grading_default_model: String,
    pub grading_fallback_model: String,
    /// 是否允许切换到备用模型（最多一次）
    pub fallback_enabled: bool,
    /// 修复失败时是否直接报错；关闭后返回原文
    pub json_strict: bool,
    /// 单次调用超时（毫秒）
    pub timeout_ms: u64,
    /// 仅记录，不会增加尝试次数
    pub max_retries: u32,
    // --- LLM 服务 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    // --- 日志 ---
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generation_default_model: "gpt-4o-mini".to_string(),
            generation_fallback_model: "gpt-5-mini".to_string(),
            grading_default_model: "gpt-4o-mini".to_string(),
            grading_fallback_model: "gpt-4o".to_string(),
            fallback_enabled: true,
            json_strict: true,
            timeout_ms: 60_000,
            max_retries: 1,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            generation_default_model: std::env::var("QUIZ_MODEL_GENERATION_DEFAULT").unwrap_or(default.generation_default_model),
            generation_fallback_model: std::env::var("QUIZ_MODEL_GENERATION_FALLBACK").unwrap_or(default.generation_fallback_model),
            grading_default_model: std::env::var("QUIZ_MODEL_GRADING_DEFAULT").unwrap_or(default.grading_default_model),
            grading_fallback_model: std::env::var("QUIZ_MODEL_GRADING_FALLBACK").unwrap_or(default.grading_fallback_model),
            fallback_enabled: env_flag("AI_FALLBACK_ENABLED").unwrap_or(default.fallback_enabled),
            json_strict: env_flag("AI_JSON_STRICT").unwrap_or(default.json_strict),
            timeout_ms: std::env::var("AI_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.timeout_ms),
            max_retries: std::env::var("AI_MAX_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_retries),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            log_json: env_flag("LOG_JSON").unwrap_or(default.log_json),
        }
    }

    /// 某个任务配置的 (默认模型, 备用模型)
    pub fn models_for(&self, task: Task) -> (&str, &str) {
        if task.is_generation() {
            (&self.generation_default_model, &self.generation_fallback_model)
        } else {
            (&self.grading_default_model, &self.grading_fallback_model)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| parse_flag(&v))
}

/// 解析布尔开关，接受 true/false/1/0/yes/no/on/off
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("yes"), Some(true));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_models_for_task() {
        let config = Config::default();
        assert_eq!(
            config.models_for(Task::QuizGeneration),
            ("gpt-4o-mini", "gpt-5-mini")
        );
        assert_eq!(config.models_for(Task::GradeShort), ("gpt-4o-mini", "gpt-4o"));
        assert_eq!(config.timeout(), Duration::from_millis(60_000));
    }
}
