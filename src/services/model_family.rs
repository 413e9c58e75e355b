//! 模型家族分类
//!
//! 纯函数，大小写不敏感，对任意输入都有结果。

use phf::phf_set;

use crate::models::router::ModelFamily;

/// reasoning 家族的模型名前缀
static REASONING_PREFIXES: phf::Set<&'static str> = phf_set! {
    "o1",
    "o3",
    "o4",
    "gpt-5",
};

/// 模型名 -> 能力分类
///
/// 命中 reasoning 前缀或名字里带 "reasoning" 的归为 reasoning，其余为 standard。
/// 带服务商前缀的名字（如 `openai/gpt-5-mini`）只看最后一段。
pub fn classify(model: &str) -> ModelFamily {
    let lowered = model.trim().to_lowercase();
    let name = lowered.rsplit('/').next().unwrap_or(&lowered);

    if name.contains("reasoning") || REASONING_PREFIXES.iter().any(|p| name.starts_with(p)) {
        ModelFamily::Reasoning
    } else {
        ModelFamily::Standard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_reasoning() {
        assert_eq!(classify("gpt-5-mini"), ModelFamily::Reasoning);
        assert_eq!(classify("o3-mini"), ModelFamily::Reasoning);
        assert_eq!(classify("O1"), ModelFamily::Reasoning);
        assert_eq!(classify("openai/gpt-5"), ModelFamily::Reasoning);
        assert_eq!(classify("deepseek-reasoning-lite"), ModelFamily::Reasoning);
    }

    #[test]
    fn test_classify_standard() {
        assert_eq!(classify("GPT-4O-MINI"), ModelFamily::Standard);
        assert_eq!(classify("gpt-4o"), ModelFamily::Standard);
        assert_eq!(classify(""), ModelFamily::Standard);
        assert_eq!(classify("doubao-seed-1.6"), ModelFamily::Standard);
    }
}
