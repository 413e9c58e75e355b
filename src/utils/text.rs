//! 文本归一化与分词
//!
//! 精确匹配、相似度、评分量表共用同一套规则。

use phf::phf_set;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// 评分量表抽取概念时丢弃的常见词
static STOPWORDS: phf::Set<&'static str> = phf_set! {
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her",
    "was", "one", "our", "out", "has", "him", "his", "how", "its", "may", "new", "now",
    "see", "two", "way", "who", "did", "get", "let", "say", "she", "too", "use", "that",
    "with", "have", "this", "will", "your", "from", "they", "been", "were", "said", "each",
    "which", "their", "there", "what", "when", "where", "why", "about", "would", "these",
    "those", "into", "than", "then", "them", "some", "such", "only", "also", "very",
    "just", "does", "doing", "being", "because", "while", "should", "could", "other",
    "more", "most", "over", "under", "between", "through", "during", "before", "after",
    "explain", "describe", "define", "discuss", "briefly", "answer", "question",
};

fn punctuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("static regex"))
}

/// 小写、去掉非字母数字、合并空白
pub fn normalize_answer(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = punctuation_re().replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 归一化后的词元
pub fn tokens(text: &str) -> Vec<String> {
    normalize_answer(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// 词元集合
pub fn token_set(text: &str) -> HashSet<String> {
    tokens(text).into_iter().collect()
}

/// 词元集合的 Jaccard 相似度，两边都为空时为 0
pub fn jaccard(a: &str, b: &str) -> f64 {
    let a = token_set(a);
    let b = token_set(b);
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// 抽取概念词：去停用词、去掉长度不超过 2 的词，保持首次出现顺序去重
pub fn concept_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens(text)
        .into_iter()
        .filter(|t| t.chars().count() > 2 && !is_stopword(t))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
