use crate::models::question::Submission;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载一次作答提交
pub async fn load_submission(toml_file_path: &Path) -> Result<Submission> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let submission = parse_submission(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    tracing::info!(
        "成功加载 {} 个题目, {} 条作答",
        submission.questions.len(),
        submission.responses.len()
    );

    Ok(submission)
}

/// 解析提交内容并检查题目 id 唯一
pub fn parse_submission(content: &str) -> Result<Submission> {
    let submission: Submission = toml::from_str(content)?;

    let mut seen = HashSet::new();
    for question in &submission.questions {
        if !seen.insert(question.id()) {
            anyhow::bail!("题目 id 重复: {}", question.id());
        }
    }

    Ok(submission)
}

/// 读取笔记原文
pub async fn load_notes(path: &Path) -> Result<String> {
    let notes = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取笔记文件: {}", path.display()))?;
    if notes.trim().is_empty() {
        anyhow::bail!("笔记文件为空: {}", path.display());
    }
    Ok(notes)
}
