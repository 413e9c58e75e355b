use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::clients::{ChatProvider, OpenAiProvider};
use crate::config::Config;
use crate::error::AppError;
use crate::models::question::{QuestionType, QuizConfig};
use crate::models::{load_notes, load_submission};
use crate::orchestrator::AiRouter;
use crate::services::params::DEFAULT_QUESTION_COUNT;
use crate::utils::logging::log_startup;
use crate::workflow::{GradingCascade, QuizGenerator};

/// 命令行入口
#[derive(Debug, Parser)]
#[command(name = "quiz-router")]
#[command(about = "AI quiz generation and hybrid answer grading")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// 子命令
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// 给 TOML 作答文件评分
    Grade { submission: PathBuf },
    /// 根据笔记出题
    Generate {
        notes: PathBuf,
        #[arg(default_value_t = DEFAULT_QUESTION_COUNT)]
        count: u32,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Grade { .. } => "grade",
            Command::Generate { .. } => "generate",
        }
    }
}

/// 应用主结构
pub struct App {
    router: Arc<AiRouter>,
}

impl App {
    /// 用真实模型服务初始化
    pub fn initialize(config: Config) -> Result<Self> {
        if config.llm_api_key.trim().is_empty() {
            return Err(AppError::env_var_missing("LLM_API_KEY").into());
        }
        let provider: Arc<dyn ChatProvider> = Arc::new(OpenAiProvider::new(&config));
        Ok(Self::with_provider(config, provider))
    }

    /// 注入任意模型服务（测试用假服务）
    pub fn with_provider(config: Config, provider: Arc<dyn ChatProvider>) -> Self {
        let router = Arc::new(AiRouter::new(provider, Arc::new(config)));
        Self { router }
    }

    /// 执行子命令，返回要打印的 JSON
    pub async fn run(&self, command: &Command) -> Result<String> {
        log_startup(command.name(), self.router.config().fallback_enabled);

        match command {
            Command::Grade { submission } => self.grade(submission).await,
            Command::Generate { notes, count } => self.generate(notes, *count).await,
        }
    }

    async fn grade(&self, path: &Path) -> Result<String> {
        let submission = load_submission(path).await?;

        let report = GradingCascade::new(self.router.clone())
            .grade_submission(&submission.questions, &submission.responses, None)
            .await
            .map_err(AppError::from)?;

        info!("✓ 得分 {}% ({})", report.percent, report.letter_grade);
        Ok(serde_json::to_string_pretty(&report)?)
    }

    async fn generate(&self, path: &Path, count: u32) -> Result<String> {
        let notes = load_notes(path).await?;
        let config = QuizConfig {
            question_count: count,
            question_types: vec![QuestionType::Mcq, QuestionType::Short, QuestionType::Long],
            difficulty: None,
        };

        let (quiz, metrics) = QuizGenerator::new(self.router.clone())
            .generate_quiz(&notes, &config, None)
            .await?;

        info!(
            "✓ 生成 {} 道题 (模型: {}, 备用: {})",
            quiz.questions.len(),
            metrics.model_used,
            metrics.fallback_triggered
        );
        Ok(serde_json::to_string_pretty(&serde_json::json!({
            "quiz": quiz,
            "metrics": metrics,
        }))?)
    }
}
