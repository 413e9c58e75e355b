//! # Quiz Router
//!
//! 教育场景下的 AI 请求路由与混合评分核心
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 模型服务抽象，只负责一次调用
//! - `ChatProvider` - 可替换的模型服务接口（`OpenAiProvider` / `MockProvider`）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 无状态的单一能力
//! - 模型分类、参数构建、模型选择、响应校验与修复、错误分类、提示词
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/fallback` - 备用模型状态机，每个请求最多一次切换
//! - `orchestrator/router` - `AiRouter`，出题与评分调用模型的唯一入口
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/grading_cascade` - 精确匹配 → 相似度 → 批量语义评分
//! - `workflow/rubric` - 论述题评分量表
//! - `workflow/quiz_generation` - 笔记出题
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::{App, Cli, Command};
pub use clients::{ChatProvider, MockProvider, OpenAiProvider};
pub use config::Config;
pub use error::{AppError, AppResult, ErrorCode, GradingError};
pub use models::{GradeReport, Question, RouterRequest, RouterResult, Task};
pub use orchestrator::AiRouter;
pub use workflow::{GradingCascade, QuizGenerator};
