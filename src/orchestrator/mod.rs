//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `fallback` - 备用模型状态机
//! - 显式的状态与转移函数，保证每个请求最多切换一次备用模型
//!
//! ### `router` - AI 请求路由
//! - 出题与评分调用模型的唯一入口
//! - 组合模型选择、单次调用、响应校验、错误分类
//! - 所有结果都带 `RouterMetrics`
//!
//! ## 层次关系
//!
//! ```text
//! workflow (出题 / 评分流程)
//!     ↓
//! orchestrator::router (最多两次顺序调用)
//!     ↓
//! services (选择 / 参数 / 调用 / 校验 / 分类)
//!     ↓
//! clients (ChatProvider)
//! ```

pub mod fallback;
pub mod router;

pub use fallback::{transition, FallbackPolicy, RouteEvent, RouteState};
pub use router::AiRouter;
