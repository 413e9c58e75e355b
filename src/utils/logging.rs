/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// # 参数
/// - `json`: 为 true 时每条事件输出一行扁平 JSON（含 timestamp / level），供外部采集
///
/// 过滤级别读取 `RUST_LOG`，默认 info。重复调用无副作用。
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_target(false)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };

    if result.is_ok() {
        info!(json_logs = json, "日志初始化完成");
    }
}

/// 记录程序启动信息
///
/// # 参数
/// - `command`: 子命令名
/// - `fallback_enabled`: 是否允许备用模型
pub fn log_startup(command: &str, fallback_enabled: bool) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - {}", command);
    info!("🔁 备用模型: {}", if fallback_enabled { "开启" } else { "关闭" });
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
