//! 单次调用执行
//!
//! 负责一次对模型服务的调用：构建参数、施加超时、计时、记录用量。
//! 不做校验、不做重试。

use std::time::{Duration, Instant};

use tracing::debug;

use crate::clients::{ChatProvider, ChatRequest, ChatResponse, ProviderError};
use crate::models::router::{ModelFamily, RouterRequest};
use crate::services::model_family::classify;
use crate::services::params::build_params;

/// 一次调用的结果
#[derive(Debug, Clone)]
pub struct ExecutedCall {
    pub model: String,
    pub family: ModelFamily,
    pub latency_ms: u64,
    pub response: Result<ChatResponse, ProviderError>,
}

/// 对指定模型执行一次调用
///
/// 超时由 `tokio::time::timeout` 强制执行，超时视为网络错误。
pub async fn execute_call(
    provider: &dyn ChatProvider,
    model: &str,
    request: &RouterRequest,
    timeout: Duration,
) -> ExecutedCall {
    let family = classify(model);
    let params = build_params(
        family,
        request.task,
        request.context.question_count,
        request.temperature,
    );
    let chat_request = ChatRequest {
        model: model.to_string(),
        system_prompt: request.system_prompt.clone(),
        prompt: request.prompt.clone(),
        params,
    };

    let started = Instant::now();
    let response = match tokio::time::timeout(timeout, provider.complete(chat_request)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            after_ms: timeout.as_millis() as u64,
        }),
    };
    let latency_ms = started.elapsed().as_millis() as u64;

    debug!(
        model = model,
        family = family.as_str(),
        latency_ms = latency_ms,
        ok = response.is_ok(),
        "模型调用结束"
    );

    ExecutedCall {
        model: model.to_string(),
        family,
        latency_ms,
        response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MockProvider, TokenLimitParam};
    use crate::models::router::Task;
    use async_trait::async_trait;

    #[tokio::test]
    async fn test_execute_builds_family_params() {
        let provider = MockProvider::new().push_text("{}").push_text("{}");
        let request = RouterRequest::new(Task::GradeShort, "grade this").with_temperature(0.3);

        let call = execute_call(&provider, "gpt-5-mini", &request, Duration::from_secs(5)).await;
        assert_eq!(call.family, ModelFamily::Reasoning);
        assert!(call.response.is_ok());

        let call = execute_call(&provider, "gpt-4o-mini", &request, Duration::from_secs(5)).await;
        assert_eq!(call.family, ModelFamily::Standard);

        let calls = provider.calls();
        assert_eq!(calls[0].params.temperature, None);
        assert_eq!(calls[0].params.token_param, TokenLimitParam::MaxCompletionTokens);
        assert_eq!(calls[1].params.temperature, Some(0.3));
        assert_eq!(calls[1].params.max_output_tokens, 2000);
    }

    struct SlowProvider;

    #[async_trait]
    impl ChatProvider for SlowProvider {
        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ChatResponse::text("{}"))
        }
    }

    #[tokio::test]
    async fn test_timeout_is_enforced() {
        let request = RouterRequest::new(Task::GradeShort, "x");
        let call = execute_call(&SlowProvider, "gpt-4o-mini", &request, Duration::from_millis(50)).await;
        assert_eq!(call.response, Err(ProviderError::Timeout { after_ms: 50 }));
    }
}
