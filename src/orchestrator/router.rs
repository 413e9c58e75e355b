//! AI 请求路由
//!
//! 出题与评分调用模型的唯一入口。组合模型选择、单次调用、响应校验与错误分类，
//! 按 `fallback` 状态机最多尝试两次（顺序执行），任何结果都带指标记录。

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::{ChatProvider, Usage};
use crate::config::Config;
use crate::error::ErrorCode;
use crate::models::router::{
    ModelFamily, RouterError, RouterMetrics, RouterRequest, RouterResult,
};
use crate::orchestrator::fallback::{transition, FallbackPolicy, RouteEvent, RouteState};
use crate::services::error_classifier::normalize_reason;
use crate::services::executor::execute_call;
use crate::services::response_validator::OutputError;
use crate::services::{
    classify, classify_error, select_models, validate_response, AttemptFailure,
    ErrorClassification,
};
use crate::utils::truncate_text;

/// AI 路由器
///
/// 持有共享的模型服务与只读配置，可在多个请求间复用。
pub struct AiRouter {
    provider: Arc<dyn ChatProvider>,
    config: Arc<Config>,
}

/// 路由过程中累积的数据
struct Attempts {
    model_used: String,
    family: ModelFamily,
    latency_ms: u64,
    usage: Option<Usage>,
    content: Option<String>,
    last_failure: Option<AttemptFailure>,
    fallback_reason: Option<String>,
}

impl AiRouter {
    pub fn new(provider: Arc<dyn ChatProvider>, config: Arc<Config>) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 路由一次请求
    ///
    /// 不会返回 Err：传输错误、服务端错误、输出形态错误都折叠进 `RouterResult`。
    pub async fn route(&self, request: RouterRequest) -> RouterResult {
        let correlation_id = request
            .context
            .correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let selection = select_models(&self.config, &request);
        let policy = FallbackPolicy {
            enabled: self.config.fallback_enabled,
            has_fallback_model: selection.fallback.is_some(),
        };

        let mut attempts = Attempts {
            model_used: selection.primary.clone(),
            family: classify(&selection.primary),
            latency_ms: 0,
            usage: None,
            content: None,
            last_failure: None,
            fallback_reason: None,
        };

        let mut state = transition(RouteState::Idle, RouteEvent::Start, &policy);

        while !state.is_terminal() {
            let model = match &state {
                RouteState::AttemptFallback { .. } => selection
                    .fallback
                    .clone()
                    .unwrap_or_else(|| selection.primary.clone()),
                _ => selection.primary.clone(),
            };

            let call = execute_call(
                self.provider.as_ref(),
                &model,
                &request,
                self.config.timeout(),
            )
            .await;

            attempts.model_used = call.model;
            attempts.family = call.family;
            attempts.latency_ms += call.latency_ms;

            let outcome = call
                .response
                .map_err(AttemptFailure::Provider)
                .and_then(|response| {
                    attempts.usage = add_usage(attempts.usage, response.usage);
                    validate_response(
                        response.content.as_deref(),
                        response.finish_reason.as_deref(),
                        self.config.json_strict,
                    )
                    .map_err(AttemptFailure::Output)
                });

            match outcome {
                Ok(validated) => {
                    if validated.repaired {
                        info!(
                            event = "json_repair_succeeded",
                            correlation_id = %correlation_id,
                            model = %attempts.model_used,
                            "模型输出经修复后为合法 JSON"
                        );
                    }
                    attempts.content = Some(validated.text);
                    state = transition(state, RouteEvent::AttemptSucceeded, &policy);
                    if let RouteState::Succeeded {
                        fallback_used: true,
                        ..
                    } = state
                    {
                        info!(
                            event = "fallback_succeeded",
                            correlation_id = %correlation_id,
                            model = %attempts.model_used,
                            "备用模型调用成功"
                        );
                    }
                }
                Err(failure) => {
                    let classification = classify_error(&failure);
                    let was_primary = matches!(state, RouteState::AttemptPrimary);
                    log_failure(&correlation_id, &attempts.model_used, was_primary, &classification, &failure);

                    state = transition(state, RouteEvent::AttemptFailed(classification), &policy);
                    if let RouteState::AttemptFallback { primary_failure } = &state {
                        let reason = normalize_reason(primary_failure.code.as_str());
                        info!(
                            event = "fallback_triggered",
                            correlation_id = %correlation_id,
                            from_model = %attempts.model_used,
                            to_model = selection.fallback.as_deref().unwrap_or_default(),
                            reason = %reason,
                            "主模型失败，切换备用模型"
                        );
                        attempts.fallback_reason = Some(reason);
                    }
                    attempts.last_failure = Some(failure);
                }
            }
        }

        let (attempt_count, fallback_triggered) = match &state {
            RouteState::Succeeded {
                attempts: count,
                fallback_used,
            }
            | RouteState::Failed {
                attempts: count,
                fallback_used,
                ..
            } => (*count, *fallback_used),
            _ => (1, false),
        };

        let metrics = RouterMetrics {
            correlation_id: correlation_id.clone(),
            model_used: attempts.model_used.clone(),
            model_family: attempts.family,
            fallback_triggered,
            model_decision_reason: selection.decision_reason.to_string(),
            attempt_count,
            latency_ms: attempts.latency_ms,
            fallback_reason: attempts.fallback_reason.clone(),
            tokens_prompt: attempts.usage.map(|u| u.prompt_tokens),
            tokens_completion: attempts.usage.map(|u| u.completion_tokens),
            tokens_total: attempts.usage.map(|u| u.total_tokens),
        };

        let result = match (state, attempts.content) {
            (RouteState::Succeeded { .. }, Some(content)) => RouterResult::ok(content, metrics),
            (RouteState::Failed { last_failure, .. }, _) => {
                let error = router_error(&last_failure, attempts.last_failure.as_ref());
                RouterResult::failed(error, metrics)
            }
            _ => RouterResult::failed(
                RouterError {
                    code: ErrorCode::UnknownError,
                    message: user_message(ErrorCode::UnknownError).to_string(),
                    recoverable: false,
                    provider_status: None,
                    provider_message: None,
                },
                metrics,
            ),
        };

        info!(
            event = "route_completed",
            correlation_id = %result.metrics.correlation_id,
            task = request.task.as_str(),
            success = result.success,
            model_used = %result.metrics.model_used,
            model_family = result.metrics.model_family.as_str(),
            fallback_triggered = result.metrics.fallback_triggered,
            model_decision_reason = %result.metrics.model_decision_reason,
            attempt_count = result.metrics.attempt_count,
            latency_ms = result.metrics.latency_ms,
            tokens_total = result.metrics.tokens_total,
            error_code = result.error.as_ref().map(|e| e.code.as_str()),
            "路由结束"
        );

        result
    }
}

fn add_usage(total: Option<Usage>, next: Option<Usage>) -> Option<Usage> {
    match (total, next) {
        (Some(a), Some(b)) => Some(Usage {
            prompt_tokens: a.prompt_tokens + b.prompt_tokens,
            completion_tokens: a.completion_tokens + b.completion_tokens,
            total_tokens: a.total_tokens + b.total_tokens,
        }),
        (a, b) => a.or(b),
    }
}

fn log_failure(
    correlation_id: &str,
    model: &str,
    was_primary: bool,
    classification: &ErrorClassification,
    failure: &AttemptFailure,
) {
    let event = if was_primary {
        "primary_failed"
    } else {
        "fallback_failed"
    };

    match failure {
        AttemptFailure::Output(OutputError::NonJson { diagnostics }) => {
            let shape = format!("{:?}", diagnostics.shape);
            let likely_truncated = diagnostics.likely_truncated;
            let preview = diagnostics.preview.as_str();
            if was_primary {
                warn!(
                    event,
                    correlation_id,
                    model,
                    code = classification.code.as_str(),
                    retryable = classification.retryable,
                    shape = %shape,
                    likely_truncated,
                    preview,
                    "模型输出无法修复为 JSON"
                );
            } else {
                error!(
                    event,
                    correlation_id,
                    model,
                    code = classification.code.as_str(),
                    shape = %shape,
                    likely_truncated,
                    preview,
                    "备用模型输出无法修复为 JSON"
                );
            }
        }
        _ => {
            let status = failure.provider_status();
            let provider_message = failure
                .provider_message()
                .map(|m| truncate_text(m, 200))
                .unwrap_or_default();
            if was_primary {
                warn!(
                    event,
                    correlation_id,
                    model,
                    code = classification.code.as_str(),
                    reason = %classification.reason,
                    retryable = classification.retryable,
                    status,
                    provider_message = %provider_message,
                    "主模型调用失败"
                );
            } else {
                error!(
                    event,
                    correlation_id,
                    model,
                    code = classification.code.as_str(),
                    reason = %classification.reason,
                    status,
                    provider_message = %provider_message,
                    "备用模型调用失败"
                );
            }
        }
    }
}

fn router_error(classification: &ErrorClassification, failure: Option<&AttemptFailure>) -> RouterError {
    RouterError {
        code: classification.code,
        message: user_message(classification.code).to_string(),
        recoverable: false,
        provider_status: failure.and_then(|f| f.provider_status()),
        provider_message: failure.and_then(|f| f.provider_message()).map(str::to_string),
    }
}

/// 给用户看的通用文案
fn user_message(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::AuthError => "The AI service is not configured correctly.",
        ErrorCode::RateLimit => "The AI service is busy right now. Please try again shortly.",
        ErrorCode::ModelEmptyResponse | ErrorCode::ModelNonJson => {
            "The AI returned an unexpected response. Please try again."
        }
        _ => "The AI service is temporarily unavailable. Please try again.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ChatResponse, MockProvider, ProviderError};
    use crate::models::router::{RequestContext, Task};

    fn router(provider: Arc<MockProvider>, config: Config) -> AiRouter {
        AiRouter::new(provider, Arc::new(config))
    }

    fn grading_request() -> RouterRequest {
        RouterRequest::new(Task::GradeShort, "grade").with_context(RequestContext {
            correlation_id: Some("corr-1".into()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_primary_success_metrics() {
        let provider = Arc::new(MockProvider::new().push(Ok(ChatResponse {
            content: Some("{\"ok\":true}".into()),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            finish_reason: Some("stop".into()),
        })));
        let result = router(provider.clone(), Config::default())
            .route(grading_request())
            .await;

        assert!(result.success);
        assert_eq!(result.content.as_deref(), Some("{\"ok\":true}"));
        assert!(result.error.is_none());
        assert_eq!(result.metrics.correlation_id, "corr-1");
        assert_eq!(result.metrics.attempt_count, 1);
        assert!(!result.metrics.fallback_triggered);
        assert_eq!(result.metrics.model_used, "gpt-4o-mini");
        assert_eq!(result.metrics.model_family, ModelFamily::Standard);
        assert_eq!(result.metrics.tokens_total, Some(15));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_after_503() {
        let provider = Arc::new(
            MockProvider::new()
                .push_status(503, "overloaded")
                .push_text("{\"ok\":true}"),
        );
        let result = router(provider.clone(), Config::default())
            .route(grading_request())
            .await;

        assert!(result.success);
        assert!(result.metrics.fallback_triggered);
        assert_eq!(result.metrics.attempt_count, 2);
        assert_eq!(result.metrics.model_used, "gpt-4o");
        assert_eq!(result.metrics.fallback_reason.as_deref(), Some("provider_error"));
        let models: Vec<String> = provider.calls().into_iter().map(|c| c.model).collect();
        assert_eq!(models, vec!["gpt-4o-mini", "gpt-4o"]);
    }

    #[tokio::test]
    async fn test_untyped_api_error_falls_back() {
        let provider = Arc::new(
            MockProvider::new()
                .push(Err(ProviderError::Api {
                    message: "The server had an error while processing your request.".into(),
                }))
                .push_text("{\"ok\":true}"),
        );
        let result = router(provider.clone(), Config::default())
            .route(grading_request())
            .await;

        assert!(result.success);
        assert!(result.metrics.fallback_triggered);
        assert_eq!(result.metrics.fallback_reason.as_deref(), Some("provider_error"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_does_not_fallback() {
        let provider = Arc::new(MockProvider::new().push_status(401, "bad key"));
        let result = router(provider.clone(), Config::default())
            .route(grading_request())
            .await;

        assert!(!result.success);
        assert!(result.content.is_none());
        assert_eq!(result.metrics.attempt_count, 1);
        assert!(!result.metrics.fallback_triggered);
        let error = result.error.unwrap();
        assert_eq!(error.code, ErrorCode::AuthError);
        assert!(!error.recoverable);
        assert_eq!(error.provider_status, Some(401));
        assert_eq!(error.provider_message.as_deref(), Some("bad key"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_at_most_two_attempts_regardless_of_retry_budget() {
        let provider = Arc::new(
            MockProvider::new()
                .push_status(503, "down")
                .push_status(429, "slow down")
                .push_text("{}"),
        );
        let config = Config {
            max_retries: 5,
            ..Config::default()
        };
        let result = router(provider.clone(), config).route(grading_request()).await;

        assert!(!result.success);
        assert_eq!(result.metrics.attempt_count, 2);
        assert!(result.metrics.fallback_triggered);
        assert_eq!(result.error.unwrap().code, ErrorCode::RateLimit);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_non_json_triggers_fallback_and_repair_is_invisible() {
        let provider = Arc::new(
            MockProvider::new()
                .push_text("I'm sorry, I can't do that.")
                .push_text("Here:\n```json\n{\"results\":[]}\n```"),
        );
        let result = router(provider, Config::default()).route(grading_request()).await;

        assert!(result.success);
        assert_eq!(result.content.as_deref(), Some("{\"results\":[]}"));
        assert_eq!(result.metrics.fallback_reason.as_deref(), Some("model_non_json"));
    }

    #[tokio::test]
    async fn test_repair_skips_citation_before_object() {
        let provider = Arc::new(MockProvider::new().push_text(
            r#"Per rubric [1] here: {"results":[{"id":"q1","score":0.95}]}"#,
        ));
        let result = router(provider.clone(), Config::default())
            .route(grading_request())
            .await;

        assert!(result.success);
        assert_eq!(
            result.content.as_deref(),
            Some(r#"{"results":[{"id":"q1","score":0.95}]}"#)
        );
        assert!(!result.metrics.fallback_triggered);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_non_strict_returns_raw_prose_without_fallback() {
        let prose = "The first answer is correct and the second one is not.";
        let provider = Arc::new(MockProvider::new().push_text(prose).push_text("{}"));
        let config = Config {
            json_strict: false,
            ..Config::default()
        };
        let result = router(provider.clone(), config).route(grading_request()).await;

        assert!(result.success);
        assert_eq!(result.content.as_deref(), Some(prose));
        assert_eq!(result.metrics.attempt_count, 1);
        assert!(!result.metrics.fallback_triggered);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_non_strict_still_rejects_empty_content() {
        let provider = Arc::new(MockProvider::new().push_text("   ").push_text("{}"));
        let config = Config {
            json_strict: false,
            ..Config::default()
        };
        let result = router(provider.clone(), config).route(grading_request()).await;

        assert!(result.success);
        assert!(result.metrics.fallback_triggered);
        assert_eq!(result.metrics.fallback_reason.as_deref(), Some("model_empty_response"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_fallback_disabled() {
        let provider = Arc::new(MockProvider::new().push(Err(ProviderError::Connection(
            "refused".into(),
        ))));
        let config = Config {
            fallback_enabled: false,
            ..Config::default()
        };
        let result = router(provider, config).route(grading_request()).await;

        assert!(!result.success);
        assert_eq!(result.metrics.attempt_count, 1);
        let error = result.error.unwrap();
        assert_eq!(error.code, ErrorCode::NetworkError);
        assert!(!error.recoverable);
    }

    #[tokio::test]
    async fn test_generates_correlation_id() {
        let provider = Arc::new(MockProvider::new().push_text("{}"));
        let result = router(provider, Config::default())
            .route(RouterRequest::new(Task::GradeShort, "x"))
            .await;
        assert!(Uuid::parse_str(&result.metrics.correlation_id).is_ok());
    }
}
