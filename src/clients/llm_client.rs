/// LLM API 客户端
///
/// 定义与模型服务交互的唯一接口 `ChatProvider`，以及基于 `async-openai` 的实现。
/// 路由层只依赖 trait，测试时注入脚本化的假实现。
use crate::config::Config;
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// token 上限参数名，reasoning 与 standard 模型不同
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenLimitParam {
    MaxTokens,
    MaxCompletionTokens,
}

impl TokenLimitParam {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenLimitParam::MaxTokens => "max_tokens",
            TokenLimitParam::MaxCompletionTokens => "max_completion_tokens",
        }
    }
}

/// 单次调用的参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallParams {
    /// reasoning 模型永远为 None
    pub temperature: Option<f32>,
    pub token_param: TokenLimitParam,
    pub max_output_tokens: u32,
    /// 要求严格 JSON 输出
    pub json_mode: bool,
}

/// 发送给模型服务的请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub params: CallParams,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// 模型服务返回
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub usage: Option<Usage>,
    /// 例如 "stop" / "length"
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            usage: None,
            finish_reason: Some("stop".to_string()),
        }
    }
}

/// 传输层 / 服务端错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// 连接失败、连接被重置
    #[error("连接失败: {0}")]
    Connection(String),
    /// 超过配置的超时时间
    #[error("请求超时 ({after_ms} ms)")]
    Timeout { after_ms: u64 },
    /// 服务端返回了 HTTP 错误状态
    #[error("服务端返回 {status}: {message}")]
    Status { status: u16, message: String },
    /// 服务端错误但无法确定状态码
    #[error("服务端错误: {message}")]
    Api { message: String },
    /// 请求构建失败
    #[error("请求构建失败: {0}")]
    InvalidRequest(String),
    /// 响应结构无法解析
    #[error("响应无法解析: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn provider_message(&self) -> Option<&str> {
        match self {
            ProviderError::Status { message, .. } | ProviderError::Api { message } => {
                Some(message)
            }
            _ => None,
        }
    }
}

/// 模型服务抽象，启动时构建一次，通过 `Arc` 传入路由层
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// 基于 async-openai 的客户端（兼容 OpenAI API 的服务均可）
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// 创建新的客户端
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
        }
    }

    #[allow(deprecated)]
    fn build_request(
        request: &ChatRequest,
    ) -> Result<async_openai::types::chat::CreateChatCompletionRequest, OpenAIError> {
        let mut messages = Vec::new();

        if let Some(sys_msg) = &request.system_prompt {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg.as_str())
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.as_str())
            .build()?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&request.model).messages(messages);

        if let Some(temperature) = request.params.temperature {
            builder.temperature(temperature);
        }
        match request.params.token_param {
            TokenLimitParam::MaxTokens => {
                builder.max_tokens(request.params.max_output_tokens);
            }
            TokenLimitParam::MaxCompletionTokens => {
                builder.max_completion_tokens(request.params.max_output_tokens);
            }
        }
        if request.params.json_mode {
            builder.response_format(ResponseFormat::JsonObject);
        }

        builder.build()
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        debug!(
            "调用 LLM API，模型: {}, {}={}",
            request.model,
            request.params.token_param.as_str(),
            request.params.max_output_tokens
        );

        let api_request = Self::build_request(&request)
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;

        let response = self.client.chat().create(api_request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            map_openai_error(e)
        })?;

        debug!("LLM API 调用成功");

        let choice = response.choices.into_iter().next();
        let finish_reason = choice
            .as_ref()
            .and_then(|c| c.finish_reason.as_ref())
            .and_then(|r| serde_json::to_value(r).ok())
            .and_then(|v| v.as_str().map(str::to_string));

        Ok(ChatResponse {
            content: choice.and_then(|c| c.message.content),
            usage: response.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason,
        })
    }
}

fn map_openai_error(err: OpenAIError) -> ProviderError {
    match err {
        OpenAIError::Reqwest(e) => {
            if let Some(status) = e.status() {
                ProviderError::Status {
                    status: status.as_u16(),
                    message: e.to_string(),
                }
            } else if e.is_timeout() {
                ProviderError::Connection(format!("timeout: {}", e))
            } else {
                ProviderError::Connection(e.to_string())
            }
        }
        OpenAIError::ApiError(api) => {
            match infer_status(api.r#type.as_deref(), &api.message) {
                Some(status) => ProviderError::Status {
                    status,
                    message: api.message,
                },
                None => ProviderError::Api {
                    message: api.message,
                },
            }
        }
        other => ProviderError::Malformed(other.to_string()),
    }
}

/// async-openai 的 ApiError 不携带 HTTP 状态码，根据错误类型与文案还原
fn infer_status(kind: Option<&str>, message: &str) -> Option<u16> {
    let message = message.to_lowercase();
    match kind.unwrap_or_default() {
        "authentication_error" => return Some(401),
        "permission_error" => return Some(403),
        "rate_limit_error" | "requests" | "tokens" => return Some(429),
        "server_error" | "api_error" => return Some(500),
        "service_unavailable" | "overloaded_error" => return Some(503),
        "invalid_request_error" => {
            if message.contains("api key") {
                return Some(401);
            }
            return Some(400);
        }
        _ => {}
    }
    if message.contains("rate limit") {
        Some(429)
    } else if message.contains("incorrect api key") || message.contains("invalid api key") {
        Some(401)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(token_param: TokenLimitParam, temperature: Option<f32>) -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".to_string(),
            system_prompt: Some("你是一个简洁的助手".to_string()),
            prompt: "hello".to_string(),
            params: CallParams {
                temperature,
                token_param,
                max_output_tokens: 2000,
                json_mode: true,
            },
        }
    }

    #[test]
    fn test_build_request_standard() {
        let req = OpenAiProvider::build_request(&sample_request(TokenLimitParam::MaxTokens, Some(0.1)))
            .unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["max_tokens"], 2000);
        assert!(json.get("max_completion_tokens").map_or(true, |v| v.is_null()));
        assert!(json["temperature"].as_f64().is_some());
        assert_eq!(json["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_build_request_reasoning() {
        let req = OpenAiProvider::build_request(&sample_request(
            TokenLimitParam::MaxCompletionTokens,
            None,
        ))
        .unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["max_completion_tokens"], 2000);
        assert!(json.get("temperature").map_or(true, |v| v.is_null()));
    }

    #[test]
    fn test_infer_status() {
        assert_eq!(infer_status(Some("authentication_error"), ""), Some(401));
        assert_eq!(infer_status(None, "Rate limit reached for requests"), Some(429));
        assert_eq!(
            infer_status(Some("invalid_request_error"), "Unsupported parameter: 'temperature'"),
            Some(400)
        );
        assert_eq!(infer_status(None, "something odd"), None);
    }

    #[test]
    fn test_provider_error_accessors() {
        let err = ProviderError::Status {
            status: 503,
            message: "overloaded".into(),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.provider_message(), Some("overloaded"));
        assert_eq!(ProviderError::Timeout { after_ms: 10 }.status(), None);
    }
}
