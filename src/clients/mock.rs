//! 脚本化的假模型服务
//!
//! 按顺序返回预先压入的结果，并记录每一次收到的请求。单元测试与集成测试共用。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::llm_client::{ChatProvider, ChatRequest, ChatResponse, ProviderError};

#[derive(Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<Result<ChatResponse, ProviderError>>>,
    calls: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 下一次调用返回给定文本
    pub fn push_text(self, content: impl Into<String>) -> Self {
        self.push(Ok(ChatResponse::text(content)))
    }

    /// 下一次调用返回指定 HTTP 状态错误
    pub fn push_status(self, status: u16, message: impl Into<String>) -> Self {
        self.push(Err(ProviderError::Status {
            status,
            message: message.into(),
        }))
    }

    pub fn push(self, outcome: Result<ChatResponse, ProviderError>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
        self
    }

    /// 已收到的请求（按顺序）
    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request);
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| Err(ProviderError::Connection("mock script exhausted".to_string())))
    }
}
