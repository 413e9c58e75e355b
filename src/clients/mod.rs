pub mod llm_client;
pub mod mock;

pub use llm_client::{
    CallParams, ChatProvider, ChatRequest, ChatResponse, OpenAiProvider, ProviderError,
    TokenLimitParam, Usage,
};
pub use mock::MockProvider;
