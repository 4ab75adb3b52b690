//! LLM 层：生成客户端抽象与实现（OpenAI 兼容 / Groq / Mock）

pub mod groq;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;

pub use groq::{create_groq_client, GROQ_BASE_URL, GROQ_DEFAULT_MODEL};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{generate_with_retry, AgentRole, GenerationRequest, LlmClient, LlmError};

/// 根据配置与环境变量选择后端（Groq / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let timeout = Duration::from_secs(cfg.llm.timeouts.request);
    let has_groq = std::env::var("GROQ_API_KEY").is_ok();
    let has_openai = std::env::var("OPENAI_API_KEY").is_ok();

    if provider == "mock" {
        tracing::info!("Using offline mock LLM");
        return Arc::new(MockLlmClient);
    }

    if has_groq && (provider == "groq" || !has_openai) {
        tracing::info!("Using Groq LLM ({})", cfg.llm.model);
        let client = match cfg.llm.base_url.as_deref() {
            Some(base) => OpenAiClient::new(
                Some(base),
                &cfg.llm.model,
                std::env::var("GROQ_API_KEY").ok().as_deref(),
            ),
            None => create_groq_client(Some(&cfg.llm.model)),
        };
        Arc::new(client.with_max_tokens(cfg.llm.max_tokens).with_timeout(timeout))
    } else if has_openai {
        tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
        Arc::new(
            OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                std::env::var("OPENAI_API_KEY").ok().as_deref(),
            )
            .with_max_tokens(cfg.llm.max_tokens)
            .with_timeout(timeout),
        )
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient)
    }
}
