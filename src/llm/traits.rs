//! 生成客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Groq / Mock）实现 LlmClient::generate(role, prompt, temperature, history)；
//! role 用于选择角色默认值与日志，history 是已裁剪的窗口而非完整记录。

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::Message;

/// 四个 Agent 角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    PathGenerator,
    Tutor,
    Evaluator,
    Reviewer,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::PathGenerator => "path_generator",
            AgentRole::Tutor => "tutor",
            AgentRole::Evaluator => "evaluator",
            AgentRole::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次生成请求
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub role: AgentRole,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    /// 已按角色窗口裁剪的历史
    pub history: Vec<Message>,
    /// 要求后端返回 JSON 对象
    pub json: bool,
}

impl GenerationRequest {
    pub fn new(role: AgentRole, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            role,
            system: system.into(),
            prompt: prompt.into(),
            temperature: 0.7,
            history: Vec::new(),
            json: true,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// system + history + 当前 prompt，按 API 顺序拼好的消息列表
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(Message::system(self.system.clone()));
        messages.extend(self.history.iter().cloned());
        messages.push(Message::user(self.prompt.clone()));
        messages
    }
}

/// 生成客户端错误（均视为瞬时错误，可重试）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("empty response")]
    EmptyResponse,
}

/// 生成客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 带有限重试的生成：仅对 LlmError 与空回复重试，预算用尽时返回最后一次错误
pub async fn generate_with_retry(
    llm: &dyn LlmClient,
    request: &GenerationRequest,
    max_attempts: u32,
) -> Result<String, LlmError> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match llm.generate(request).await {
            Ok(text) if text.trim().is_empty() => {
                if attempt >= max_attempts {
                    return Err(LlmError::EmptyResponse);
                }
                tracing::warn!(role = %request.role, attempt, "empty generation, retrying");
            }
            Ok(text) => return Ok(text),
            Err(e) => {
                if attempt >= max_attempts {
                    return Err(e);
                }
                tracing::warn!(role = %request.role, attempt, error = %e, "generation failed, retrying");
            }
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    fn request() -> GenerationRequest {
        GenerationRequest::new(AgentRole::Tutor, "sys", "prompt")
            .with_history(vec![Message::assistant("earlier")])
    }

    #[test]
    fn test_to_messages_order() {
        let messages = request().to_messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], Message::system("sys"));
        assert_eq!(messages[1], Message::assistant("earlier"));
        assert_eq!(messages[2], Message::user("prompt"));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_single_failure() {
        let llm = ScriptedLlmClient::new()
            .fail(AgentRole::Tutor, LlmError::Request("503".into()))
            .reply(AgentRole::Tutor, "ok");
        let text = generate_with_retry(&llm, &request(), 2).await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(llm.calls(AgentRole::Tutor), 2);
    }

    #[tokio::test]
    async fn test_retry_surfaces_after_budget() {
        let llm = ScriptedLlmClient::new()
            .fail(AgentRole::Tutor, LlmError::Request("503".into()))
            .fail(AgentRole::Tutor, LlmError::Request("504".into()))
            .reply(AgentRole::Tutor, "never reached");
        let err = generate_with_retry(&llm, &request(), 2).await.unwrap_err();
        assert_eq!(err, LlmError::Request("504".into()));
        assert_eq!(llm.calls(AgentRole::Tutor), 2);
    }

    #[tokio::test]
    async fn test_blank_reply_counts_as_failure() {
        let llm = ScriptedLlmClient::new().reply(AgentRole::Tutor, "   ");
        let err = generate_with_retry(&llm, &request(), 1).await.unwrap_err();
        assert_eq!(err, LlmError::EmptyResponse);
    }
}
