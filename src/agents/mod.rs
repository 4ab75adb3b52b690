//! Agent 层：路径生成、讲授、评估、教学质量审查
//!
//! 四个角色都实现 Agent（角色专属输入 -> 角色专属输出），共享 AgentRuntime：
//! 带一次自动重试的生成调用、结构化审计日志、system prompt 覆盖与 JSON Schema 提示。

pub mod evaluator;
pub mod parse;
pub mod path_generator;
pub mod reviewer;
pub mod schema;
pub mod tutor;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::{generate_with_retry, AgentRole, GenerationRequest, LlmClient};

pub use evaluator::{Assessment, EvaluationRequest, Evaluator, EvaluatorVerdict, LearnerIntent};
pub use path_generator::{PathGenerator, PathRequest};
pub use reviewer::{Principle, ReviewRequest, ReviewResult, Reviewer};
pub use tutor::{EditorContent, EditorKind, Tutor, TutorDraft, TutorRequest};

/// prompt 预览最大字符数（审计日志）
const PROMPT_PREVIEW_CHARS: usize = 120;

/// Agent 能力接口：每个实现有自己的输入 / 输出形状
#[async_trait]
pub trait Agent: Send + Sync {
    type Input: Send + 'static;
    type Output: Send;

    fn role(&self) -> AgentRole;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, AgentError>;
}

/// 各 Agent 共享的生成运行时
#[derive(Clone)]
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    generation_attempts: u32,
    prompts_dir: Option<PathBuf>,
}

impl AgentRuntime {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            generation_attempts: 2,
            prompts_dir: None,
        }
    }

    pub fn with_generation_attempts(mut self, attempts: u32) -> Self {
        self.generation_attempts = attempts.max(1);
        self
    }

    pub fn with_prompts_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.prompts_dir = dir;
        self
    }

    /// 角色 system prompt：`<prompts_dir>/<role>.txt` 存在则覆盖默认值
    pub fn system_prompt(&self, role: AgentRole, default: &str) -> String {
        load_system_prompt(self.prompts_dir.as_deref(), role).unwrap_or_else(|| default.to_string())
    }

    /// 调用生成客户端（LlmError 自动重试），每次输出一条 JSON 审计日志
    pub async fn generate(&self, request: GenerationRequest) -> Result<String, AgentError> {
        let start = Instant::now();
        let result = generate_with_retry(self.llm.as_ref(), &request, self.generation_attempts).await;

        let audit = serde_json::json!({
            "event": "agent_audit",
            "role": request.role.as_str(),
            "ok": result.is_ok(),
            "outcome": match &result {
                Ok(_) => "ok".to_string(),
                Err(e) => e.to_string(),
            },
            "max_attempts": self.generation_attempts,
            "temperature": request.temperature,
            "history_messages": request.history.len(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "prompt_preview": preview(&request.prompt, PROMPT_PREVIEW_CHARS),
        });
        tracing::info!(audit = %audit.to_string(), "agent");

        result.map_err(|source| AgentError::Generation {
            role: request.role,
            source,
        })
    }
}

fn load_system_prompt(dir: Option<&Path>, role: AgentRole) -> Option<String> {
    let path = dir?.join(format!("{}.txt", role.as_str()));
    let text = std::fs::read_to_string(&path).ok()?;
    if text.trim().is_empty() {
        return None;
    }
    tracing::debug!("Using system prompt override {}", path.display());
    Some(text)
}

pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};

    #[test]
    fn test_prompt_override_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tutor.txt"), "You are a patient tutor.").unwrap();
        let runtime = AgentRuntime::new(Arc::new(ScriptedLlmClient::new()))
            .with_prompts_dir(Some(dir.path().to_path_buf()));
        assert_eq!(
            runtime.system_prompt(AgentRole::Tutor, "default"),
            "You are a patient tutor."
        );
        assert_eq!(runtime.system_prompt(AgentRole::Reviewer, "default"), "default");
    }

    #[tokio::test]
    async fn test_generation_error_carries_role() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .fail(AgentRole::Evaluator, LlmError::EmptyResponse)
                .fail(AgentRole::Evaluator, LlmError::EmptyResponse),
        );
        let runtime = AgentRuntime::new(llm.clone());
        let err = runtime
            .generate(GenerationRequest::new(AgentRole::Evaluator, "s", "p"))
            .await
            .unwrap_err();
        assert_eq!(err.role(), AgentRole::Evaluator);
        assert!(matches!(err, AgentError::Generation { .. }));
        assert_eq!(llm.calls(AgentRole::Evaluator), 2);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("你好世界", 2), "你好...");
        assert_eq!(preview("short", 10), "short");
    }
}
