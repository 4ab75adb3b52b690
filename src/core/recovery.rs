//! 错误恢复引擎
//!
//! 根据 AgentError 类型与已尝试次数返回 RecoveryAction，供编排器决定是重试、重新起草还是上抛。
//! 生成失败已在 Agent 内部自动重试过一次，到这里一律上抛；结构不合法按角色区别处理。

use crate::core::{AgentError, RecoveryAction};
use crate::llm::AgentRole;

/// 对结构错误的严格化提示
const STRICT_JSON_INSTRUCTION: &str = "Your previous reply did not match the required JSON structure. \
Reply with exactly one JSON object that matches the schema. No prose, no markdown, no code fences.";

/// 语义化错误恢复：将错误映射为可执行动作（严格重试 / 重新起草 / 上抛）
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// attempt 为已失败的次数（从 1 开始）
    pub fn handle(&self, err: &AgentError, attempt: u32) -> RecoveryAction {
        match err {
            AgentError::Generation { .. } => RecoveryAction::Surface,
            AgentError::MalformedOutput { role, detail } => match role {
                // 路径生成与评估各允许一次更严格的重试
                AgentRole::PathGenerator | AgentRole::Evaluator if attempt < 2 => {
                    RecoveryAction::RetryWithPrompt(format!("{STRICT_JSON_INSTRUCTION}\nProblem: {detail}"))
                }
                AgentRole::PathGenerator | AgentRole::Evaluator => RecoveryAction::Surface,
                // Tutor / Reviewer 的结构错误与审查未通过同等对待
                AgentRole::Tutor => RecoveryAction::Redraft(format!("malformed-output: {detail}")),
                AgentRole::Reviewer => RecoveryAction::Redraft(format!("review-unavailable: {detail}")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_generation_error_surfaces() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Generation {
            role: AgentRole::Tutor,
            source: LlmError::Timeout(std::time::Duration::from_secs(60)),
        };
        assert_eq!(engine.handle(&err, 1), RecoveryAction::Surface);
    }

    #[test]
    fn test_path_generator_retries_once_with_stricter_prompt() {
        let engine = RecoveryEngine::new();
        let err = AgentError::malformed(AgentRole::PathGenerator, "missing paths");
        match engine.handle(&err, 1) {
            RecoveryAction::RetryWithPrompt(msg) => {
                assert!(msg.contains("JSON"));
                assert!(msg.contains("missing paths"));
            }
            other => panic!("Expected RetryWithPrompt, got {other:?}"),
        }
        assert_eq!(engine.handle(&err, 2), RecoveryAction::Surface);
    }

    #[test]
    fn test_evaluator_retries_once() {
        let engine = RecoveryEngine::new();
        let err = AgentError::malformed(AgentRole::Evaluator, "no verdict");
        assert!(matches!(engine.handle(&err, 1), RecoveryAction::RetryWithPrompt(_)));
        assert_eq!(engine.handle(&err, 2), RecoveryAction::Surface);
    }

    #[test]
    fn test_malformed_tutor_draft_is_redrafted() {
        let engine = RecoveryEngine::new();
        let err = AgentError::malformed(AgentRole::Tutor, "empty question");
        match engine.handle(&err, 3) {
            RecoveryAction::Redraft(v) => assert!(v.starts_with("malformed-output")),
            other => panic!("Expected Redraft, got {other:?}"),
        }
    }
}
