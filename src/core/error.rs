//! 错误类型与恢复动作
//!
//! AgentError 是单次 Agent 调用的失败（生成失败 / 输出结构不合法），由 RecoveryEngine 决定重试、重写或上抛；
//! SessionError 是暴露给调用方的错误分类，区分「稍后重试」与「修正输入」。

use thiserror::Error;

use crate::llm::{AgentRole, LlmError};

/// 单次 Agent 调用的失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("{role} generation failed: {source}")]
    Generation {
        role: AgentRole,
        #[source]
        source: LlmError,
    },

    #[error("{role} returned malformed output: {detail}")]
    MalformedOutput { role: AgentRole, detail: String },
}

impl AgentError {
    pub fn malformed(role: AgentRole, detail: impl Into<String>) -> Self {
        AgentError::MalformedOutput {
            role,
            detail: detail.into(),
        }
    }

    pub fn role(&self) -> AgentRole {
        match self {
            AgentError::Generation { role, .. } | AgentError::MalformedOutput { role, .. } => *role,
        }
    }
}

/// 会话层错误（调用方可见）
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{role} generation failed: {source}")]
    Generation { role: AgentRole, source: LlmError },

    #[error("{role} returned malformed output: {detail}")]
    MalformedAgentOutput { role: AgentRole, detail: String },

    /// 路径生成在更严格指令重试后仍失败，会话无法开始
    #[error("session could not start: {0}")]
    SessionStart(#[source] AgentError),

    #[error("invalid lesson selection: {0}")]
    InvalidLessonSelection(String),

    #[error("invalid path selection: index {requested} ({available} candidates available)")]
    InvalidPathSelection { requested: usize, available: usize },

    #[error("operation not allowed in phase {actual}, expected {expected}")]
    UnexpectedPhase { expected: String, actual: String },

    /// 回答或路径选择已生效，但随后的起草失败；状态停在 TEACHING/DRAFTING，
    /// 调用方应使用 `resume` 而不是重新提交
    #[error("next draft failed, resume the session: {0}")]
    DraftPending(#[source] Box<SessionError>),

    /// 同一会话上已有一个状态机步骤在执行
    #[error("session is busy processing another response")]
    SessionBusy,

    #[error("session is closed")]
    SessionClosed,
}

impl SessionError {
    /// true 表示「稍后重试」；false 表示需要修正输入或会话已结束。
    /// 对 `DraftPending`，重试的方式是 `resume`，见 `needs_resume`
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Generation { .. }
                | SessionError::MalformedAgentOutput { .. }
                | SessionError::SessionStart(_)
                | SessionError::DraftPending(_)
                | SessionError::SessionBusy
        )
    }

    /// 输入已被接受，只需重新起草
    pub fn needs_resume(&self) -> bool {
        matches!(self, SessionError::DraftPending(_))
    }
}

impl From<AgentError> for SessionError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Generation { role, source } => SessionError::Generation { role, source },
            AgentError::MalformedOutput { role, detail } => {
                SessionError::MalformedAgentOutput { role, detail }
            }
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 以更严格的指令再调用一次
    RetryWithPrompt(String),
    /// 计入审查预算，携带违规说明重新起草
    Redraft(String),
    /// 上抛给调用方
    Surface,
}
