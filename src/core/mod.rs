//! 核心编排层：错误与恢复、会话状态、输出投影、过程事件、状态机与会话监管

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod output;
pub mod recovery;
pub mod session;
pub mod state;

pub use error::{AgentError, RecoveryAction, SessionError};
pub use events::SessionEvent;
pub use orchestrator::Orchestrator;
pub use output::{LessonInfo, LessonStatus, TurnOutput};
pub use recovery::RecoveryEngine;
pub use session::SessionHandle;
pub use state::{Advance, LearningPath, PathNode, Phase, SessionState, TeachingStep, Turn};
