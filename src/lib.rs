//! Mastery - 多智能体自适应辅导引擎
//!
//! 模块划分：
//! - **agents**: 路径生成、讲授、评估、审查四个 Agent 与共享运行时
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态机、审查门控、错误与恢复、输出投影、会话监管
//! - **lesson**: 课程计划加载与选择
//! - **llm**: 生成客户端抽象与实现（OpenAI 兼容 / Groq / Mock）
//! - **memory**: 按角色裁剪的对话窗口

pub mod agents;
pub mod config;
pub mod core;
pub mod lesson;
pub mod llm;
pub mod memory;

pub use crate::core::{Orchestrator, SessionError, SessionHandle, SessionState, TurnOutput};
