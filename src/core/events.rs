//! 会话过程事件：用于宿主展示路径生成、审查重写、安全放行、评估与推进

use serde::Serialize;

use crate::agents::{Assessment, LearnerIntent};

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// 候选路径已生成
    PathsGenerated { count: usize },
    /// 学习者选定路径
    PathSelected { path_id: String, nodes: usize },
    /// 开始起草（attempt 从 1 开始）
    Drafting {
        node_index: usize,
        attempt: u32,
        remediation: bool,
    },
    /// 审查未通过，携带违规原则重写
    ReviewRejected { attempt: u32, violations: Vec<String> },
    /// 审查预算耗尽，放行最后一版草稿
    SafetyBypass { node_index: usize, attempts: u32 },
    /// 评估结论
    Evaluated {
        intent: LearnerIntent,
        assessment: Assessment,
        should_advance: bool,
    },
    /// 前移到下一个节点
    Advanced { node_index: usize },
    /// 停留在当前节点补救
    Remediating { node_index: usize, guidance: String },
    /// 课程完成
    Completed { turns: usize },
}
