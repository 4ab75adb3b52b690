//! 短期记忆：按角色裁剪的对话窗口
//!
//! 会话中的 Turn 只追加不改写；每次调用 Agent 时只取最近 N 轮投影为 Message 列表，
//! 而不是重放完整记录，以约束成本与延迟。

use serde::{Deserialize, Serialize};

use crate::core::Turn;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 历史窗口：最近 max_turns 轮（每轮含 tutor 输出 + 学习者回答，故最多约 max_turns*2 条消息）
#[derive(Clone, Copy, Debug)]
pub struct HistoryWindow {
    max_turns: usize,
}

impl HistoryWindow {
    pub fn new(max_turns: usize) -> Self {
        Self { max_turns }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// 取最近 max_turns 轮并按时间顺序展开为消息；尚未回答的轮次只产生 assistant 消息
    pub fn project(&self, turns: &[Turn]) -> Vec<Message> {
        let start = turns.len().saturating_sub(self.max_turns);
        let mut messages = Vec::with_capacity((turns.len() - start) * 2);
        for turn in &turns[start..] {
            messages.push(Message::assistant(turn.tutor_output.clone()));
            if let Some(response) = &turn.learner_response {
                messages.push(Message::user(response.clone()));
            }
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(i: usize, answered: bool) -> Turn {
        let mut t = Turn::new(0, format!("tutor {i}"), false);
        if answered {
            t.learner_response = Some(format!("learner {i}"));
        }
        t
    }

    #[test]
    fn test_window_keeps_only_recent_turns() {
        let turns: Vec<Turn> = (0..10).map(|i| turn(i, true)).collect();
        let messages = HistoryWindow::new(2).project(&turns);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], Message::assistant("tutor 8"));
        assert_eq!(messages[3], Message::user("learner 9"));
    }

    #[test]
    fn test_unanswered_turn_yields_single_message() {
        let turns = vec![turn(0, true), turn(1, false)];
        let messages = HistoryWindow::new(6).project(&turns);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages.last(), Some(&Message::assistant("tutor 1")));
    }

    #[test]
    fn test_zero_window_is_empty() {
        let turns = vec![turn(0, true)];
        assert!(HistoryWindow::new(0).project(&turns).is_empty());
    }
}
