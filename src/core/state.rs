//! 会话状态：阶段、学习路径、轮次记录
//!
//! SessionState 由编排器独占修改；节点游标只能经 `advance` 在评估结论 should_advance 为真时前移，
//! 轮次记录只追加不改写。

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::agents::{EditorContent, EvaluatorVerdict};
use crate::lesson::LessonPlan;

/// 讲授阶段内的子步骤
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeachingStep {
    Drafting,
    Reviewing,
    AwaitingResponse,
    Evaluating,
}

/// 会话阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Init,
    PathSelection,
    Teaching(TeachingStep),
    Complete,
}

impl Phase {
    /// 对外输出使用的阶段名（不含子步骤）
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::PathSelection => "PATH_SELECTION",
            Phase::Teaching(_) => "TEACHING",
            Phase::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Teaching(step) => write!(f, "TEACHING/{step:?}"),
            other => f.write_str(other.name()),
        }
    }
}

/// 路径中的一个教学节点
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PathNode {
    pub id: String,
    pub title: String,
    pub concept: String,
    pub practice: String,
}

/// 一条候选 / 已选学习路径
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LearningPath {
    pub id: String,
    pub name: String,
    pub description: String,
    pub nodes: Vec<PathNode>,
}

/// 一轮交互：一次放行的讲授输出，及其后的学习者回答与评估结论
#[derive(Clone, Debug, Serialize)]
pub struct Turn {
    pub(crate) node_index: usize,
    pub(crate) tutor_output: String,
    pub(crate) editor: Option<EditorContent>,
    pub(crate) learner_response: Option<String>,
    pub(crate) verdict: Option<EvaluatorVerdict>,
    /// 审查预算耗尽后强制放行
    pub(crate) degraded: bool,
    pub(crate) at: DateTime<Utc>,
}

impl Turn {
    pub fn new(node_index: usize, tutor_output: impl Into<String>, degraded: bool) -> Self {
        Self {
            node_index,
            tutor_output: tutor_output.into(),
            editor: None,
            learner_response: None,
            verdict: None,
            degraded,
            at: Utc::now(),
        }
    }

    pub fn with_editor(mut self, editor: Option<EditorContent>) -> Self {
        self.editor = editor;
        self
    }

    pub fn node_index(&self) -> usize {
        self.node_index
    }

    pub fn tutor_output(&self) -> &str {
        &self.tutor_output
    }

    pub fn learner_response(&self) -> Option<&str> {
        self.learner_response.as_deref()
    }

    pub fn verdict(&self) -> Option<&EvaluatorVerdict> {
        self.verdict.as_ref()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

/// `advance` 的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advance {
    /// 停留在当前节点（补救）
    Stayed,
    /// 前移到下一个节点
    Next,
    /// 越过最后一个节点，课程完成
    Completed,
}

/// 一次学习会话的全部状态
#[derive(Clone, Debug, Serialize)]
pub struct SessionState {
    id: Uuid,
    lesson: Arc<LessonPlan>,
    /// 仅在 PATH_SELECTION 阶段非空
    candidates: Vec<LearningPath>,
    path: Option<LearningPath>,
    node_index: usize,
    phase: Phase,
    turns: Vec<Turn>,
    review_attempts: u32,
    pending_guidance: Option<String>,
    started_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(lesson: impl Into<Arc<LessonPlan>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lesson: lesson.into(),
            candidates: Vec::new(),
            path: None,
            node_index: 0,
            phase: Phase::Init,
            turns: Vec::new(),
            review_attempts: 0,
            pending_guidance: None,
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn lesson(&self) -> &LessonPlan {
        &self.lesson
    }

    /// 共享的课程计划（传给 Agent 时只增加引用计数）
    pub fn shared_lesson(&self) -> Arc<LessonPlan> {
        Arc::clone(&self.lesson)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn candidates(&self) -> &[LearningPath] {
        &self.candidates
    }

    pub fn path(&self) -> Option<&LearningPath> {
        self.path.as_ref()
    }

    pub fn node_index(&self) -> usize {
        self.node_index
    }

    /// 当前节点；未选路径或已完成时为 None
    pub fn current_node(&self) -> Option<&PathNode> {
        self.path.as_ref()?.nodes.get(self.node_index)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn review_attempts(&self) -> u32 {
        self.review_attempts
    }

    pub fn pending_guidance(&self) -> Option<&str> {
        self.pending_guidance.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// 最近一次放行的讲授输出（评估者的上下文）
    pub fn last_tutor_output(&self) -> Option<&str> {
        self.turns.last().map(|t| t.tutor_output.as_str())
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn offer_candidates(&mut self, candidates: Vec<LearningPath>) {
        self.candidates = candidates;
        self.phase = Phase::PathSelection;
    }

    /// 选定候选路径；游标保持在 0，候选列表清空
    pub(crate) fn choose_path(&mut self, index: usize) -> Option<&LearningPath> {
        if index >= self.candidates.len() {
            return None;
        }
        let chosen = self.candidates.swap_remove(index);
        self.candidates.clear();
        self.path = Some(chosen);
        self.phase = Phase::Teaching(TeachingStep::Drafting);
        self.path.as_ref()
    }

    /// 游标唯一的修改入口：仅 should_advance 为真时前移
    pub(crate) fn advance(&mut self, verdict: &EvaluatorVerdict) -> Advance {
        if !verdict.should_advance {
            return Advance::Stayed;
        }
        let len = self.path.as_ref().map_or(0, |p| p.nodes.len());
        self.node_index += 1;
        self.review_attempts = 0;
        self.pending_guidance = None;
        if self.node_index >= len {
            self.phase = Phase::Complete;
            Advance::Completed
        } else {
            self.phase = Phase::Teaching(TeachingStep::Drafting);
            Advance::Next
        }
    }

    /// 停留在当前节点，下一次起草注入评估指导
    pub(crate) fn remediate(&mut self, guidance: impl Into<String>) {
        self.pending_guidance = Some(guidance.into());
        self.phase = Phase::Teaching(TeachingStep::Drafting);
    }

    pub(crate) fn reset_review_attempts(&mut self) {
        self.review_attempts = 0;
    }

    /// 记录一次审查未通过，返回累计次数
    pub(crate) fn record_review_failure(&mut self) -> u32 {
        self.review_attempts += 1;
        self.review_attempts
    }

    /// 追加放行的讲授输出并等待学习者回答
    pub(crate) fn push_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.phase = Phase::Teaching(TeachingStep::AwaitingResponse);
    }

    /// 评估成功后，一次性写入最后一轮的回答与结论
    pub(crate) fn record_exchange(&mut self, response: &str, verdict: EvaluatorVerdict) -> bool {
        match self.turns.last_mut() {
            Some(turn) if turn.learner_response.is_none() => {
                turn.learner_response = Some(response.to_string());
                turn.verdict = Some(verdict);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Assessment, LearnerIntent};

    fn node(i: usize) -> PathNode {
        PathNode {
            id: format!("n{i}"),
            title: format!("Node {i}"),
            concept: String::new(),
            practice: String::new(),
        }
    }

    fn two_node_state() -> SessionState {
        let mut state = SessionState::new(LessonPlan::new("Closures", vec!["capture".into()]));
        state.offer_candidates(vec![
            LearningPath {
                id: "a".into(),
                name: "A".into(),
                description: String::new(),
                nodes: vec![node(0), node(1)],
            },
            LearningPath {
                id: "b".into(),
                name: "B".into(),
                description: String::new(),
                nodes: vec![node(0)],
            },
        ]);
        state
    }

    fn verdict(should_advance: bool) -> EvaluatorVerdict {
        EvaluatorVerdict {
            intent: LearnerIntent::AttemptAnswer,
            assessment: if should_advance {
                Assessment::Correct
            } else {
                Assessment::Partial
            },
            should_advance,
            guidance: String::new(),
        }
    }

    #[test]
    fn test_choose_path_clears_candidates() {
        let mut state = two_node_state();
        assert_eq!(state.phase(), Phase::PathSelection);
        assert!(state.choose_path(5).is_none());
        assert_eq!(state.choose_path(0).map(|p| p.id.clone()), Some("a".to_string()));
        assert!(state.candidates().is_empty());
        assert_eq!(state.node_index(), 0);
        assert_eq!(state.phase(), Phase::Teaching(TeachingStep::Drafting));
    }

    #[test]
    fn test_cursor_moves_only_on_advance() {
        let mut state = two_node_state();
        state.choose_path(0);
        state.remediate("try again");
        assert_eq!(state.advance(&verdict(false)), Advance::Stayed);
        assert_eq!(state.node_index(), 0);
        assert_eq!(state.pending_guidance(), Some("try again"));

        state.record_review_failure();
        assert_eq!(state.advance(&verdict(true)), Advance::Next);
        assert_eq!(state.node_index(), 1);
        assert_eq!(state.review_attempts(), 0);
        assert!(state.pending_guidance().is_none());

        assert_eq!(state.advance(&verdict(true)), Advance::Completed);
        assert!(state.is_complete());
        assert!(state.current_node().is_none());
    }

    #[test]
    fn test_exchange_recorded_once() {
        let mut state = two_node_state();
        state.choose_path(0);
        state.push_turn(Turn::new(0, "What is a closure?", false));
        assert_eq!(state.phase(), Phase::Teaching(TeachingStep::AwaitingResponse));
        assert!(state.record_exchange("a function plus its environment", verdict(true)));
        assert!(!state.record_exchange("again", verdict(false)));
        let turn = &state.turns()[0];
        assert_eq!(turn.learner_response(), Some("a function plus its environment"));
        assert!(turn.verdict().is_some_and(|v| v.should_advance));
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::Teaching(TeachingStep::Evaluating).name(), "TEACHING");
        assert_eq!(Phase::PathSelection.to_string(), "PATH_SELECTION");
        assert_eq!(
            Phase::Teaching(TeachingStep::AwaitingResponse).to_string(),
            "TEACHING/AwaitingResponse"
        );
    }
}
