//! 每轮对外输出：由 SessionState 投影得到，宿主（CLI / 其他前端）只渲染这一结构

use serde::Serialize;

use crate::agents::EditorContent;
use crate::core::{Phase, SessionState};

/// 课程完成时的固定文案
const COMPLETION_MESSAGE: &str =
    "**Lesson complete!** You worked through every step of this path. Nice work.";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LessonStatus {
    pub current_phase: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LessonInfo {
    pub module_number: u32,
    pub challenge_number: u32,
    pub topic: String,
}

/// 单轮输出
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnOutput {
    pub conversation_content: String,
    pub lesson_status: LessonStatus,
    pub lesson_info: LessonInfo,
    pub editor_content: Option<EditorContent>,
    /// 审查预算耗尽后强制放行（仅供宿主提示，不序列化）
    #[serde(skip)]
    pub degraded: bool,
}

impl TurnOutput {
    /// 将当前状态与本轮内容合并为输出
    pub fn project(
        state: &SessionState,
        content: impl Into<String>,
        editor_content: Option<EditorContent>,
        degraded: bool,
    ) -> Self {
        let lesson = state.lesson();
        Self {
            conversation_content: content.into(),
            lesson_status: LessonStatus {
                current_phase: state.phase().name().to_string(),
            },
            lesson_info: LessonInfo {
                module_number: lesson.module_number,
                challenge_number: lesson.lesson_number,
                topic: lesson.title.clone(),
            },
            editor_content,
            degraded,
        }
    }

    /// PATH_SELECTION 阶段：列出候选路径
    pub fn candidates(state: &SessionState) -> Self {
        let mut content = format!(
            "Choose how you'd like to learn **{}**:\n",
            state.lesson().title
        );
        for (i, path) in state.candidates().iter().enumerate() {
            content.push_str(&format!("\n{}. **{}**", i + 1, path.name));
            if !path.description.is_empty() {
                content.push_str(&format!(": {}", path.description));
            }
            let steps: Vec<&str> = path.nodes.iter().map(|n| n.title.as_str()).collect();
            content.push_str(&format!("\n   {}", steps.join(" -> ")));
        }
        Self::project(state, content, None, false)
    }

    pub fn completion(state: &SessionState) -> Self {
        Self::project(state, COMPLETION_MESSAGE, None, false)
    }

    pub fn is_complete(&self) -> bool {
        self.lesson_status.current_phase == Phase::Complete.name()
    }
}
