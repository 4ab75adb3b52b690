//! 讲授 Agent：针对当前节点起草一轮讲解与一个检验问题
//!
//! 首次进入节点时不带评估指导；补救轮次原样注入评估指导；
//! 审查未通过时把违规原则作为修改意见一并提供。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::agents::parse::parse_output;
use crate::agents::schema::with_output_contract;
use crate::agents::{Agent, AgentRuntime};
use crate::core::{AgentError, PathNode};
use crate::lesson::LessonPlan;
use crate::llm::{AgentRole, GenerationRequest};
use crate::memory::Message;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a one-to-one tutor. Teach exactly one concept per turn, \
in a short, warm and concrete way, then ask the learner one question that makes them retrieve or apply \
the idea. Never give away the answer to your own question.";

/// 编辑器类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EditorKind {
    Code,
    Text,
}

/// 给学习者编辑器的预填内容
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EditorContent {
    #[serde(rename = "type")]
    pub kind: EditorKind,
    pub content: String,
    /// 输出时始终带上该键（纯文本为 null）
    #[serde(default)]
    pub language: Option<String>,
}

/// 起草输入
#[derive(Clone, Debug)]
pub struct TutorRequest {
    pub lesson: Arc<LessonPlan>,
    pub node: PathNode,
    /// 已按讲授窗口裁剪的历史
    pub history: Vec<Message>,
    /// 补救轮次的评估指导（首次访问节点为 None）
    pub guidance: Option<String>,
    /// 审查违规说明（重写时非空）
    pub revision_notes: Vec<String>,
}

/// Tutor 输出
#[derive(Clone, Debug, PartialEq, Deserialize, JsonSchema)]
pub struct TutorDraft {
    /// 本轮讲解
    pub teaching: String,
    /// 检验问题
    pub question: String,
    #[serde(default)]
    pub editor: Option<EditorContent>,
}

impl TutorDraft {
    /// 学习者看到的正文
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.teaching.trim(), self.question.trim())
    }
}

pub struct Tutor {
    runtime: AgentRuntime,
    temperature: f32,
    system_prompt: String,
}

impl Tutor {
    pub fn new(runtime: AgentRuntime, temperature: f32) -> Self {
        let system = runtime.system_prompt(AgentRole::Tutor, DEFAULT_SYSTEM_PROMPT);
        Self {
            system_prompt: with_output_contract::<TutorDraft>(&system),
            runtime,
            temperature,
        }
    }

    fn build_prompt(input: &TutorRequest) -> String {
        let mut prompt = format!("LESSON: {}\n", input.lesson.title);
        if !input.lesson.experience_level.is_empty() {
            prompt.push_str(&format!("LEARNER LEVEL: {}\n", input.lesson.experience_level));
        }
        prompt.push_str(&format!("NODE TITLE: {}\n", input.node.title));
        if !input.node.concept.is_empty() {
            prompt.push_str(&format!("NODE CONCEPT: {}\n", input.node.concept));
        }
        if !input.node.practice.is_empty() {
            prompt.push_str(&format!("NODE PRACTICE: {}\n", input.node.practice));
        }
        if let Some(guidance) = &input.guidance {
            prompt.push_str(&format!(
                "\nEVALUATOR GUIDANCE:\n{guidance}\nThe learner has not mastered this node yet. \
Follow the guidance and teach the same concept again from a different angle.\n"
            ));
        }
        if !input.revision_notes.is_empty() {
            prompt.push_str("\nYOUR PREVIOUS DRAFT WAS REJECTED. Fix these issues:\n");
            for note in &input.revision_notes {
                prompt.push_str(&format!("- {note}\n"));
            }
        }
        prompt.push_str(
            "\nIf the practice needs code or a longer written answer, include an `editor` scaffold.",
        );
        prompt
    }

    fn validate(mut draft: TutorDraft) -> Result<TutorDraft, AgentError> {
        if draft.teaching.trim().is_empty() || draft.question.trim().is_empty() {
            return Err(AgentError::malformed(
                AgentRole::Tutor,
                "draft needs both teaching and question",
            ));
        }
        if draft.editor.as_ref().is_some_and(|e| e.content.trim().is_empty()) {
            draft.editor = None;
        }
        Ok(draft)
    }
}

#[async_trait]
impl Agent for Tutor {
    type Input = TutorRequest;
    type Output = TutorDraft;

    fn role(&self) -> AgentRole {
        AgentRole::Tutor
    }

    async fn run(&self, input: TutorRequest) -> Result<TutorDraft, AgentError> {
        let request = GenerationRequest::new(
            AgentRole::Tutor,
            self.system_prompt.clone(),
            Self::build_prompt(&input),
        )
        .with_temperature(self.temperature)
        .with_history(input.history);
        let text = self.runtime.generate(request).await?;
        Self::validate(parse_output(AgentRole::Tutor, &text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::llm::ScriptedLlmClient;

    fn request(guidance: Option<&str>) -> TutorRequest {
        TutorRequest {
            lesson: Arc::new(LessonPlan::new("Closures", vec!["capture".into()])),
            node: PathNode {
                id: "n1".into(),
                title: "Capturing variables".into(),
                concept: "closures borrow their environment".into(),
                practice: "write a counter".into(),
            },
            history: vec![Message::assistant("earlier")],
            guidance: guidance.map(str::to_string),
            revision_notes: Vec::new(),
        }
    }

    #[test]
    fn test_first_visit_has_no_guidance() {
        let prompt = Tutor::build_prompt(&request(None));
        assert!(prompt.contains("NODE TITLE: Capturing variables\n"));
        assert!(!prompt.contains("EVALUATOR GUIDANCE"));
    }

    #[test]
    fn test_remediation_injects_guidance_verbatim() {
        let mut req = request(Some("Ask the learner to clarify what they meant."));
        req.revision_notes = vec!["cognitive-load: one concept per turn".into()];
        let prompt = Tutor::build_prompt(&req);
        assert!(prompt.contains("EVALUATOR GUIDANCE:\nAsk the learner to clarify what they meant.\n"));
        assert!(prompt.contains("- cognitive-load: one concept per turn\n"));
    }

    #[tokio::test]
    async fn test_draft_with_editor_scaffold() {
        let reply = r#"{"teaching": "A closure captures.", "question": "What does it capture?",
            "editor": {"type": "code", "content": "let add = |x| x + 1;", "language": "rust"}}"#;
        let llm = Arc::new(ScriptedLlmClient::new().reply(AgentRole::Tutor, reply));
        let tutor = Tutor::new(AgentRuntime::new(llm.clone()), 0.5);
        let draft = tutor.run(request(None)).await.unwrap();
        assert_eq!(draft.render(), "A closure captures.\n\nWhat does it capture?");
        let editor = draft.editor.unwrap();
        assert_eq!(editor.kind, EditorKind::Code);
        assert_eq!(editor.language.as_deref(), Some("rust"));
        assert_eq!(llm.requests(AgentRole::Tutor)[0].history.len(), 1);
    }

    #[test]
    fn test_editor_content_always_carries_language_key() {
        let editor = EditorContent {
            kind: EditorKind::Text,
            content: "fill".into(),
            language: None,
        };
        assert_eq!(
            serde_json::to_value(&editor).unwrap(),
            serde_json::json!({"type": "text", "content": "fill", "language": null})
        );
    }

    #[tokio::test]
    async fn test_blank_question_is_malformed() {
        let llm = Arc::new(
            ScriptedLlmClient::new().reply(AgentRole::Tutor, r#"{"teaching": "x", "question": " "}"#),
        );
        let tutor = Tutor::new(AgentRuntime::new(llm), 0.5);
        assert!(matches!(
            tutor.run(request(None)).await,
            Err(AgentError::MalformedOutput { .. })
        ));
    }
}
