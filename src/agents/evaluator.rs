//! 评估 Agent：判定学习者回答的意图与掌握程度，给出是否前移的结论
//!
//! 模型结论之上再套一层确定性规则：
//! - 只有「作答 + 正确 + 模型建议前移」才前移；部分正确一律补救
//! - 提问、离题、放弃永不前移
//! - 离题或含义不明时，指导必须要求讲授者先请学习者澄清
//! - 不前移但指导为空时，补一条默认指导

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::agents::parse::parse_output;
use crate::agents::schema::with_output_contract;
use crate::agents::{Agent, AgentRuntime};
use crate::core::{AgentError, PathNode};
use crate::llm::{AgentRole, GenerationRequest};
use crate::memory::Message;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a strict but fair learning evaluator. \
Classify what the learner is doing, judge whether the answer shows mastery of the current node, \
and write short guidance for the tutor's next turn. Advance only on a correct answer.";

const CLARIFY_GUIDANCE: &str = "Ask the learner to clarify what they meant before teaching further.";
const GIVE_UP_GUIDANCE: &str = "Break the concept into a smaller step and offer a concrete hint.";
const QUESTION_GUIDANCE: &str = "Answer the learner's question directly, then re-ask the practice question.";
const RETRY_GUIDANCE: &str = "Point out what is missing in the answer and ask the learner to try again.";

/// 学习者意图
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum LearnerIntent {
    #[serde(alias = "attempt_answer", alias = "answer")]
    AttemptAnswer,
    #[serde(alias = "ask_question", alias = "ask-question")]
    Question,
    #[serde(alias = "off_topic")]
    OffTopic,
    #[serde(alias = "give_up", alias = "stuck")]
    GiveUp,
}

/// 掌握程度
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Assessment {
    Correct,
    Partial,
    Wrong,
    #[serde(rename = "n/a", alias = "na", alias = "none")]
    NotApplicable,
}

fn default_assessment() -> Assessment {
    Assessment::NotApplicable
}

#[derive(Debug, Deserialize, JsonSchema)]
struct VerdictWire {
    intent: LearnerIntent,
    #[serde(default = "default_assessment")]
    assessment: Assessment,
    /// 判定理由（只进日志）
    #[serde(default)]
    reasoning: String,
    /// 给讲授者的下一步指导
    #[serde(default)]
    guidance: String,
    should_advance: bool,
}

/// 评估结论
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvaluatorVerdict {
    pub intent: LearnerIntent,
    pub assessment: Assessment,
    pub should_advance: bool,
    pub guidance: String,
}

/// 评估输入
#[derive(Clone, Debug)]
pub struct EvaluationRequest {
    pub node: PathNode,
    /// 学习者正在回答的那轮讲授输出
    pub tutor_message: String,
    pub response: String,
    /// 已按评估窗口裁剪的历史
    pub history: Vec<Message>,
    pub strict_note: Option<String>,
}

pub struct Evaluator {
    runtime: AgentRuntime,
    temperature: f32,
    system_prompt: String,
}

impl Evaluator {
    /// temperature 应已按评估上限钳制
    pub fn new(runtime: AgentRuntime, temperature: f32) -> Self {
        let system = runtime.system_prompt(AgentRole::Evaluator, DEFAULT_SYSTEM_PROMPT);
        Self {
            system_prompt: with_output_contract::<VerdictWire>(&system),
            runtime,
            temperature,
        }
    }

    fn build_prompt(input: &EvaluationRequest) -> String {
        let mut prompt = format!("NODE TITLE: {}\n", input.node.title);
        if !input.node.concept.is_empty() {
            prompt.push_str(&format!("NODE CONCEPT: {}\n", input.node.concept));
        }
        if !input.node.practice.is_empty() {
            prompt.push_str(&format!("NODE PRACTICE: {}\n", input.node.practice));
        }
        prompt.push_str(&format!("\nTUTOR MESSAGE:\n{}\n", input.tutor_message.trim()));
        prompt.push_str(
            "\nintent is one of attempt-answer, question, off-topic, give-up. \
assessment is one of correct, partial, wrong, n/a (n/a unless intent is attempt-answer).\n",
        );
        if let Some(note) = &input.strict_note {
            prompt.push_str(&format!("{note}\n"));
        }
        prompt.push_str(&format!(
            "\nLEARNER RESPONSE:\n{}\n\nReturn ONLY the JSON object.",
            input.response.trim()
        ));
        prompt
    }

    /// 确定性规则层
    fn apply_policy(wire: VerdictWire) -> EvaluatorVerdict {
        let should_advance = wire.should_advance
            && wire.intent == LearnerIntent::AttemptAnswer
            && wire.assessment == Assessment::Correct;
        if wire.should_advance && !should_advance {
            tracing::debug!(
                intent = ?wire.intent,
                assessment = ?wire.assessment,
                "Advance overridden by evaluation policy"
            );
        }

        let mut guidance = wire.guidance.trim().to_string();
        let ambiguous = wire.intent == LearnerIntent::OffTopic
            || (wire.intent == LearnerIntent::AttemptAnswer
                && wire.assessment == Assessment::NotApplicable);
        if !should_advance {
            if ambiguous && !guidance.to_lowercase().contains("clarif") {
                guidance = if guidance.is_empty() {
                    CLARIFY_GUIDANCE.to_string()
                } else {
                    format!("{CLARIFY_GUIDANCE} {guidance}")
                };
            } else if guidance.is_empty() {
                guidance = match wire.intent {
                    LearnerIntent::GiveUp => GIVE_UP_GUIDANCE,
                    LearnerIntent::Question => QUESTION_GUIDANCE,
                    _ => RETRY_GUIDANCE,
                }
                .to_string();
            }
        }

        EvaluatorVerdict {
            intent: wire.intent,
            assessment: wire.assessment,
            should_advance,
            guidance,
        }
    }
}

#[async_trait]
impl Agent for Evaluator {
    type Input = EvaluationRequest;
    type Output = EvaluatorVerdict;

    fn role(&self) -> AgentRole {
        AgentRole::Evaluator
    }

    async fn run(&self, input: EvaluationRequest) -> Result<EvaluatorVerdict, AgentError> {
        let request = GenerationRequest::new(
            AgentRole::Evaluator,
            self.system_prompt.clone(),
            Self::build_prompt(&input),
        )
        .with_temperature(self.temperature)
        .with_history(input.history);
        let text = self.runtime.generate(request).await?;
        let wire: VerdictWire = parse_output(AgentRole::Evaluator, &text)?;
        tracing::debug!(reasoning = %wire.reasoning, "Evaluator reasoning");
        Ok(Self::apply_policy(wire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::llm::{MockLlmClient, ScriptedLlmClient};

    fn wire(intent: LearnerIntent, assessment: Assessment, advance: bool, guidance: &str) -> VerdictWire {
        VerdictWire {
            intent,
            assessment,
            reasoning: String::new(),
            guidance: guidance.to_string(),
            should_advance: advance,
        }
    }

    fn request(response: &str) -> EvaluationRequest {
        EvaluationRequest {
            node: PathNode {
                id: "n1".into(),
                title: "Borrowing".into(),
                concept: String::new(),
                practice: String::new(),
            },
            tutor_message: "What does &x do?".into(),
            response: response.into(),
            history: Vec::new(),
            strict_note: None,
        }
    }

    #[test]
    fn test_partial_never_advances() {
        let v = Evaluator::apply_policy(wire(
            LearnerIntent::AttemptAnswer,
            Assessment::Partial,
            true,
            "",
        ));
        assert!(!v.should_advance);
        assert_eq!(v.guidance, RETRY_GUIDANCE);
    }

    #[test]
    fn test_question_and_give_up_never_advance() {
        for intent in [LearnerIntent::Question, LearnerIntent::GiveUp, LearnerIntent::OffTopic] {
            let v = Evaluator::apply_policy(wire(intent, Assessment::Correct, true, "x"));
            assert!(!v.should_advance, "{intent:?} must not advance");
        }
    }

    #[test]
    fn test_off_topic_guidance_requests_clarification() {
        let v = Evaluator::apply_policy(wire(
            LearnerIntent::OffTopic,
            Assessment::NotApplicable,
            false,
            "Steer back to borrowing.",
        ));
        assert!(v.guidance.starts_with(CLARIFY_GUIDANCE));
        assert!(v.guidance.ends_with("Steer back to borrowing."));
    }

    #[test]
    fn test_correct_answer_advances() {
        let v = Evaluator::apply_policy(wire(
            LearnerIntent::AttemptAnswer,
            Assessment::Correct,
            true,
            "",
        ));
        assert!(v.should_advance);
        assert!(v.guidance.is_empty());
    }

    #[test]
    fn test_intent_aliases() {
        let w: VerdictWire = serde_json::from_str(
            r#"{"intent": "ask_question", "assessment": "n/a", "should_advance": false}"#,
        )
        .unwrap();
        assert_eq!(w.intent, LearnerIntent::Question);
        let w: VerdictWire =
            serde_json::from_str(r#"{"intent": "stuck", "should_advance": false}"#).unwrap();
        assert_eq!(w.intent, LearnerIntent::GiveUp);
        assert_eq!(w.assessment, Assessment::NotApplicable);
    }

    #[test]
    fn test_prompt_ends_with_learner_response() {
        let prompt = Evaluator::build_prompt(&request("  it borrows x  "));
        assert!(prompt.ends_with("LEARNER RESPONSE:\nit borrows x\n\nReturn ONLY the JSON object."));
    }

    #[tokio::test]
    async fn test_same_input_same_verdict() {
        let evaluator = Evaluator::new(AgentRuntime::new(Arc::new(MockLlmClient)), 0.1);
        let a = evaluator.run(request("why would I borrow?")).await.unwrap();
        let b = evaluator.run(request("why would I borrow?")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.intent, LearnerIntent::Question);
        assert!(!a.should_advance);
    }

    #[tokio::test]
    async fn test_unknown_intent_is_malformed() {
        let llm = Arc::new(ScriptedLlmClient::new().reply(
            AgentRole::Evaluator,
            r#"{"intent": "dancing", "should_advance": true}"#,
        ));
        let evaluator = Evaluator::new(AgentRuntime::new(llm), 0.1);
        assert!(matches!(
            evaluator.run(request("x")).await,
            Err(AgentError::MalformedOutput { role: AgentRole::Evaluator, .. })
        ));
    }
}
