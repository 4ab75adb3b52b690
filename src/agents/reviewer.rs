//! 审查 Agent：按七条教学原则检查 Tutor 草稿，未通过时列出违规原则
//!
//! 审查不通过由编排器计入重试预算并携带违规说明重写；
//! 通过且给出替换文本时，放行替换文本。

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::agents::parse::parse_output;
use crate::agents::schema::with_output_contract;
use crate::agents::{Agent, AgentRuntime, TutorDraft};
use crate::core::{AgentError, PathNode};
use crate::llm::{AgentRole, GenerationRequest};

/// 无违规条目但未通过时的占位
pub const UNSPECIFIED_VIOLATION: &str = "unspecified";

/// 教学原则
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Principle {
    ActiveLearning,
    CognitiveLoad,
    Scaffolding,
    Misconceptions,
    Relevance,
    EmotionalTone,
    Transfer,
}

impl Principle {
    pub const ALL: [Principle; 7] = [
        Principle::ActiveLearning,
        Principle::CognitiveLoad,
        Principle::Scaffolding,
        Principle::Misconceptions,
        Principle::Relevance,
        Principle::EmotionalTone,
        Principle::Transfer,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Principle::ActiveLearning => "active-learning",
            Principle::CognitiveLoad => "cognitive-load",
            Principle::Scaffolding => "scaffolding",
            Principle::Misconceptions => "misconceptions",
            Principle::Relevance => "relevance",
            Principle::EmotionalTone => "emotional-tone",
            Principle::Transfer => "transfer",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Principle::ActiveLearning => "the learner must do something, not only read",
            Principle::CognitiveLoad => "one new concept per turn, short paragraphs",
            Principle::Scaffolding => "build on what the learner showed, within reach of their level",
            Principle::Misconceptions => "address likely misconceptions instead of ignoring them",
            Principle::Relevance => "connect the idea to the learner's goal",
            Principle::EmotionalTone => "warm and encouraging, never condescending",
            Principle::Transfer => "the question asks to apply the idea, not repeat a definition",
        }
    }

    /// 接受 id、snake_case 或 1 起始编号
    pub fn parse(raw: &str) -> Option<Principle> {
        let key = raw.trim().to_lowercase().replace('_', "-");
        if let Ok(n) = key.parse::<usize>() {
            return n.checked_sub(1).and_then(|i| Self::ALL.get(i).copied());
        }
        Self::ALL.into_iter().find(|p| key == p.id() || key.starts_with(&format!("{}:", p.id())))
    }

    /// 违规条目转为给 Tutor 的修改意见
    pub fn revision_note(violation: &str) -> String {
        match Principle::parse(violation) {
            Some(p) => format!("{}: {}", p.id(), p.description()),
            None => violation.to_string(),
        }
    }
}

impl fmt::Display for Principle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ReviewWire {
    passed: bool,
    /// 违反的原则 id
    #[serde(default)]
    violations: Vec<String>,
    /// 可选：直接可用的改写全文
    #[serde(default)]
    replacement: Option<String>,
}

/// 审查输入
#[derive(Clone, Debug)]
pub struct ReviewRequest {
    pub node: PathNode,
    pub draft: TutorDraft,
}

/// 审查结论
#[derive(Clone, Debug, PartialEq)]
pub struct ReviewResult {
    pub passed: bool,
    pub violations: Vec<String>,
    pub replacement: Option<String>,
}

pub struct Reviewer {
    runtime: AgentRuntime,
    temperature: f32,
    system_prompt: String,
}

impl Reviewer {
    pub fn new(runtime: AgentRuntime, temperature: f32) -> Self {
        let system = runtime.system_prompt(AgentRole::Reviewer, &default_system_prompt());
        Self {
            system_prompt: with_output_contract::<ReviewWire>(&system),
            runtime,
            temperature,
        }
    }

    fn build_prompt(input: &ReviewRequest) -> String {
        format!(
            "NODE TITLE: {}\nNODE CONCEPT: {}\n\nDRAFT TEACHING:\n{}\n\nDRAFT QUESTION:\n{}\n\n\
List every violated principle id. Set passed to true only if there are none.",
            input.node.title,
            input.node.concept,
            input.draft.teaching.trim(),
            input.draft.question.trim()
        )
    }

    fn normalize(wire: ReviewWire) -> ReviewResult {
        let mut seen = HashSet::new();
        let mut violations: Vec<String> = wire
            .violations
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(|v| Principle::parse(&v).map_or(v, |p| p.id().to_string()))
            .filter(|v| seen.insert(v.clone()))
            .collect();
        if !wire.passed && violations.is_empty() {
            violations.push(UNSPECIFIED_VIOLATION.to_string());
        }
        ReviewResult {
            passed: wire.passed,
            violations,
            replacement: wire.replacement.filter(|r| !r.trim().is_empty()),
        }
    }
}

fn default_system_prompt() -> String {
    let mut prompt = String::from(
        "You review a tutor's draft before the learner sees it. Check it against these principles:\n",
    );
    for (i, p) in Principle::ALL.iter().enumerate() {
        prompt.push_str(&format!("{}. {} ({})\n", i + 1, p.id(), p.description()));
    }
    prompt.push_str("Be strict about real problems and ignore matters of taste.");
    prompt
}

#[async_trait]
impl Agent for Reviewer {
    type Input = ReviewRequest;
    type Output = ReviewResult;

    fn role(&self) -> AgentRole {
        AgentRole::Reviewer
    }

    async fn run(&self, input: ReviewRequest) -> Result<ReviewResult, AgentError> {
        let request = GenerationRequest::new(
            AgentRole::Reviewer,
            self.system_prompt.clone(),
            Self::build_prompt(&input),
        )
        .with_temperature(self.temperature);
        let text = self.runtime.generate(request).await?;
        let result = Self::normalize(parse_output(AgentRole::Reviewer, &text)?);
        if !result.passed {
            tracing::info!(violations = ?result.violations, "Draft rejected by reviewer");
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::llm::ScriptedLlmClient;

    fn wire(passed: bool, violations: &[&str], replacement: Option<&str>) -> ReviewWire {
        ReviewWire {
            passed,
            violations: violations.iter().map(|v| v.to_string()).collect(),
            replacement: replacement.map(str::to_string),
        }
    }

    #[test]
    fn test_principle_parse_forms() {
        assert_eq!(Principle::parse("cognitive_load"), Some(Principle::CognitiveLoad));
        assert_eq!(Principle::parse("7"), Some(Principle::Transfer));
        assert_eq!(Principle::parse("0"), None);
        assert_eq!(
            Principle::parse("relevance: no link to goal"),
            Some(Principle::Relevance)
        );
        assert_eq!(Principle::parse("vibes"), None);
    }

    #[test]
    fn test_repeated_violations_collapse_in_first_seen_order() {
        let r = Reviewer::normalize(wire(false, &["relevance", "2", "relevance", "cognitive_load"], None));
        assert_eq!(r.violations, vec!["relevance", "cognitive-load"]);
    }

    #[test]
    fn test_failed_review_without_violations_is_unspecified() {
        let r = Reviewer::normalize(wire(false, &[" "], None));
        assert_eq!(r.violations, vec![UNSPECIFIED_VIOLATION.to_string()]);
    }

    #[test]
    fn test_violations_normalised_to_ids() {
        let r = Reviewer::normalize(wire(false, &["Emotional_Tone", "2", "made up"], Some("  ")));
        assert_eq!(r.violations, vec!["emotional-tone", "cognitive-load", "made up"]);
        assert!(r.replacement.is_none());
        assert!(Principle::revision_note("cognitive-load").contains("one new concept"));
        assert_eq!(Principle::revision_note("made up"), "made up");
    }

    #[test]
    fn test_default_prompt_lists_all_principles() {
        let prompt = default_system_prompt();
        for p in Principle::ALL {
            assert!(prompt.contains(p.id()));
        }
    }

    #[tokio::test]
    async fn test_pass_with_replacement() {
        let llm = Arc::new(ScriptedLlmClient::new().reply(
            AgentRole::Reviewer,
            r#"{"passed": true, "violations": [], "replacement": "Better text?"}"#,
        ));
        let reviewer = Reviewer::new(AgentRuntime::new(llm), 0.2);
        let result = reviewer
            .run(ReviewRequest {
                node: PathNode {
                    id: "n".into(),
                    title: "T".into(),
                    concept: String::new(),
                    practice: String::new(),
                },
                draft: TutorDraft {
                    teaching: "t".into(),
                    question: "q?".into(),
                    editor: None,
                },
            })
            .await
            .unwrap();
        assert!(result.passed);
        assert_eq!(result.replacement.as_deref(), Some("Better text?"));
    }
}
