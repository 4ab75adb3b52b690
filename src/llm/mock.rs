//! Mock 生成客户端（无需 API）
//!
//! - MockLlmClient：离线演示用，按角色返回结构合法、确定性的 JSON，便于本地跑通整节课
//! - ScriptedLlmClient：测试用，按角色排队预设回复 / 错误，并记录每次请求

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::llm::{AgentRole, GenerationRequest, LlmClient, LlmError};

/// 离线演示客户端：从 prompt 中提取目标 / 节点 / 学习者回答，生成确定性输出
#[derive(Debug, Default)]
pub struct MockLlmClient;

impl MockLlmClient {
    fn paths(prompt: &str) -> String {
        let objectives: Vec<String> = Regex::new(r"(?m)^OBJECTIVE \d+: (.+)$")
            .map(|re| {
                re.captures_iter(prompt)
                    .map(|c| c[1].trim().to_string())
                    .collect()
            })
            .unwrap_or_default();
        let covers: Vec<usize> = (1..=objectives.len()).collect();

        let concept_first: Vec<serde_json::Value> = objectives
            .iter()
            .enumerate()
            .map(|(i, obj)| {
                serde_json::json!({
                    "id": format!("c{}", i + 1),
                    "title": format!("Core idea: {obj}"),
                    "concept": format!("The central mechanism behind: {obj}"),
                    "practice": format!("Explain in your own words how to {obj}"),
                })
            })
            .collect();
        let mut example_first = vec![serde_json::json!({
            "id": "e0",
            "title": "A concrete problem",
            "concept": "A motivating scenario that the lesson will solve",
            "practice": "Describe what makes the scenario hard",
        })];
        example_first.extend(objectives.iter().enumerate().map(|(i, obj)| {
            serde_json::json!({
                "id": format!("e{}", i + 1),
                "title": format!("Worked example: {obj}"),
                "concept": format!("Learning by doing: {obj}"),
                "practice": format!("Apply the idea to a new case: {obj}"),
            })
        }));

        serde_json::json!({
            "paths": [
                {
                    "id": "concept-first",
                    "name": "Concept first",
                    "description": "Build the mental model, then practise",
                    "covers": covers,
                    "nodes": concept_first,
                },
                {
                    "id": "example-first",
                    "name": "Example first",
                    "description": "Start from a concrete problem and generalise",
                    "covers": covers,
                    "nodes": example_first,
                }
            ]
        })
        .to_string()
    }

    fn draft(prompt: &str) -> String {
        let title = Regex::new(r"(?m)^NODE TITLE: (.+)$")
            .ok()
            .and_then(|re| re.captures(prompt).map(|c| c[1].trim().to_string()))
            .unwrap_or_else(|| "this concept".to_string());
        let teaching = if prompt.contains("EVALUATOR GUIDANCE:") {
            format!("Let's look at **{title}** from a different angle, one small step at a time.")
        } else {
            format!("Here is the key idea behind **{title}**, with a small example to anchor it.")
        };
        serde_json::json!({
            "teaching": teaching,
            "question": format!("How would you use {title} in a situation you care about?"),
        })
        .to_string()
    }

    fn verdict(prompt: &str) -> String {
        let response = Regex::new(r"(?s)LEARNER RESPONSE:\n(.*)\n\nReturn ONLY")
            .ok()
            .and_then(|re| re.captures(prompt).map(|c| c[1].trim().to_lowercase()))
            .unwrap_or_default();
        let words = response.split_whitespace().count();
        let (intent, assessment, advance, guidance) = if response.ends_with('?') {
            ("question", "n/a", false, "Answer the learner's question, then re-ask the recall question.")
        } else if words == 0 || ["idk", "i don't know", "skip", "no idea"].contains(&response.as_str()) {
            ("give-up", "n/a", false, "Break the concept into a smaller step and offer a hint.")
        } else if words >= 5 {
            ("attempt-answer", "correct", true, "Acknowledge the answer briefly.")
        } else {
            ("attempt-answer", "partial", false, "Ask the learner to expand the answer with an example.")
        };
        serde_json::json!({
            "intent": intent,
            "assessment": assessment,
            "reasoning": "offline heuristic",
            "guidance": guidance,
            "should_advance": advance,
        })
        .to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        Ok(match request.role {
            AgentRole::PathGenerator => Self::paths(&request.prompt),
            AgentRole::Tutor => Self::draft(&request.prompt),
            AgentRole::Evaluator => Self::verdict(&request.prompt),
            AgentRole::Reviewer => r#"{"passed": true, "violations": []}"#.to_string(),
        })
    }
}

/// 测试客户端：每个角色一条回复队列，队列耗尽后使用该角色的常驻回复（若有）
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    queues: Mutex<HashMap<AgentRole, VecDeque<Result<String, LlmError>>>>,
    fallback: HashMap<AgentRole, String>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, role: AgentRole, item: Result<String, LlmError>) -> Self {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(role)
            .or_default()
            .push_back(item);
        self
    }

    /// 追加一条回复
    pub fn reply(self, role: AgentRole, text: impl Into<String>) -> Self {
        self.push(role, Ok(text.into()))
    }

    /// 追加一次失败
    pub fn fail(self, role: AgentRole, err: LlmError) -> Self {
        self.push(role, Err(err))
    }

    /// 队列耗尽后的常驻回复
    pub fn always(mut self, role: AgentRole, text: impl Into<String>) -> Self {
        self.fallback.insert(role, text.into());
        self
    }

    /// 每次调用前人为延迟（用于并发提交测试）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 已记录的某角色请求（按调用顺序）
    pub fn requests(&self, role: AgentRole) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.role == role)
            .cloned()
            .collect()
    }

    pub fn calls(&self, role: AgentRole) -> usize {
        self.requests(role).len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&request.role)
            .and_then(|q| q.pop_front());
        match next {
            Some(item) => item,
            None => self
                .fallback
                .get(&request.role)
                .cloned()
                .ok_or_else(|| LlmError::Request(format!("no scripted reply for {}", request.role))),
        }
    }
}
