//! 路径生成 Agent：为一节课的学习目标生成 2~3 条结构不同的候选学习路径
//!
//! 结构校验在这里完成：没有节点、未覆盖全部目标、与前一条重复的候选被丢弃；
//! 剩余不足 2 条视为输出不合法，由编排器以更严格的指令重试一次。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::agents::parse::parse_output;
use crate::agents::schema::with_output_contract;
use crate::agents::{Agent, AgentRuntime};
use crate::core::{AgentError, LearningPath, PathNode};
use crate::lesson::LessonPlan;
use crate::llm::{AgentRole, GenerationRequest};

pub const MIN_CANDIDATES: usize = 2;
pub const MAX_CANDIDATES: usize = 3;

const DEFAULT_SYSTEM_PROMPT: &str = "You design learning paths for a one-to-one tutor. \
A learning path is an ordered list of small teaching nodes; each node teaches one concept \
and ends with one practice task. Every path must cover every learning objective.";

/// 默认的差异化要求
const DEFAULT_STYLE: &str = "Make the candidates genuinely different: vary node ordering, \
granularity or framing (for example concept-first versus example-first). \
Do not paraphrase one path into another.";

/// 路径生成输入
#[derive(Clone, Debug)]
pub struct PathRequest {
    pub lesson: Arc<LessonPlan>,
    /// 差异化要求；None 使用默认
    pub style: Option<String>,
    /// 上一次结构不合法时的严格化提示
    pub strict_note: Option<String>,
}

impl PathRequest {
    pub fn new(lesson: impl Into<Arc<LessonPlan>>) -> Self {
        Self {
            lesson: lesson.into(),
            style: None,
            strict_note: None,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PathsWire {
    paths: Vec<PathWire>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PathWire {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    /// 覆盖的学习目标编号（从 1 开始）
    #[serde(default)]
    covers: Vec<usize>,
    #[serde(default)]
    nodes: Vec<NodeWire>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct NodeWire {
    #[serde(default)]
    id: String,
    title: String,
    #[serde(default)]
    concept: String,
    #[serde(default)]
    practice: String,
}

pub struct PathGenerator {
    runtime: AgentRuntime,
    temperature: f32,
    system_prompt: String,
}

impl PathGenerator {
    pub fn new(runtime: AgentRuntime, temperature: f32) -> Self {
        let system = runtime.system_prompt(AgentRole::PathGenerator, DEFAULT_SYSTEM_PROMPT);
        Self {
            system_prompt: with_output_contract::<PathsWire>(&system),
            runtime,
            temperature,
        }
    }

    fn build_prompt(input: &PathRequest) -> String {
        let lesson = &input.lesson;
        let mut prompt = format!("LESSON: {}\n", lesson.title);
        if !lesson.learning_goal.is_empty() {
            prompt.push_str(&format!("LEARNING GOAL: {}\n", lesson.learning_goal));
        }
        if !lesson.experience_level.is_empty() {
            prompt.push_str(&format!("LEARNER LEVEL: {}\n", lesson.experience_level));
        }
        if !lesson.topics.is_empty() {
            prompt.push_str(&format!("TOPICS: {}\n", lesson.topics.join(", ")));
        }
        prompt.push_str(&format!("OBJECTIVE COUNT: {}\n", lesson.objectives.len()));
        for (i, objective) in lesson.objectives.iter().enumerate() {
            prompt.push_str(&format!("OBJECTIVE {}: {}\n", i + 1, objective));
        }
        prompt.push_str(&format!(
            "\nGenerate between {MIN_CANDIDATES} and {MAX_CANDIDATES} candidate paths. \
List in `covers` the objective numbers each path teaches.\n{}\n",
            input.style.as_deref().unwrap_or(DEFAULT_STYLE)
        ));
        if let Some(note) = &input.strict_note {
            prompt.push_str(&format!("\n{note}\n"));
        }
        prompt
    }

    /// 结构校验与去重，保留至多 MAX_CANDIDATES 条
    fn validate(objective_count: usize, wire: PathsWire) -> Result<Vec<LearningPath>, AgentError> {
        let required: HashSet<usize> = (1..=objective_count).collect();
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut rejected: Vec<String> = Vec::new();
        let mut paths = Vec::new();

        for (i, path) in wire.paths.into_iter().enumerate() {
            let id = if path.id.trim().is_empty() {
                format!("path-{}", i + 1)
            } else {
                path.id.trim().to_string()
            };
            let nodes: Vec<PathNode> = path
                .nodes
                .into_iter()
                .filter(|n| !n.title.trim().is_empty())
                .enumerate()
                .map(|(j, n)| PathNode {
                    id: if n.id.trim().is_empty() {
                        format!("{id}-{}", j + 1)
                    } else {
                        n.id.trim().to_string()
                    },
                    title: n.title.trim().to_string(),
                    concept: n.concept,
                    practice: n.practice,
                })
                .collect();
            if nodes.is_empty() {
                rejected.push(format!("{id}: no nodes"));
                continue;
            }
            let covered: HashSet<usize> = path.covers.into_iter().collect();
            if !required.is_subset(&covered) {
                let mut missing: Vec<usize> = required.difference(&covered).copied().collect();
                missing.sort_unstable();
                rejected.push(format!("{id}: objectives {missing:?} not covered"));
                continue;
            }
            let signature: Vec<String> = nodes.iter().map(|n| n.title.to_lowercase()).collect();
            if !seen.insert(signature) {
                rejected.push(format!("{id}: duplicate of an earlier path"));
                continue;
            }
            let name = if path.name.trim().is_empty() {
                format!("Path {}", paths.len() + 1)
            } else {
                path.name.trim().to_string()
            };
            paths.push(LearningPath {
                id,
                name,
                description: path.description.trim().to_string(),
                nodes,
            });
        }

        for reason in &rejected {
            tracing::warn!("Dropped candidate path: {}", reason);
        }
        if paths.len() < MIN_CANDIDATES {
            return Err(AgentError::malformed(
                AgentRole::PathGenerator,
                format!(
                    "{} usable candidate paths, need at least {MIN_CANDIDATES} ({})",
                    paths.len(),
                    rejected.join("; ")
                ),
            ));
        }
        paths.truncate(MAX_CANDIDATES);
        Ok(paths)
    }
}

#[async_trait]
impl Agent for PathGenerator {
    type Input = PathRequest;
    type Output = Vec<LearningPath>;

    fn role(&self) -> AgentRole {
        AgentRole::PathGenerator
    }

    async fn run(&self, input: PathRequest) -> Result<Vec<LearningPath>, AgentError> {
        let request = GenerationRequest::new(
            AgentRole::PathGenerator,
            self.system_prompt.clone(),
            Self::build_prompt(&input),
        )
        .with_temperature(self.temperature);
        let text = self.runtime.generate(request).await?;
        let wire: PathsWire = parse_output(AgentRole::PathGenerator, &text)?;
        let paths = Self::validate(input.lesson.objectives.len(), wire)?;
        tracing::info!("Generated {} candidate paths for {}", paths.len(), input.lesson.title);
        Ok(paths)
    }
}
