//! 课程计划：输入文档模型与会话使用的不可变 LessonPlan

use serde::{Deserialize, Serialize};

/// 课程计划文档（LessonPlan*.json 的顶层）
#[derive(Debug, Clone, Deserialize)]
pub struct LessonDocument {
    #[serde(default)]
    pub metadata: DocumentMetadata,
    pub lesson_plan: LessonPlanSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub learning_goal: String,
    #[serde(default)]
    pub experience_level: String,
    #[serde(default = "default_module_number")]
    pub module_number: u32,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            learning_goal: String::new(),
            experience_level: String::new(),
            module_number: default_module_number(),
        }
    }
}

fn default_module_number() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct LessonPlanSection {
    #[serde(default)]
    pub module_title: String,
    #[serde(default)]
    pub lessons: Vec<LessonEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LessonEntry {
    /// 缺省时以 1 起始的位置编号代替
    pub lesson_number: Option<u32>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub topics_covered: Vec<String>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
}

impl LessonDocument {
    /// (编号, 课程) 列表；编号取 lesson_number，缺省为位置
    pub fn numbered_lessons(&self) -> impl Iterator<Item = (u32, &LessonEntry)> {
        self.lesson_plan
            .lessons
            .iter()
            .enumerate()
            .map(|(i, l)| (l.lesson_number.unwrap_or(i as u32 + 1), l))
    }
}

/// 一节课的不可变描述，会话开始时创建，之后只读共享
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonPlan {
    pub module_number: u32,
    pub module_title: String,
    pub learning_goal: String,
    pub experience_level: String,
    pub lesson_number: u32,
    pub title: String,
    pub topics: Vec<String>,
    /// 有序的学习目标
    pub objectives: Vec<String>,
}

impl LessonPlan {
    pub fn new(title: impl Into<String>, objectives: Vec<String>) -> Self {
        Self {
            module_number: 1,
            module_title: String::new(),
            learning_goal: String::new(),
            experience_level: String::new(),
            lesson_number: 1,
            title: title.into(),
            topics: Vec::new(),
            objectives,
        }
    }

    pub(crate) fn from_entry(doc: &LessonDocument, number: u32, entry: &LessonEntry) -> Self {
        Self {
            module_number: doc.metadata.module_number,
            module_title: doc.lesson_plan.module_title.clone(),
            learning_goal: doc.metadata.learning_goal.clone(),
            experience_level: doc.metadata.experience_level.clone(),
            lesson_number: number,
            title: entry.title.clone(),
            topics: entry.topics_covered.clone(),
            objectives: entry
                .learning_objectives
                .iter()
                .filter(|o| !o.trim().is_empty())
                .cloned()
                .collect(),
        }
    }
}

/// 列表模式使用的课程摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonSummary {
    pub number: u32,
    pub title: String,
    pub topics: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_metadata_defaults_to_module_one() {
        let doc: LessonDocument =
            serde_json::from_str(r#"{"lesson_plan": {"lessons": []}}"#).unwrap();
        assert_eq!(doc.metadata.module_number, 1);
        assert_eq!(DocumentMetadata::default().module_number, 1);

        let doc: LessonDocument = serde_json::from_str(
            r#"{"metadata": {"learning_goal": "budgeting"}, "lesson_plan": {"lessons": []}}"#,
        )
        .unwrap();
        assert_eq!(doc.metadata.module_number, 1);
        assert_eq!(doc.metadata.learning_goal, "budgeting");
    }
}
