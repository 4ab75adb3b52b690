//! 课程计划加载：读取 JSON 文档、按编号取课、列出课程、发现 LessonPlan*.json
//!
//! 任何文件或编号问题都是面向用户的 InvalidLessonSelection，不做静默默认。

use std::path::{Path, PathBuf};

use crate::core::SessionError;
use crate::lesson::{LessonDocument, LessonPlan, LessonSummary};

fn invalid(msg: impl Into<String>) -> SessionError {
    SessionError::InvalidLessonSelection(msg.into())
}

/// 读取并解析课程计划文档
pub fn read_document(path: &Path) -> Result<LessonDocument, SessionError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| invalid(format!("cannot read lesson plan {}: {e}", path.display())))?;
    let doc: LessonDocument = serde_json::from_str(&raw)
        .map_err(|e| invalid(format!("lesson plan {} is not valid: {e}", path.display())))?;
    if doc.lesson_plan.lessons.is_empty() {
        return Err(invalid(format!("no lessons found in {}", path.display())));
    }
    Ok(doc)
}

/// 按 1 起始的编号加载一节课
pub fn load_lesson(path: &Path, lesson_number: u32) -> Result<LessonPlan, SessionError> {
    tracing::info!("Loading lesson {} from {}", lesson_number, path.display());
    let doc = read_document(path)?;
    let plan = select_lesson(&doc, lesson_number)?;
    tracing::info!("Loaded lesson: {}", plan.title);
    tracing::debug!(objectives = plan.objectives.len(), "lesson objectives");
    Ok(plan)
}

/// 从已解析的文档中取课
pub fn select_lesson(doc: &LessonDocument, lesson_number: u32) -> Result<LessonPlan, SessionError> {
    let available: Vec<u32> = doc.numbered_lessons().map(|(n, _)| n).collect();
    let (number, entry) = doc
        .numbered_lessons()
        .find(|(n, _)| *n == lesson_number)
        .ok_or_else(|| invalid(format!("lesson {lesson_number} not found (available: {available:?})")))?;

    let plan = LessonPlan::from_entry(doc, number, entry);
    if plan.objectives.is_empty() {
        return Err(invalid(format!("lesson {number} has no learning objectives")));
    }
    Ok(plan)
}

/// 列出文档中的全部课程
pub fn list_lessons(path: &Path) -> Result<Vec<LessonSummary>, SessionError> {
    let doc = read_document(path)?;
    let summaries: Vec<LessonSummary> = doc
        .numbered_lessons()
        .map(|(number, l)| LessonSummary {
            number,
            title: l.title.clone(),
            topics: l.topics_covered.clone(),
        })
        .collect();
    tracing::info!(
        "Found {} lessons in module: {}",
        summaries.len(),
        if doc.lesson_plan.module_title.is_empty() {
            "Unknown Module"
        } else {
            doc.lesson_plan.module_title.as_str()
        }
    );
    Ok(summaries)
}

/// 在目录中查找 LessonPlan*.json（按文件名排序）
pub fn discover_lesson_files(dir: &Path) -> Vec<PathBuf> {
    let pattern = dir.join("LessonPlan*.json");
    let Some(pattern) = pattern.to_str() else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = match glob::glob(pattern) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        Err(e) => {
            tracing::warn!("Invalid lesson plan pattern {}: {}", pattern, e);
            Vec::new()
        }
    };
    files.sort();
    files
}
