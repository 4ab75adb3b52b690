//! 课程层：课程计划文档模型与加载

pub mod loader;
pub mod plan;

pub use loader::{discover_lesson_files, list_lessons, load_lesson, read_document, select_lesson};
pub use plan::{LessonDocument, LessonPlan, LessonSummary};
