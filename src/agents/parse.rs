//! Agent 输出解析
//!
//! 从 LLM 文本中提取 JSON（```json ... ``` 代码块或最外层 {...}），再反序列化为角色的线格式；
//! 失败一律转为 MalformedOutput，由编排器按角色决定重试或重写。

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::core::AgentError;
use crate::llm::AgentRole;

fn fenced_block() -> Option<&'static Regex> {
    static FENCED: OnceLock<Option<Regex>> = OnceLock::new();
    FENCED
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

/// 提取 JSON 文本：优先代码块，否则取首个 '{' 到最后一个 '}'
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(caps) = fenced_block().and_then(|re| re.captures(trimmed)) {
        if let Some(m) = caps.get(1) {
            return Some(m.as_str());
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析为角色线格式
pub fn parse_output<T: DeserializeOwned>(role: AgentRole, output: &str) -> Result<T, AgentError> {
    let json = extract_json(output)
        .ok_or_else(|| AgentError::malformed(role, "no JSON object in reply"))?;
    serde_json::from_str(json).map_err(|e| AgentError::malformed(role, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        ok: bool,
    }

    #[test]
    fn test_plain_json() {
        let p: Probe = parse_output(AgentRole::Reviewer, r#"{"ok": true}"#).unwrap();
        assert_eq!(p, Probe { ok: true });
    }

    #[test]
    fn test_fenced_json_with_prose() {
        let text = "Sure! Here it is:\n```json\n{\"ok\": false}\n```\nHope that helps {really}.";
        let p: Probe = parse_output(AgentRole::Reviewer, text).unwrap();
        assert_eq!(p, Probe { ok: false });
    }

    #[test]
    fn test_no_json_is_malformed() {
        let err = parse_output::<Probe>(AgentRole::Evaluator, "I think they got it").unwrap_err();
        assert!(matches!(
            err,
            AgentError::MalformedOutput {
                role: AgentRole::Evaluator,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let err = parse_output::<Probe>(AgentRole::Tutor, r#"{"other": 1}"#).unwrap_err();
        assert!(err.to_string().contains("ok"));
    }
}
