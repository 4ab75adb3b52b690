//! Agent 输出 JSON Schema 生成（schemars）
//!
//! 将各角色输出线格式的 Schema 拼入 system prompt，减少 LLM 输出结构错误。

use schemars::{schema_for, JsonSchema};

/// 返回类型 T 的 JSON Schema 字符串
pub fn schema_json<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

/// system prompt 末尾追加输出契约
pub fn with_output_contract<T: JsonSchema>(system: &str) -> String {
    format!(
        "{}\n\nReturn ONLY one valid JSON object matching this JSON Schema:\n{}",
        system.trim_end(),
        schema_json::<T>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Sample {
        /// 是否通过
        passed: bool,
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = schema_json::<Sample>();
        assert!(schema.contains("passed"));
        let system = with_output_contract::<Sample>("You are a reviewer.\n");
        assert!(system.starts_with("You are a reviewer.\n\nReturn ONLY"));
    }
}
