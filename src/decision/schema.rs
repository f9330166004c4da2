//! 决策 JSON Schema（schemars 自动生成）
//!
//! 拼入决策提示词，减少 LLM 输出格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};

/// 决策输出格式：与 parse_decision 接受的 JSON 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct DecisionFormat {
    /// search | retrieve | tool | answer
    pub action: String,
    /// 简短理由
    pub reason: String,
    /// action == "search" 时必填
    pub search_query: Option<String>,
    /// action == "tool" 时必填，形如 weather_get_weather
    pub tool: Option<String>,
    /// 工具参数
    pub args: Option<HashMap<String, serde_json::Value>>,
}

/// 返回决策的 JSON Schema 字符串
pub fn decision_schema_json() -> String {
    let schema = schema_for!(DecisionFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_names_every_field() {
        let schema = decision_schema_json();
        for field in ["action", "reason", "search_query", "tool", "args"] {
            assert!(schema.contains(field), "missing {field}");
        }
    }
}
