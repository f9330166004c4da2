//! 决策解析：LLM 文本 -> Decision
//!
//! 接受 ```json 代码块或首个 `{` 到最后一个 `}` 之间的 JSON；
//! 格式：{"action": "search|retrieve|tool|answer", "reason": "...", "search_query": "...", "tool": "...", "args": {...}}
//! 任何变体之外的输出都是 MalformedDecision，不会被当作控制流。

use serde::Deserialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::decision::Decision;

#[derive(Debug, Deserialize)]
struct RawDecision {
    action: String,
    #[serde(default)]
    search_query: Option<String>,
    #[serde(default, alias = "tool_name")]
    tool: Option<String>,
    #[serde(default)]
    args: Option<Value>,
}

fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析决策；`fallback_query` 用于 search 未给出查询词时（通常为用户问题）
pub fn parse_decision(output: &str, fallback_query: &str) -> Result<Decision, AgentError> {
    let json_str = extract_json(output)
        .ok_or_else(|| AgentError::MalformedDecision(format!("no JSON object in: {}", preview(output))))?;

    let raw: RawDecision = serde_json::from_str(json_str)
        .map_err(|e| AgentError::MalformedDecision(format!("{}: {}", e, preview(json_str))))?;

    match raw.action.trim().to_ascii_lowercase().as_str() {
        "search" => {
            let query = raw
                .search_query
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .unwrap_or_else(|| fallback_query.trim().to_string());
            Ok(Decision::Search { query })
        }
        "retrieve" | "rag" => Ok(Decision::Retrieve),
        "answer" => Ok(Decision::Answer),
        "tool" => {
            let name = raw
                .tool
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .ok_or_else(|| AgentError::MalformedDecision("tool action without tool name".into()))?;
            let args = match raw.args {
                None | Some(Value::Null) => Value::Object(Default::default()),
                Some(v @ Value::Object(_)) => v,
                Some(other) => {
                    return Err(AgentError::MalformedDecision(format!(
                        "tool args must be an object, got {other}"
                    )))
                }
            };
            Ok(Decision::Tool { name, args })
        }
        other => Err(AgentError::MalformedDecision(format!("unknown action '{other}'"))),
    }
}

fn preview(s: &str) -> String {
    let mut p: String = s.chars().take(120).collect();
    if s.chars().count() > 120 {
        p.push_str("...");
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_search_from_fenced_block() {
        let out = "Sure.\n```json\n{\"action\": \"search\", \"reason\": \"fresh data\", \"search_query\": \"rust 2024 edition\"}\n```";
        assert_eq!(
            parse_decision(out, "q").unwrap(),
            Decision::Search { query: "rust 2024 edition".into() }
        );
    }

    #[test]
    fn test_search_without_query_uses_fallback() {
        let d = parse_decision(r#"{"action":"search","search_query":"  "}"#, "what is tokio").unwrap();
        assert_eq!(d, Decision::Search { query: "what is tokio".into() });
    }

    #[test]
    fn test_rag_is_alias_for_retrieve() {
        assert_eq!(parse_decision(r#"{"action":"rag"}"#, "q").unwrap(), Decision::Retrieve);
        assert_eq!(parse_decision(r#"{"action":"RETRIEVE"}"#, "q").unwrap(), Decision::Retrieve);
    }

    #[test]
    fn test_parse_tool_with_args() {
        let out = r#"I'll call {"action":"tool","tool":"weather_get_weather","args":{"city":"Paris"}} now"#;
        assert_eq!(
            parse_decision(out, "q").unwrap(),
            Decision::Tool {
                name: "weather_get_weather".into(),
                args: json!({"city": "Paris"}),
            }
        );
    }

    #[test]
    fn test_tool_without_args_gets_empty_object() {
        let d = parse_decision(r#"{"action":"tool","tool":"local_echo"}"#, "q").unwrap();
        assert_eq!(d, Decision::Tool { name: "local_echo".into(), args: json!({}) });
    }

    #[test]
    fn test_malformed_outputs() {
        for out in [
            "I think we should search the web.",
            "{not json}",
            r#"{"action":"dance"}"#,
            r#"{"reason":"missing action"}"#,
            r#"{"action":"tool","args":{}}"#,
            r#"{"action":"tool","tool":"x_y","args":[1,2]}"#,
        ] {
            assert!(
                matches!(parse_decision(out, "q"), Err(AgentError::MalformedDecision(_))),
                "expected malformed: {out}"
            );
        }
    }

    #[test]
    fn test_identical_output_gives_identical_decision() {
        let out = r#"{"action":"answer","answer":"42"}"#;
        assert_eq!(parse_decision(out, "q").unwrap(), parse_decision(out, "q").unwrap());
    }
}
