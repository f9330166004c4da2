//! Echo 工具（本地后端的演示 / 测试工具）

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

/// 回显 args.text
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back. Args: {\"text\": \"message\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        args.get("text")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| "Missing text".to_string())
    }
}
