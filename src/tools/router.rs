//! 工具前缀路由
//!
//! 后端按名存入有序表，路由只看名字不看注册顺序：`weather_get_weather` 总是落到 `weather` 后端。

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::core::{within, AgentError, Capability};
use crate::tools::{ToolBackend, ToolDescriptor};

/// `<backend>_<tool>`
pub fn qualified_name(backend: &str, tool: &str) -> String {
    format!("{backend}_{tool}")
}

/// 按第一个 `_` 拆分为 (backend, tool)；任一部分为空时返回 None
pub fn split_tool_name(name: &str) -> Option<(&str, &str)> {
    name.split_once('_')
        .filter(|(backend, tool)| !backend.is_empty() && !tool.is_empty())
}

/// 后端名：非空，仅 ASCII 字母数字与 `-`（不能含 `_`，否则前缀拆分会歧义）
pub fn validate_backend_name(name: &str) -> Result<(), AgentError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(AgentError::config(format!(
            "invalid tool backend name '{name}': use letters, digits or '-'"
        )));
    }
    Ok(())
}

#[derive(Default)]
pub struct ToolRouter {
    backends: BTreeMap<String, Arc<dyn ToolBackend>>,
    discovered: RwLock<Vec<ToolDescriptor>>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启动期注册；名字非法或重复是配置错误
    pub fn register(&mut self, backend: Arc<dyn ToolBackend>) -> Result<(), AgentError> {
        let name = backend.name().to_string();
        validate_backend_name(&name)?;
        if self.backends.contains_key(&name) {
            return Err(AgentError::config(format!("duplicate tool backend '{name}'")));
        }
        self.backends.insert(name, backend);
        Ok(())
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// 纯前缀匹配：返回所属后端与去掉前缀的工具名
    pub fn resolve(&self, name: &str) -> Result<(Arc<dyn ToolBackend>, String), AgentError> {
        let (prefix, tool) =
            split_tool_name(name).ok_or_else(|| AgentError::UnknownBackend(name.to_string()))?;
        let backend = self
            .backends
            .get(prefix)
            .cloned()
            .ok_or_else(|| AgentError::UnknownBackend(prefix.to_string()))?;
        Ok((backend, tool.to_string()))
    }

    /// 逐个后端查询工具列表；失败的后端记录 warn 后跳过
    pub async fn discover(&self, timeout: Duration) -> Vec<ToolDescriptor> {
        let mut found = Vec::new();
        for (backend_name, backend) in &self.backends {
            match within(Capability::ToolInvoker, timeout, backend.list_tools()).await {
                Ok(tools) => {
                    tracing::info!(backend = %backend_name, count = tools.len(), "tools discovered");
                    found.extend(tools.into_iter().map(|t| ToolDescriptor {
                        name: qualified_name(backend_name, &t.name),
                        backend: backend_name.clone(),
                        description: format!("[{}] {}", backend_name.to_uppercase(), t.description),
                    }));
                }
                Err(e) => {
                    tracing::warn!(backend = %backend_name, error = %e, "tool discovery failed");
                }
            }
        }
        *self.discovered.write().unwrap_or_else(PoisonError::into_inner) = found.clone();
        found
    }

    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.discovered
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::BackendTool;
    use async_trait::async_trait;
    use serde_json::Value;

    struct NamedBackend {
        name: &'static str,
        tools: Vec<&'static str>,
        fail_listing: bool,
    }

    #[async_trait]
    impl ToolBackend for NamedBackend {
        fn name(&self) -> &str {
            self.name
        }

        async fn list_tools(&self) -> Result<Vec<BackendTool>, AgentError> {
            if self.fail_listing {
                return Err(AgentError::failure(Capability::ToolInvoker, "connection refused"));
            }
            Ok(self
                .tools
                .iter()
                .map(|t| BackendTool {
                    name: t.to_string(),
                    description: format!("{t} tool"),
                })
                .collect())
        }

        async fn call_tool(&self, tool: &str, _args: Value) -> Result<String, AgentError> {
            Ok(format!("{}:{}", self.name, tool))
        }
    }

    fn backend(name: &'static str, tools: Vec<&'static str>) -> Arc<dyn ToolBackend> {
        Arc::new(NamedBackend { name, tools, fail_listing: false })
    }

    #[test]
    fn test_split_on_first_separator() {
        assert_eq!(split_tool_name("weather_get_weather"), Some(("weather", "get_weather")));
        assert_eq!(split_tool_name("noseparator"), None);
        assert_eq!(split_tool_name("_tool"), None);
        assert_eq!(split_tool_name("backend_"), None);
    }

    #[tokio::test]
    async fn test_routing_ignores_registration_order() {
        for order in [["weather", "langfuse"], ["langfuse", "weather"]] {
            let mut router = ToolRouter::new();
            for name in order {
                router.register(backend(name, vec!["get_weather"])).unwrap();
            }
            let (b, tool) = router.resolve("weather_get_weather").unwrap();
            assert_eq!(b.name(), "weather");
            assert_eq!(tool, "get_weather");
            assert_eq!(
                b.call_tool(&tool, Value::Null).await.unwrap(),
                "weather:get_weather"
            );
        }
    }

    #[test]
    fn test_unknown_prefix() {
        let mut router = ToolRouter::new();
        router.register(backend("weather", vec![])).unwrap();
        assert_eq!(
            router.resolve("unknown_foo").err(),
            Some(AgentError::UnknownBackend("unknown".into()))
        );
        assert!(matches!(router.resolve("plain"), Err(AgentError::UnknownBackend(_))));
    }

    #[test]
    fn test_register_rejects_bad_and_duplicate_names() {
        let mut router = ToolRouter::new();
        assert!(router.register(backend("has_underscore", vec![])).is_err());
        assert!(router.register(backend("", vec![])).is_err());
        router.register(backend("weather", vec![])).unwrap();
        assert!(matches!(
            router.register(backend("weather", vec![])),
            Err(AgentError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn test_discover_prefixes_and_skips_failing_backends() {
        let mut router = ToolRouter::new();
        router.register(backend("weather", vec!["get_weather", "get_forecast"])).unwrap();
        router
            .register(Arc::new(NamedBackend {
                name: "langfuse",
                tools: vec!["get_traces"],
                fail_listing: true,
            }))
            .unwrap();

        let tools = router.discover(Duration::from_secs(1)).await;
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["weather_get_weather", "weather_get_forecast"]);
        assert_eq!(tools[0].description, "[WEATHER] get_weather tool");
        assert_eq!(router.tools(), tools);
    }
}
