//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SCOUT__*` 覆盖（双下划线表示嵌套，如 `SCOUT__MEMORY__WINDOW_SIZE=8`）。
//! 凭据（OPENAI_API_KEY、PINECONE_API_KEY、各工具后端的 credential_env）只从环境变量读取。

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::AgentError;
use crate::decision::Preference;
use crate::tools::router::validate_backend_name;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub memory: MemorySection,
    pub routing: RoutingSection,
    pub search: SearchSection,
    pub retrieval: RetrievalSection,
    pub timeouts: TimeoutsSection,
    pub tools: ToolsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 请求未携带 session_id 时使用
    pub default_session: String,
    /// scout-web 监听地址
    pub listen: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "scout".to_string(),
            default_session: "anonymous".to_string(),
            listen: "127.0.0.1:8000".to_string(),
        }
    }
}

/// [llm] 段：OpenAI 兼容端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: 0.2,
        }
    }
}

/// [embedding] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub model: String,
    /// 向量维度，必须与长期记忆索引一致
    pub dimension: usize,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
        }
    }
}

/// 长期记忆索引后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Memory,
    Pinecone,
}

/// [memory] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// 短期窗口消息条数（偶数）
    pub window_size: usize,
    pub retrieval_k: usize,
    /// 召回最低相似度；不设置表示总是返回最相近的一条
    pub min_recall_score: Option<f32>,
    pub index: IndexBackend,
    pub pinecone: PineconeSection,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            window_size: 6,
            retrieval_k: 1,
            min_recall_score: None,
            index: IndexBackend::Memory,
            pinecone: PineconeSection::default(),
        }
    }
}

/// [memory.pinecone] 段（API Key 来自 PINECONE_API_KEY）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PineconeSection {
    /// 索引数据面地址
    pub host: Option<String>,
    pub namespace: Option<String>,
}

/// [routing] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingSection {
    pub turn_budget: u32,
    pub prefer: Preference,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            turn_budget: 3,
            prefer: Preference::Retrieve,
        }
    }
}

/// [search] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub enabled: bool,
    pub max_results: usize,
    pub endpoint: Option<String>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: 3,
            endpoint: None,
        }
    }
}

/// [retrieval] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub top_k: usize,
    /// 预先构建的知识库 JSON；不设置则关闭检索
    pub knowledge_path: Option<PathBuf>,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: 3,
            knowledge_path: None,
        }
    }
}

/// [timeouts] 段（秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutsSection {
    pub generator: u64,
    pub embedder: u64,
    pub search: u64,
    pub retrieval: u64,
    pub index: u64,
    pub tool: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            generator: 60,
            embedder: 20,
            search: 15,
            retrieval: 10,
            index: 20,
            tool: 30,
        }
    }
}

impl TimeoutsSection {
    pub fn generator(&self) -> Duration {
        Duration::from_secs(self.generator)
    }
    pub fn embedder(&self) -> Duration {
        Duration::from_secs(self.embedder)
    }
    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search)
    }
    pub fn retrieval(&self) -> Duration {
        Duration::from_secs(self.retrieval)
    }
    pub fn index(&self) -> Duration {
        Duration::from_secs(self.index)
    }
    pub fn tool(&self) -> Duration {
        Duration::from_secs(self.tool)
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 是否注册进程内 `local` 后端（echo 工具）
    pub local: bool,
    pub backends: Vec<ToolBackendConfig>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            local: false,
            backends: default_backends(),
        }
    }
}

fn default_backends() -> Vec<ToolBackendConfig> {
    vec![
        ToolBackendConfig {
            name: "weather".to_string(),
            url: "https://jiri-spilka--weather-mcp-server.apify.actor/mcp".to_string(),
            credential_env: vec!["APIFY_API_TOKEN".to_string()],
            auth_template: default_auth_template(),
            enabled: true,
        },
        ToolBackendConfig {
            name: "langfuse".to_string(),
            url: "https://cloud.langfuse.com/api/public/mcp".to_string(),
            credential_env: vec![
                "LANGFUSE_PUBLIC_KEY".to_string(),
                "LANGFUSE_SECRET_KEY".to_string(),
            ],
            auth_template: default_auth_template(),
            enabled: true,
        },
    ]
}

fn default_auth_template() -> String {
    "Bearer {credentials}".to_string()
}

fn default_true() -> bool {
    true
}

/// [[tools.backends]]：一个 MCP 工具后端
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ToolBackendConfig {
    /// 工具名前缀
    pub name: String,
    pub url: String,
    /// 必需的凭据环境变量；任一缺失则不参与工具发现
    #[serde(default)]
    pub credential_env: Vec<String>,
    /// Authorization 头模板，`{credentials}` 替换为各凭据以 `:` 连接
    #[serde(default = "default_auth_template")]
    pub auth_template: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ToolBackendConfig {
    /// 读取全部凭据；任一缺失或为空返回 None
    pub fn credentials(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<Vec<String>> {
        self.credential_env
            .iter()
            .map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
            .collect()
    }

    /// 由凭据生成 Authorization 头；不需要凭据的后端返回 None
    pub fn authorization(&self, credentials: &[String]) -> Option<String> {
        if credentials.is_empty() {
            return None;
        }
        Some(self.auth_template.replace("{credentials}", &credentials.join(":")))
    }
}

impl AppConfig {
    /// 启动期校验；失败即 ConfigurationError
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.memory.window_size == 0 || self.memory.window_size % 2 != 0 {
            return Err(AgentError::config(format!(
                "memory.window_size must be a positive even number, got {}",
                self.memory.window_size
            )));
        }
        if self.memory.retrieval_k == 0 {
            return Err(AgentError::config("memory.retrieval_k must be at least 1"));
        }
        if self.routing.turn_budget == 0 {
            return Err(AgentError::config("routing.turn_budget must be at least 1"));
        }
        if self.embedding.dimension == 0 {
            return Err(AgentError::config("embedding.dimension must be positive"));
        }
        if self.retrieval.top_k == 0 {
            return Err(AgentError::config("retrieval.top_k must be at least 1"));
        }
        if self.search.enabled && self.search.max_results == 0 {
            return Err(AgentError::config("search.max_results must be at least 1"));
        }
        if self.memory.index == IndexBackend::Pinecone
            && self.memory.pinecone.host.as_deref().map_or(true, |h| h.trim().is_empty())
        {
            return Err(AgentError::config(
                "memory.index = \"pinecone\" requires memory.pinecone.host",
            ));
        }
        let mut seen = HashSet::new();
        let local = self.tools.local.then_some("local");
        for name in self
            .tools
            .backends
            .iter()
            .map(|b| b.name.as_str())
            .chain(local)
        {
            validate_backend_name(name)?;
            if !seen.insert(name) {
                return Err(AgentError::config(format!("duplicate tool backend '{name}'")));
            }
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 SCOUT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SCOUT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SCOUT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
