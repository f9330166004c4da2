//! Scout - Rust 研究型智能体
//!
//! 模块划分：
//! - **agent**: 无头运行时（按配置装配各能力，供 CLI / HTTP 调用）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、状态、恢复策略、运行监管
//! - **decision**: 决策输出解析、Prompt、Decision Engine
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）、嵌入、Generator
//! - **memory**: 短期窗口 + 长期向量归档（MemoryStore）、本地知识库
//! - **observability**: 日志初始化与评估记录
//! - **orchestration**: 决策 -> 动作 主循环
//! - **tools**: Web 搜索、MCP 工具后端、前缀路由与执行器
//! - **web**: HTTP API（feature = "web"）

pub mod agent;
pub mod config;
pub mod core;
pub mod decision;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod orchestration;
pub mod tools;
#[cfg(feature = "web")]
pub mod web;
