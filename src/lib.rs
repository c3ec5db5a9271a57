//! Tailor - 多 Agent 简历修订工作流
//!
//! 模块划分：
//! - **agents**: Agent 接口、注册表，以及 plan / guide / editor 三个 Agent
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态、错误类型、编排器
//! - **document**: 简历文档模型与确定性改写
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话消息
//! - **observability**: 日志初始化
//! - **storage**: 会话检查点持久化与元数据
//! - **workflow**: 修订计划与待确认变更

pub mod agents;
pub mod config;
pub mod core;
pub mod document;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod storage;
pub mod workflow;
