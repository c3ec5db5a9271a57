//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock），以及回复中 JSON 块的提取

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use traits::{LlmClient, LlmError};

use crate::config::AppConfig;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
///
/// 有 `DEEPSEEK_API_KEY`，或 provider 为 deepseek 且仅有 `OPENAI_API_KEY` 时走 DeepSeek 端点；
/// 两者都没有时退回 Mock。
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let deepseek_key = std::env::var("DEEPSEEK_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();
    let timeout = cfg.llm.timeouts.request;

    let use_deepseek = deepseek_key.is_some() || (provider == "deepseek" && openai_key.is_some());
    let use_openai = openai_key.is_some() && provider != "deepseek";

    if use_deepseek {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
            .unwrap_or_else(|| cfg.llm.model.clone());
        let key = deepseek_key.or(openai_key);
        let client = OpenAiClient::new(Some(DEEPSEEK_BASE_URL), &model, key.as_deref())
            .with_timeout(timeout);
        tracing::info!("Using DeepSeek LLM ({})", client.model());
        Arc::new(client)
    } else if use_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let client =
            OpenAiClient::new(cfg.llm.base_url.as_deref(), &model, openai_key.as_deref())
                .with_timeout(timeout);
        tracing::info!("Using OpenAI LLM ({})", client.model());
        Arc::new(client)
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new())
    }
}

/// 从 LLM 回复中截取 JSON 对象：优先 ```json 代码块，其次首个 `{` 到最后一个 `}`
pub fn extract_json_block(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}
