//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 预置一组回复按顺序弹出；队列耗尽后回显最后一条 User 消息，包装成一条 CONTINUE_ASKING 决策。
//! 每次请求的完整消息列表都会被记录，便于断言 prompt 内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端：脚本化回复 + 请求记录
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回给定回复
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::new();
        for r in replies {
            mock.push_reply(r);
        }
        mock
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.script.lock() {
            q.push_back(Ok(reply.into()));
        }
    }

    /// 下一次调用返回错误
    pub fn push_failure(&self, error: LlmError) {
        if let Ok(mut q) = self.script.lock() {
            q.push_back(Err(error));
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// 第 n 次请求的消息列表
    pub fn request(&self, n: usize) -> Option<Vec<Message>> {
        self.requests.lock().ok().and_then(|r| r.get(n).cloned())
    }

    fn echo(messages: &[Message]) -> String {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        serde_json::json!({
            "thought": "mock",
            "intent": "CONTINUE",
            "next_action": "CONTINUE_ASKING",
            "reply_to_user": format!("Echo from Mock: {}", last_user),
        })
        .to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(messages.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(reply) => reply,
            None => Ok(Self::echo(messages)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_echo() {
        let mock = MockLlmClient::scripted(["first"]);
        mock.push_failure(LlmError::EmptyResponse);

        let msgs = vec![Message::user("hello")];
        assert_eq!(mock.complete(&msgs).await.unwrap(), "first");
        assert!(mock.complete(&msgs).await.is_err());
        let echoed = mock.complete(&msgs).await.unwrap();
        assert!(echoed.contains("Echo from Mock: hello"));
        assert_eq!(mock.request_count(), 3);
        assert_eq!(mock.request(0).unwrap()[0].content, "hello");
    }
}
