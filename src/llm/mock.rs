//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本顺序弹出预置响应，便于测试起草/审计的多轮时序；
//! 脚本耗尽时回显最后一条 User 消息。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

/// Mock 客户端：FIFO 预置响应，耗尽后回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient {
    scripted: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一组响应，按 complete 调用顺序依次返回
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            scripted: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.scripted
            .lock()
            .expect("mock lock poisoned")
            .push_back(response.into());
    }

    /// 累计 complete 调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// 尚未消费的预置响应数
    pub fn remaining(&self) -> usize {
        self.scripted.lock().expect("mock lock poisoned").len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if let Some(next) = self
            .scripted
            .lock()
            .expect("mock lock poisoned")
            .pop_front()
        {
            return Ok(next);
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(format!("Echo from Mock: {}", last_user))
    }
}
