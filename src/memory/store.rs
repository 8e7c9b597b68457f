//! 会话存储：有界、可持久化的对话日志
//!
//! ConversationStore 持有 AgentMemory（有序消息 + 最后更新时间）与持久化后端。
//! 追加只发生在内存中；persist 时先从最旧一端截断到 max_retained，再更新时间戳并写入后端。
//! 每个 store 只由一个 ChatOrchestrator 独占，不需要加锁。

use serde::{Deserialize, Serialize};

use crate::memory::conversation::now_millis;
use crate::memory::{MemoryBackend, Message, PersistError};

/// 默认保留的最大消息条数
pub const DEFAULT_MAX_RETAINED: usize = 19;

/// 跨轮次存活的会话记忆（持久化布局：`{ messages, lastUpdated }`）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMemory {
    #[serde(default)]
    pub messages: Vec<Message>,
    /// 最后一次持久化的时间（Unix 毫秒）
    #[serde(default)]
    pub last_updated: i64,
}

impl AgentMemory {
    /// 只保留最近 max 条，丢弃最旧的
    fn trim_to(&mut self, max: usize) {
        if self.messages.len() > max {
            let excess = self.messages.len() - max;
            self.messages.drain(..excess);
        }
    }
}

pub struct ConversationStore {
    memory: AgentMemory,
    max_retained: usize,
    backend: Box<dyn MemoryBackend>,
}

impl ConversationStore {
    pub fn new(backend: impl MemoryBackend + 'static, max_retained: usize) -> Self {
        Self::with_boxed(Box::new(backend), max_retained)
    }

    pub fn with_boxed(backend: Box<dyn MemoryBackend>, max_retained: usize) -> Self {
        Self {
            memory: AgentMemory::default(),
            max_retained: max_retained.max(1),
            backend,
        }
    }

    pub fn max_retained(&self) -> usize {
        self.max_retained
    }

    pub fn append(&mut self, message: Message) {
        self.memory.messages.push(message);
    }

    /// 当前全部消息（最旧在前）
    pub fn snapshot(&self) -> &[Message] {
        &self.memory.messages
    }

    pub fn last_updated(&self) -> i64 {
        self.memory.last_updated
    }

    pub fn len(&self) -> usize {
        self.memory.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.messages.is_empty()
    }

    /// 截断到 max_retained、更新 last_updated 后写入后端
    pub async fn persist(&mut self) -> Result<(), PersistError> {
        self.memory.trim_to(self.max_retained);
        self.memory.last_updated = now_millis();
        self.backend.save(&self.memory).await
    }

    /// 从后端加载记忆，返回加载到的消息数；缺失或损坏一律视为空记忆
    pub async fn load(&mut self) -> usize {
        self.memory = match self.backend.load().await {
            Ok(Some(memory)) => memory,
            Ok(None) => AgentMemory::default(),
            Err(e) => {
                tracing::warn!(error = %e, "stored memory unreadable, starting empty");
                AgentMemory::default()
            }
        };
        self.memory.trim_to(self.max_retained);
        self.memory.messages.len()
    }

    /// 清空内存中的消息并删除已持久化的数据
    pub async fn clear(&mut self) -> Result<(), PersistError> {
        self.memory = AgentMemory::default();
        self.backend.clear().await
    }
}
