//! 会话记忆持久化
//!
//! MemoryBackend 负责把 AgentMemory 写入/读出持久存储：
//! - JsonFileBackend：单文件 JSON，先写临时文件并 fsync，再 rename 覆盖，中途崩溃不会破坏已落盘的数据
//! - InMemoryBackend：进程内存储（测试与无盘场景），同样经过 JSON 序列化

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::memory::AgentMemory;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("memory io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("memory encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// 持久化后端：一个会话对应一个后端实例，单写者
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// 读取已持久化的记忆；不存在时返回 Ok(None)，内容损坏时返回 Err
    async fn load(&self) -> Result<Option<AgentMemory>, PersistError>;

    /// 覆盖写入记忆
    async fn save(&self, memory: &AgentMemory) -> Result<(), PersistError>;

    /// 删除已持久化的记忆
    async fn clear(&self) -> Result<(), PersistError>;
}

/// 单文件 JSON 持久化
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl MemoryBackend for JsonFileBackend {
    async fn load(&self) -> Result<Option<AgentMemory>, PersistError> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    async fn save(&self, memory: &AgentMemory) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let data = serde_json::to_vec_pretty(memory)?;
        let tmp = self.temp_path();
        // 句柄在块结束时释放；sync_all 保证 rename 前内容已落盘
        let written: std::io::Result<()> = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 进程内后端：保存序列化后的 JSON 文本；克隆共享同一份存储，便于测试观察落盘内容
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<Mutex<Option<String>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以原始文本预置存储内容（可用于模拟损坏的数据）
    pub fn with_raw(raw: impl Into<String>) -> Self {
        let backend = Self::default();
        if let Ok(mut guard) = backend.data.lock() {
            *guard = Some(raw.into());
        }
        backend
    }

    /// 当前已保存的原始 JSON
    pub fn raw(&self) -> Option<String> {
        self.data.lock().ok().and_then(|g| g.clone())
    }

    /// 之后的 save 是否一律失败（模拟存储不可用）
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut guard) = self.fail_writes.lock() {
            *guard = fail;
        }
    }

    fn writes_failing(&self) -> bool {
        self.fail_writes.lock().map(|g| *g).unwrap_or(false)
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn load(&self) -> Result<Option<AgentMemory>, PersistError> {
        match self.raw() {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, memory: &AgentMemory) -> Result<(), PersistError> {
        if self.writes_failing() {
            return Err(PersistError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "storage unavailable",
            )));
        }
        let raw = serde_json::to_string(memory)?;
        if let Ok(mut guard) = self.data.lock() {
            *guard = Some(raw);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistError> {
        if let Ok(mut guard) = self.data.lock() {
            *guard = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;
    use tempfile::TempDir;

    fn sample_memory() -> AgentMemory {
        AgentMemory {
            messages: vec![Message::user("hi"), Message::assistant("hello")],
            last_updated: 42,
        }
    }

    #[tokio::test]
    async fn test_file_backend_round_trip() {
        let dir = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("nested/memory.json"));

        assert!(backend.load().await.unwrap().is_none());

        let memory = sample_memory();
        backend.save(&memory).await.unwrap();
        let loaded = backend.load().await.unwrap().unwrap();
        assert_eq!(loaded, memory);
        assert!(!backend.temp_path().exists());
    }

    #[tokio::test]
    async fn test_file_backend_persisted_layout() {
        let dir = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("memory.json"));
        backend.save(&sample_memory()).await.unwrap();

        let raw = std::fs::read_to_string(backend.path()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["lastUpdated"], 42);
        assert_eq!(v["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_backend_corrupt_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(&path, "{ not json").unwrap();
        let backend = JsonFileBackend::new(&path);
        assert!(matches!(backend.load().await, Err(PersistError::Serde(_))));
    }

    #[tokio::test]
    async fn test_file_backend_clear_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("absent.json"));
        backend.clear().await.unwrap();
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_file_backend_failed_write_removes_temp() {
        let dir = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("memory.json"));
        // 临时文件指向 /dev/full，写入必然 ENOSPC
        std::os::unix::fs::symlink("/dev/full", backend.temp_path()).unwrap();

        assert!(matches!(
            backend.save(&sample_memory()).await,
            Err(PersistError::Io(_))
        ));
        assert!(std::fs::symlink_metadata(backend.temp_path()).is_err());
        assert!(!backend.path().exists());
    }

    #[tokio::test]
    async fn test_file_backend_failed_rename_removes_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();
        let backend = JsonFileBackend::new(&path);

        assert!(backend.save(&sample_memory()).await.is_err());
        assert!(!backend.temp_path().exists());
    }

    #[tokio::test]
    async fn test_in_memory_backend_write_failure() {
        let backend = InMemoryBackend::new();
        backend.set_fail_writes(true);
        assert!(backend.save(&sample_memory()).await.is_err());
        assert!(backend.raw().is_none());
    }
}
