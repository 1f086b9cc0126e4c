//! 答案缓存 - 业务能力层
//!
//! 持久化已确定的答案，按归一化题干去重。
//!
//! ## 写入模型
//! - 所有保存请求进入一个 FIFO 通道，由唯一的后台任务消费
//! - 每次保存都完整读取存储、检查重复、追加、整体写回，然后才处理下一条
//! - 内容无法解析时按空存储重建；其他读取错误只丢弃本次保存，不覆盖已有内容

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{normalize_key, CacheEntry, SaveTask};

/// 整体读写的持久化能力
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn read_all(&self) -> AppResult<Vec<CacheEntry>>;
    async fn write_all(&self, entries: &[CacheEntry]) -> AppResult<()>;
}

/// JSON 文件存储（格式化输出，每次整体重写）
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 文件不存在时创建空数组
    pub async fn ensure_exists(&self) -> AppResult<()> {
        if !fs::try_exists(&self.path).await? {
            fs::write(&self.path, "[]").await?;
            info!("✓ 已初始化缓存文件: {}", self.path.display());
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for JsonFileStore {
    async fn read_all(&self) -> AppResult<Vec<CacheEntry>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| AppError::persistence_corrupt(self.path.display().to_string(), e))
    }

    async fn write_all(&self, entries: &[CacheEntry]) -> AppResult<()> {
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, json).await?;
        Ok(())
    }
}

/// 内存存储，测试和演练用
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<CacheEntry>>,
    corrupt: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<CacheEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            corrupt: Mutex::new(false),
        }
    }

    /// 模拟存储损坏：下一次成功写入前的读取都会失败
    pub fn corrupt(&self) {
        *self.corrupt.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    pub fn snapshot(&self) -> Vec<CacheEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn read_all(&self) -> AppResult<Vec<CacheEntry>> {
        if *self.corrupt.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(AppError::persistence_corrupt("memory", "模拟损坏"));
        }
        Ok(self.snapshot())
    }

    async fn write_all(&self, entries: &[CacheEntry]) -> AppResult<()> {
        *self.entries.lock().unwrap_or_else(|e| e.into_inner()) = entries.to_vec();
        *self.corrupt.lock().unwrap_or_else(|e| e.into_inner()) = false;
        Ok(())
    }
}

enum SaveCommand {
    Save(SaveTask),
    Flush(oneshot::Sender<()>),
}

/// 答案缓存
pub struct AnswerCache {
    store: Arc<dyn CacheStore>,
    tx: Mutex<Option<mpsc::UnboundedSender<SaveCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AnswerCache {
    /// 创建缓存并启动唯一的写入任务
    pub fn start(store: Arc<dyn CacheStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_save_worker(store.clone(), rx));
        Self {
            store,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// 按归一化题干查找答案（忽略大小写）
    pub async fn lookup(&self, question: &str) -> Option<String> {
        let key = normalize_key(question);
        if key.is_empty() {
            return None;
        }
        match self.store.read_all().await {
            Ok(entries) => entries
                .into_iter()
                .find(|entry| entry.key() == key)
                .map(|entry| entry.answer),
            Err(e) => {
                warn!("⚠️ 读取缓存失败，按空缓存处理: {}", e);
                None
            }
        }
    }

    /// 提交保存请求（立即返回，按入队顺序写入）
    pub fn save(&self, task: SaveTask) {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(SaveCommand::Save(task)).is_err() {
                    error!("缓存写入任务已退出，保存请求被丢弃");
                }
            }
            None => warn!("⚠️ 缓存已关闭，忽略保存请求: {}", task.question),
        }
    }

    /// 等待此前入队的所有保存完成
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        let sent = {
            let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
            guard
                .as_ref()
                .is_some_and(|tx| tx.send(SaveCommand::Flush(ack_tx)).is_ok())
        };
        if sent {
            let _ = ack_rx.await;
        }
    }

    /// 关闭队列并等待写入任务处理完剩余请求
    pub async fn shutdown(&self) {
        drop(self.tx.lock().unwrap_or_else(|e| e.into_inner()).take());
        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("缓存写入任务异常退出: {}", e);
            }
        }
    }
}

/// 唯一的写入任务：逐条处理，前一条写完才开始下一条
async fn run_save_worker(store: Arc<dyn CacheStore>, mut rx: mpsc::UnboundedReceiver<SaveCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            SaveCommand::Save(task) => match commit(store.as_ref(), task).await {
                Ok(true) => info!("💾 答案已写入缓存"),
                Ok(false) => {}
                Err(e) => error!("保存答案失败: {}", e),
            },
            SaveCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("缓存写入任务结束");
}

/// 读取 → 去重 → 追加 → 整体写回；返回是否真的写入
async fn commit(store: &dyn CacheStore, task: SaveTask) -> AppResult<bool> {
    let mut entries = match store.read_all().await {
        Ok(entries) => entries,
        Err(e @ AppError::PersistenceCorrupt { .. }) => {
            warn!("⚠️ 缓存内容损坏，按空缓存重建: {}", e);
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    let key = task.key();
    if entries.iter().any(|entry| entry.key() == key) {
        debug!("缓存中已有该题，跳过保存: {}", task.question);
        return Ok(false);
    }

    entries.push(task.into());
    store.write_all(&entries).await?;
    Ok(true)
}
