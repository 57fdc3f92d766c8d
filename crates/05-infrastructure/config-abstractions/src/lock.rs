//! 文件锁抽象接口

use async_trait::async_trait;
use infrastructure_common::{ConfigError, LOCK_PREFIX};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 计算目标文件的锁文件路径：`<dir>/lock.<basename>`
pub fn make_lock_path(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lock_name = format!("{}{}", LOCK_PREFIX, file_name);
    match target.parent() {
        Some(dir) => dir.join(lock_name),
        None => PathBuf::from(lock_name),
    }
}

/// 已获取的文件锁
#[derive(Debug, Clone)]
pub struct LockHandle {
    /// 被锁定的目标文件
    pub target: PathBuf,
    /// 锁文件路径
    pub lock_path: PathBuf,
    /// 获取时间
    pub acquired_at: chrono::DateTime<chrono::Utc>,
    /// 获取时允许的最长等待
    pub wait_max: Duration,
    /// 是否真的创建了锁文件（只读降级模式下为 false）
    pub artifact_created: bool,
}

impl LockHandle {
    /// 创建已持有锁文件的锁句柄
    pub fn new(target: impl Into<PathBuf>, wait_max: Duration) -> Self {
        let target = target.into();
        Self {
            lock_path: make_lock_path(&target),
            target,
            acquired_at: chrono::Utc::now(),
            wait_max,
            artifact_created: true,
        }
    }

    /// 创建没有锁文件的锁句柄（只读文件系统的宽松模式）
    pub fn without_artifact(target: impl Into<PathBuf>, wait_max: Duration) -> Self {
        Self {
            artifact_created: false,
            ..Self::new(target, wait_max)
        }
    }

    /// 已持有时长
    pub fn held_for(&self) -> chrono::Duration {
        chrono::Utc::now() - self.acquired_at
    }
}

/// 文件锁后端 trait
///
/// 通过文件系统上的锁文件在进程间实现互斥，读锁与写锁使用同一个锁文件。
#[async_trait]
pub trait LockBackend: Send + Sync + std::fmt::Debug {
    /// 获取锁，最多等待 `wait_max`
    async fn acquire(&self, target: &Path, wait_max: Duration) -> Result<LockHandle, ConfigError>;

    /// 释放锁，返回是否删除了锁文件；锁文件不存在不是错误
    async fn release(&self, target: &Path) -> Result<bool, ConfigError>;

    /// 同步释放锁，供析构时使用
    fn release_blocking(&self, target: &Path) -> Result<bool, ConfigError>;

    /// 检查目标文件是否被锁定
    fn is_locked(&self, target: &Path) -> bool;

    /// 锁文件路径
    fn lock_path(&self, target: &Path) -> PathBuf {
        make_lock_path(target)
    }

    /// 获取后端名称
    fn name(&self) -> &str;
}
