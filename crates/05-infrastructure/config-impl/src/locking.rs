//! 基于锁文件的进程间文件锁实现

use async_trait::async_trait;
use config_abstractions::{make_lock_path, LockBackend, LockHandle};
use infrastructure_common::{ConfigError, LOCK_PREFIX};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::fs::OpenOptions;
use tracing::{debug, info, warn};

/// 退避初始间隔
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(1);

/// 单次退避上限
pub const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// 文件锁管理器
///
/// 通过独占创建 `<dir>/lock.<basename>` 实现互斥。锁文件已存在时按指数退避
/// 轮询，直到超过最长等待时间。
#[derive(Debug, Clone)]
pub struct FileLockManager {
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl FileLockManager {
    /// 创建新的文件锁管理器
    pub fn new() -> Self {
        Self {
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }

    /// 设置退避参数
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial.max(Duration::from_micros(1));
        self.max_backoff = max.max(self.initial_backoff);
        self
    }

    /// 列出目录中所有锁文件
    pub fn list_locks(&self, dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
        let escaped_dir = glob::Pattern::escape(&dir.to_string_lossy());
        let pattern = format!("{}/{}*", escaped_dir, LOCK_PREFIX);
        let entries = glob::glob(&pattern).map_err(|e| ConfigError::LockIo {
            path: dir.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, e.to_string()),
        })?;

        let mut locks = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) => locks.push(path),
                Err(e) => warn!("读取锁文件失败: {}", e),
            }
        }
        locks.sort();
        Ok(locks)
    }

    /// 锁文件已存在的时长，未锁定时返回 `None`
    pub fn lock_age(&self, target: &Path) -> Option<Duration> {
        let modified = std::fs::metadata(make_lock_path(target))
            .and_then(|m| m.modified())
            .ok()?;
        Some(SystemTime::now().duration_since(modified).unwrap_or_default())
    }

    /// 独占创建锁文件；返回 `false` 表示锁文件已存在
    async fn create_lock_file(&self, lock_path: &Path) -> io::Result<bool> {
        match try_create(lock_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty())
                else {
                    return Err(e);
                };
                info!("锁文件目录不存在, 正在创建: {}", parent.display());
                tokio::fs::create_dir_all(parent).await?;
                match try_create(lock_path).await {
                    Ok(()) => Ok(true),
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }
}

impl Default for FileLockManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn try_create(lock_path: &Path) -> io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
        .await
        .map(|_| ())
}

#[async_trait]
impl LockBackend for FileLockManager {
    async fn acquire(&self, target: &Path, wait_max: Duration) -> Result<LockHandle, ConfigError> {
        let lock_path = make_lock_path(target);
        let start = Instant::now();
        let mut backoff = self.initial_backoff;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let created = self
                .create_lock_file(&lock_path)
                .await
                .map_err(|source| ConfigError::LockIo {
                    path: lock_path.clone(),
                    source,
                })?;
            if created {
                debug!(
                    "获取文件锁: {} (尝试 {} 次, 耗时 {:?})",
                    lock_path.display(),
                    attempts,
                    start.elapsed()
                );
                return Ok(LockHandle::new(target, wait_max));
            }

            let elapsed = start.elapsed();
            if elapsed >= wait_max {
                warn!(
                    "等待文件锁超时: {}, 已等待 {:?}",
                    lock_path.display(),
                    elapsed
                );
                return Err(ConfigError::LockTimeout {
                    path: target.to_path_buf(),
                    waited: elapsed,
                });
            }

            let pause = backoff.min(wait_max - elapsed);
            debug!(
                "文件已被锁定, {:?} 后重试: {}",
                pause,
                lock_path.display()
            );
            tokio::time::sleep(pause).await;
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }

    async fn release(&self, target: &Path) -> Result<bool, ConfigError> {
        let lock_path = make_lock_path(target);
        match tokio::fs::remove_file(&lock_path).await {
            Ok(()) => {
                debug!("释放文件锁: {}", lock_path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ConfigError::LockIo {
                path: lock_path,
                source,
            }),
        }
    }

    fn release_blocking(&self, target: &Path) -> Result<bool, ConfigError> {
        let lock_path = make_lock_path(target);
        match std::fs::remove_file(&lock_path) {
            Ok(()) => {
                debug!("释放文件锁: {}", lock_path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ConfigError::LockIo {
                path: lock_path,
                source,
            }),
        }
    }

    fn is_locked(&self, target: &Path) -> bool {
        make_lock_path(target).exists()
    }

    fn name(&self) -> &str {
        "FileLockManager"
    }
}
