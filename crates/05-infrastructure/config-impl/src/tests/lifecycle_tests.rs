//! 配置文件生命周期测试

use super::super::*;
use super::init_test_logger;
use config_abstractions::ConfigStore;
use infrastructure_common::{ConfigError, ConfigErrorKind, ConfigMap};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

fn map(value: serde_json::Value) -> ConfigMap {
    serde_json::from_value(value).unwrap()
}

async fn create(path: &Path) -> YamlConfigManager {
    YamlConfigManager::builder()
        .filepath(path)
        .create_file(true)
        .build()
        .await
        .expect("创建配置管理器应该成功")
}

/// 测试 rebase 时本地修改优先于文件内容
#[tokio::test]
async fn test_rebase_keeps_local_changes() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.yaml");
    std::fs::write(&path, "a: 1\n").unwrap();

    let mut local = YamlConfigManager::from_yaml_file(&path).await.unwrap();
    local.insert("a".to_string(), json!(2));

    // 另一个持有者在此期间修改了文件
    let mut remote = YamlConfigManager::from_yaml_file(&path).await.unwrap();
    {
        let mut guard = write_lock(&mut remote).await.unwrap();
        guard.insert("b".to_string(), json!(3));
        guard.write().await.unwrap();
    }

    {
        let mut guard = write_lock(&mut local).await.unwrap();
        guard.rebase().await.unwrap();
        assert_eq!(guard.data(), &map(json!({ "a": 2, "b": 3 })));
        guard.write().await.unwrap();
    }

    let reloaded = YamlConfigManager::from_yaml_file(&path).await.unwrap();
    assert_eq!(reloaded.data(), &map(json!({ "a": 2, "b": 3 })));
}

/// 测试 rebase 深度合并嵌套映射
#[tokio::test]
async fn test_rebase_merges_nested_sections() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.yaml");
    std::fs::write(&path, "db:\n  host: remote\n  port: 5432\n").unwrap();

    let mut config = YamlConfigManager::builder()
        .filepath(&path)
        .entries(map(json!({ "db": { "port": 6000 } })))
        .build()
        .await
        .unwrap();
    // 显式配置项只覆盖顶层
    assert_eq!(config.get("db").unwrap(), &json!({ "port": 6000 }));

    let mut guard = read_lock(&mut config).await.unwrap();
    guard.rebase().await.unwrap();
    assert_eq!(
        guard.get("db").unwrap(),
        &json!({ "host": "remote", "port": 6000 })
    );
}

/// 测试 reset 丢弃本地修改
#[tokio::test]
async fn test_reset_discards_local_changes() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.yaml");
    std::fs::write(&path, "a: 1\n").unwrap();

    let mut config = YamlConfigManager::from_yaml_file(&path).await.unwrap();
    config.insert("b".to_string(), json!(2));

    let mut guard = write_lock(&mut config).await.unwrap();
    guard.reset().await.unwrap();
    assert_eq!(guard.data(), &map(json!({ "a": 1 })));
}

/// 测试写入必须持有写锁，作用域结束后锁文件被删除
#[tokio::test]
async fn test_write_requires_lock() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.yaml");
    let lock_path = dir.path().join("lock.cfg.yaml");
    let mut config = create(&path).await;

    config.insert("x".to_string(), json!(1));
    let err = config.write().await.unwrap_err();
    assert_eq!(err.kind(), ConfigErrorKind::NotLocked);
    assert!(matches!(err, ConfigError::NotLocked { operation: "write" }));

    {
        let guard = write_lock(&mut config).await.unwrap();
        assert!(lock_path.exists());
        assert_eq!(guard.write().await.unwrap(), path);
    }
    assert!(!lock_path.exists());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "x: 1\n");
}

/// 测试重复解锁是幂等的
#[tokio::test]
async fn test_unlock_is_idempotent() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let mut config = create(&dir.path().join("cfg.yaml")).await;

    assert!(!config.unlock().await.unwrap());
    config.lock().await.unwrap();
    config.lock().await.unwrap();
    assert!(config.unlock().await.unwrap());
    assert!(!config.unlock().await.unwrap());
    assert_eq!(config.lock_state(), LockState::Unlocked);
}

/// 测试创建文件、在作用域内写入并由第二个管理器重新加载
#[tokio::test]
async fn test_create_write_reload() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("cfg.yaml");

    let mut first = create(&path).await;
    assert!(path.exists());
    assert!(first.is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");

    {
        let mut guard = write_lock(&mut first).await.unwrap();
        guard.insert("2".to_string(), json!("second"));
        guard.insert("3.14".to_string(), json!("pi"));
        guard.insert("section".to_string(), json!({ "10": [1, 2], "flag": true }));
        guard.write().await.unwrap();
    }

    let second = YamlConfigManager::from_yaml_file(&path).await.unwrap();
    assert_eq!(second.data(), first.data());
    assert_eq!(second.get("2").unwrap(), &json!("second"));
    assert_eq!(second.get("section").unwrap()["10"], json!([1, 2]));
    assert_eq!(
        second.keys().cloned().collect::<Vec<_>>(),
        ["2", "3.14", "section"]
    );
}

/// 测试作用域内 `?` 提前返回同样释放锁
#[tokio::test]
async fn test_early_return_releases_lock() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.yaml");
    let mut config = create(&path).await;

    async fn failing_update(config: &mut YamlConfigManager) -> Result<(), ConfigError> {
        let guard = write_lock(config).await?;
        guard.get("missing")?;
        guard.write().await?;
        Ok(())
    }

    let err = failing_update(&mut config).await.unwrap_err();
    assert_eq!(err.kind(), ConfigErrorKind::KeyNotFound);
    assert!(!config.is_locked());
    assert!(!dir.path().join("lock.cfg.yaml").exists());
}

/// 测试持有锁的任务 panic 后锁被释放
#[tokio::test]
async fn test_panic_releases_lock() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.yaml");
    let config = create(&path).await;

    let result = tokio::spawn(async move {
        let mut config = config;
        let _guard = write_lock(&mut config).await.unwrap();
        panic!("持有锁时 panic");
    })
    .await;

    assert!(result.unwrap_err().is_panic());
    assert!(!dir.path().join("lock.cfg.yaml").exists());
}

/// 测试只读场景下的宽松锁降级
#[tokio::test]
async fn test_permission_denied_degrades_without_artifact() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.yaml");
    std::fs::write(&path, "a: 1\n").unwrap();
    let backend = std::sync::Arc::new(DeniedLockBackend(std::io::ErrorKind::PermissionDenied));

    let mut config = YamlConfigManager::builder()
        .filepath(&path)
        .with_lock_backend(backend.clone())
        .build()
        .await
        .unwrap();
    assert_eq!(config.get("a").unwrap(), &json!(1));

    {
        let guard = read_lock(&mut config).await.unwrap();
        let handle = guard.lock_handle().unwrap();
        assert!(!handle.artifact_created);
    }
    assert!(!config.is_locked());

    let err = YamlConfigManager::builder()
        .filepath(&path)
        .with_lock_backend(backend)
        .strict_ro_locks(true)
        .build()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ConfigErrorKind::LockIo);
}

/// 测试只读挂载上同样按宽松模式降级
#[tokio::test]
async fn test_read_only_filesystem_degrades_without_artifact() {
    init_test_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.yaml");
    std::fs::write(&path, "a: 1\n").unwrap();
    let backend = std::sync::Arc::new(DeniedLockBackend(std::io::ErrorKind::ReadOnlyFilesystem));

    let mut config = YamlConfigManager::builder()
        .filepath(&path)
        .with_lock_backend(backend.clone())
        .build()
        .await
        .unwrap();
    assert_eq!(config.get("a").unwrap(), &json!(1));
    {
        let guard = write_lock(&mut config).await.unwrap();
        assert!(!guard.lock_handle().unwrap().artifact_created);
    }

    let err = YamlConfigManager::builder()
        .filepath(&path)
        .with_lock_backend(backend)
        .strict_ro_locks(true)
        .build()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ConfigErrorKind::LockIo);
}

/// 测试写入符号链接时更新链接指向的文件并保留权限
#[cfg(unix)]
#[tokio::test]
async fn test_write_through_symlink_updates_target() {
    use std::os::unix::fs::PermissionsExt;

    init_test_logger();
    let dir = TempDir::new().unwrap();
    let real = dir.path().join("real.yaml");
    let link = dir.path().join("cfg.yaml");
    std::fs::write(&real, "a: 1\n").unwrap();
    std::fs::set_permissions(&real, std::fs::Permissions::from_mode(0o640)).unwrap();
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let mut config = YamlConfigManager::from_yaml_file(&link).await.unwrap();
    {
        let mut guard = write_lock(&mut config).await.unwrap();
        guard.insert("a".to_string(), json!(2));
        guard.write().await.unwrap();
    }

    assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(std::fs::read_to_string(&real).unwrap(), "a: 2\n");
    let mode = std::fs::metadata(&real).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o640);
    assert!(!dir.path().join("lock.cfg.yaml").exists());
}

/// 总是以给定错误类型失败的锁后端
#[derive(Debug)]
struct DeniedLockBackend(std::io::ErrorKind);

#[async_trait::async_trait]
impl config_abstractions::LockBackend for DeniedLockBackend {
    async fn acquire(
        &self,
        target: &Path,
        _wait_max: std::time::Duration,
    ) -> Result<config_abstractions::LockHandle, ConfigError> {
        Err(ConfigError::LockIo {
            path: config_abstractions::make_lock_path(target),
            source: std::io::Error::from(self.0),
        })
    }

    async fn release(&self, _target: &Path) -> Result<bool, ConfigError> {
        Ok(false)
    }

    fn release_blocking(&self, _target: &Path) -> Result<bool, ConfigError> {
        Ok(false)
    }

    fn is_locked(&self, _target: &Path) -> bool {
        false
    }

    fn name(&self) -> &str {
        "DeniedLockBackend"
    }
}
