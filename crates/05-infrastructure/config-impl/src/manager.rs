//! YAML 配置管理器实现
//!
//! [`YamlConfigManager`] 把一份内存中的配置映射与一个可选的磁盘文件绑定在一起，
//! 并通过文件锁协调多个进程对同一文件的读写。
//!
//! 修改磁盘文件必须在写锁作用域内进行：
//!
//! ```no_run
//! # async fn demo() -> Result<(), infrastructure_common::ConfigError> {
//! use config_abstractions::ConfigStore;
//! use config_impl::{write_lock, YamlConfigManager};
//!
//! let mut config = YamlConfigManager::from_yaml_file("app.yaml").await?;
//! {
//!     let mut guard = write_lock(&mut config).await?;
//!     guard.rebase().await?;
//!     guard.insert("port".to_string(), 8080.into());
//!     guard.write().await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::locking::FileLockManager;
use crate::mapping::{absolutize, deep_update, expand_map};
use crate::serializers::YamlSerializer;
use crate::validation::JsonSchemaValidator;
use config_abstractions::{
    ConfigSerializer, ConfigStore, LockBackend, LockHandle, SchemaValidator,
};
use infrastructure_common::{ConfigError, ConfigManagerSettings, ConfigMap, ConfigValue};
use serde::Deserialize;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// 配置管理器的锁状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    /// 未持有锁
    #[default]
    Unlocked,
    /// 持有读锁
    ReadLocked,
    /// 持有写锁
    WriteLocked,
}

impl LockState {
    /// 是否持有任意一种锁
    pub fn is_locked(self) -> bool {
        self != Self::Unlocked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeMode {
    Read,
    Write,
}

/// 离开锁作用域时需要执行的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeExit {
    /// 重入的作用域，离开时什么都不做
    Reentrant,
    /// 释放锁并回到未锁定状态
    Release,
    /// 恢复到进入前的状态（读锁原地升级为写锁的情况）
    Restore(LockState),
}

/// YAML 配置管理器
///
/// 持有配置数据、可选的绑定文件路径以及锁状态。没有文件路径的管理器（由
/// [`from_obj`](Self::from_obj) 或 [`from_yaml_data`](Self::from_yaml_data)
/// 构造）同样可以进入锁作用域，只是不会产生锁文件，也不能调用
/// [`write`](Self::write)。
pub struct YamlConfigManager {
    /// 配置数据
    data: ConfigMap,
    /// 绑定的绝对文件路径
    filepath: Option<PathBuf>,
    /// 当前锁状态
    state: LockState,
    /// 当前持有的锁
    lock: Option<LockHandle>,
    /// 最长等锁时间
    wait_max: Duration,
    /// 管理器设置
    settings: ConfigManagerSettings,
    /// 配置模式
    schema: Option<ConfigValue>,
    serializer: Arc<dyn ConfigSerializer>,
    lock_backend: Arc<dyn LockBackend>,
    validator: Arc<dyn SchemaValidator>,
    /// 管理器实例标识，用于日志
    id: Uuid,
}

impl std::fmt::Debug for YamlConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YamlConfigManager")
            .field("id", &self.id)
            .field("filepath", &self.filepath)
            .field("state", &self.state)
            .field("entries", &self.data.len())
            .field("wait_max", &self.wait_max)
            .field("has_schema", &self.schema.is_some())
            .field("serializer", &self.serializer.name())
            .field("lock_backend", &self.lock_backend.name())
            .finish()
    }
}

impl YamlConfigManager {
    /// 创建构建器
    pub fn builder() -> YamlConfigManagerBuilder {
        YamlConfigManagerBuilder::default()
    }

    /// 从文件加载配置
    pub async fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::builder().filepath(path.as_ref()).build().await
    }

    /// 从内存映射创建未绑定文件的管理器
    pub fn from_obj(entries: ConfigMap) -> Self {
        Self::unbound(entries, Builtins::default())
    }

    /// 从 YAML 文本创建未绑定文件的管理器
    pub fn from_yaml_data(text: &str) -> Result<Self, ConfigError> {
        let builtins = Builtins::default();
        let data = builtins.serializer.parse(text)?;
        Ok(Self::unbound(data, builtins))
    }

    fn unbound(data: ConfigMap, builtins: Builtins) -> Self {
        let settings = ConfigManagerSettings::default();
        Self {
            data,
            filepath: None,
            state: LockState::Unlocked,
            lock: None,
            wait_max: settings.wait_max(),
            settings,
            schema: None,
            serializer: builtins.serializer,
            lock_backend: builtins.lock_backend,
            validator: builtins.validator,
            id: Uuid::new_v4(),
        }
    }

    /// 绑定的文件路径
    pub fn filepath(&self) -> Option<&Path> {
        self.filepath.as_deref()
    }

    /// 当前锁状态
    pub fn lock_state(&self) -> LockState {
        self.state
    }

    /// 是否持有锁
    pub fn is_locked(&self) -> bool {
        self.state.is_locked()
    }

    /// 当前持有的锁句柄
    pub fn lock_handle(&self) -> Option<&LockHandle> {
        self.lock.as_ref()
    }

    /// 管理器设置
    pub fn settings(&self) -> &ConfigManagerSettings {
        &self.settings
    }

    /// 最长等锁时间
    pub fn wait_max(&self) -> Duration {
        self.wait_max
    }

    /// 配置模式
    pub fn schema(&self) -> Option<&ConfigValue> {
        self.schema.as_ref()
    }

    /// 管理器实例标识
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 使用的锁后端
    pub fn lock_backend(&self) -> &Arc<dyn LockBackend> {
        &self.lock_backend
    }

    /// 返回展开了环境变量和 `~` 的配置副本
    pub fn expanded(&self) -> ConfigMap {
        expand_map(&self.data)
    }

    /// 用当前序列化器把配置转为文本，不涉及文件和锁
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        self.serializer.dump(&self.data)
    }

    /// 把整份配置绑定到具体类型
    pub fn bind<T>(&self) -> Result<T, ConfigError>
    where
        T: for<'de> Deserialize<'de>,
    {
        debug!("绑定配置到类型: {}", std::any::type_name::<T>());
        infrastructure_common::bind(&self.data)
    }

    /// 获取写锁并一直持有，直到调用 [`unlock`](Self::unlock) 或管理器被销毁
    #[instrument(skip_all, fields(handle = %self.id))]
    pub async fn lock(&mut self) -> Result<(), ConfigError> {
        match self.state {
            LockState::WriteLocked => Ok(()),
            LockState::ReadLocked => {
                debug!("读锁升级为写锁");
                self.state = LockState::WriteLocked;
                Ok(())
            }
            LockState::Unlocked => {
                self.acquire_lock().await?;
                self.state = LockState::WriteLocked;
                Ok(())
            }
        }
    }

    /// 释放持有的锁，返回是否删除了锁文件；未持有锁时什么都不做
    #[instrument(skip_all, fields(handle = %self.id))]
    pub async fn unlock(&mut self) -> Result<bool, ConfigError> {
        self.state = LockState::Unlocked;
        let Some(handle) = self.lock.take() else {
            return Ok(false);
        };
        if !handle.artifact_created {
            return Ok(false);
        }

        let removed = self.lock_backend.release(&handle.target).await?;
        debug!(
            "释放文件锁: {} (持有 {} ms)",
            handle.target.display(),
            handle.held_for().num_milliseconds()
        );
        Ok(removed)
    }

    /// 在锁内重新加载文件，并把当前内存中的数据深度合并到文件内容之上
    ///
    /// 内存中的值优先。未绑定文件时什么都不做。
    #[instrument(skip_all, fields(handle = %self.id))]
    pub async fn rebase(&mut self) -> Result<(), ConfigError> {
        self.ensure_locked("rebase")?;
        let Some(path) = self.filepath.clone() else {
            warn!("未绑定配置文件, 跳过 rebase");
            return Ok(());
        };

        let mut merged = self.read_file(&path).await?;
        let local = std::mem::take(&mut self.data);
        deep_update(&mut merged, local);
        self.data = merged;
        debug!("已从文件 rebase 配置: {}", path.display());
        Ok(())
    }

    /// 在锁内丢弃内存中的数据，用文件内容替换
    ///
    /// 未绑定文件时清空数据。
    #[instrument(skip_all, fields(handle = %self.id))]
    pub async fn reset(&mut self) -> Result<(), ConfigError> {
        self.ensure_locked("reset")?;
        self.data = match self.filepath.clone() {
            Some(path) => self.read_file(&path).await?,
            None => ConfigMap::new(),
        };
        debug!("配置已重置");
        Ok(())
    }

    /// 把配置写回绑定的文件，返回文件的绝对路径
    ///
    /// 必须在写锁作用域内调用。配置了模式且启用了 `validate_on_write` 时先验证。
    pub async fn write(&self) -> Result<PathBuf, ConfigError> {
        self.write_checked(None).await
    }

    /// 按给定模式验证后写回绑定的文件
    pub async fn write_with_schema(&self, schema: &ConfigValue) -> Result<PathBuf, ConfigError> {
        self.write_checked(Some(schema)).await
    }

    #[instrument(skip_all, fields(handle = %self.id))]
    async fn write_checked(&self, schema: Option<&ConfigValue>) -> Result<PathBuf, ConfigError> {
        let path = self
            .filepath
            .clone()
            .ok_or(ConfigError::MissingFilePath { operation: "write" })?;
        if self.state != LockState::WriteLocked {
            return Err(ConfigError::NotLocked { operation: "write" });
        }

        self.validate_before_write(schema)?;
        self.write_atomic(&path, &self.data).await?;
        info!("配置已写入: {}", path.display());
        Ok(path)
    }

    /// 把当前配置快照写到任意路径，不涉及任何锁
    #[instrument(skip_all, fields(handle = %self.id))]
    pub async fn write_copy(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
        let path = absolutize(path.as_ref())?;
        self.write_atomic(&path, &self.data).await?;
        info!("配置副本已写入: {}", path.display());
        Ok(path)
    }

    /// 在写锁内把配置写到另一个路径
    ///
    /// 目标就是绑定的文件时等同于 [`write`](Self::write)；目标被其他持有者锁定时
    /// 返回 [`ConfigError::LockConflict`]。
    #[instrument(skip_all, fields(handle = %self.id))]
    pub async fn write_to(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
        if self.state != LockState::WriteLocked {
            return Err(ConfigError::NotLocked {
                operation: "write_to",
            });
        }

        let path = absolutize(path.as_ref())?;
        if self.filepath.as_deref() == Some(path.as_path()) {
            return self.write().await;
        }
        if self.lock_backend.is_locked(&path) {
            return Err(ConfigError::LockConflict { path });
        }
        if tokio::fs::try_exists(&path).await? {
            warn!("写入未被锁定的已有文件: {}", path.display());
        }

        self.validate_before_write(None)?;
        self.write_atomic(&path, &self.data).await?;
        info!("配置已写入: {}", path.display());
        Ok(path)
    }

    /// 按模式验证展开后的配置
    ///
    /// 优先使用传入的模式，否则使用构造时配置的模式；两者都没有时直接通过。
    /// `exclude_case` 为 `true` 时错误中不附带配置数据。
    pub fn validate(
        &self,
        schema: Option<&ConfigValue>,
        exclude_case: bool,
    ) -> Result<(), ConfigError> {
        let Some(schema) = schema.or(self.schema.as_ref()) else {
            debug!("未配置模式, 跳过验证");
            return Ok(());
        };

        let instance = ConfigValue::Object(self.expanded());
        let report = self.validator.validate(&instance, schema);
        if report.is_valid {
            debug!(
                "配置验证通过: {} 个节点, 耗时 {:?}",
                report.validated_count, report.duration
            );
            return Ok(());
        }

        warn!("配置验证失败: {}", report.summary());
        Err(ConfigError::ValidationFailure {
            message: report.summary(),
            errors: report.errors.iter().map(ToString::to_string).collect(),
            instance: (!exclude_case).then(|| Box::new(instance)),
        })
    }

    fn validate_before_write(&self, schema: Option<&ConfigValue>) -> Result<(), ConfigError> {
        match schema {
            Some(schema) => self.validate(Some(schema), false),
            None if self.settings.validate_on_write => self.validate(None, false),
            None => Ok(()),
        }
    }

    fn ensure_locked(&self, operation: &'static str) -> Result<(), ConfigError> {
        if self.state.is_locked() {
            Ok(())
        } else {
            Err(ConfigError::NotLocked { operation })
        }
    }

    async fn read_file(&self, path: &Path) -> Result<ConfigMap, ConfigError> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        self.serializer.parse(&text).map_err(|e| e.with_path(path))
    }

    /// 先写同目录下的临时文件再重命名，读者不会看到写了一半的文件
    ///
    /// 目标已存在时先解析符号链接，替换链接指向的真实文件并沿用其权限。
    async fn write_atomic(&self, path: &Path, data: &ConfigMap) -> Result<(), ConfigError> {
        let text = self.serializer.dump(data)?;
        let (target, permissions) = match tokio::fs::canonicalize(path).await {
            Ok(real) => {
                let permissions = tokio::fs::metadata(&real).await?.permissions();
                (real, Some(permissions))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => (path.to_path_buf(), None),
            Err(e) => return Err(e.into()),
        };
        if target != path {
            debug!("写入符号链接指向的文件: {} -> {}", path.display(), target.display());
        }

        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(dir).await?;

        let file_name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        tokio::fs::write(&temp_path, text).await?;
        let renamed = match permissions {
            Some(permissions) => match tokio::fs::set_permissions(&temp_path, permissions).await {
                Ok(()) => tokio::fs::rename(&temp_path, &target).await,
                Err(e) => Err(e),
            },
            None => tokio::fs::rename(&temp_path, &target).await,
        };
        if let Err(e) = renamed {
            if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
                warn!("删除临时文件失败: {}, 原因: {}", temp_path.display(), cleanup);
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn acquire_lock(&mut self) -> Result<(), ConfigError> {
        let Some(path) = self.filepath.clone() else {
            debug!("未绑定配置文件, 锁作用域不创建锁文件");
            return Ok(());
        };

        match self.lock_backend.acquire(&path, self.wait_max).await {
            Ok(handle) => {
                debug!("已锁定配置文件: {}", path.display());
                self.lock = Some(handle);
                Ok(())
            }
            Err(err) if is_read_only_failure(&err) && !self.settings.strict_ro_locks => {
                warn!(
                    "无法创建锁文件, 按只读文件系统处理, 在没有锁文件的情况下继续: {}",
                    path.display()
                );
                self.lock = Some(LockHandle::without_artifact(&path, self.wait_max));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn enter_scope(&mut self, mode: ScopeMode) -> Result<ScopeExit, ConfigError> {
        match (self.state, mode) {
            (LockState::Unlocked, mode) => {
                self.acquire_lock().await?;
                self.state = match mode {
                    ScopeMode::Read => LockState::ReadLocked,
                    ScopeMode::Write => LockState::WriteLocked,
                };
                Ok(ScopeExit::Release)
            }
            (LockState::ReadLocked, ScopeMode::Write) => {
                debug!("读锁在作用域内升级为写锁");
                self.state = LockState::WriteLocked;
                Ok(ScopeExit::Restore(LockState::ReadLocked))
            }
            _ => Ok(ScopeExit::Reentrant),
        }
    }

    async fn exit_scope(&mut self, exit: ScopeExit) -> Result<bool, ConfigError> {
        match exit {
            ScopeExit::Reentrant => Ok(false),
            ScopeExit::Restore(state) => {
                self.restore_state(state);
                Ok(false)
            }
            ScopeExit::Release => self.unlock().await,
        }
    }

    fn exit_scope_blocking(&mut self, exit: ScopeExit) {
        match exit {
            ScopeExit::Reentrant => {}
            ScopeExit::Restore(state) => self.restore_state(state),
            ScopeExit::Release => self.release_blocking(),
        }
    }

    /// 作用域内已经显式解锁时保持解锁状态
    fn restore_state(&mut self, state: LockState) {
        if self.state.is_locked() {
            self.state = state;
        } else {
            debug!("作用域内锁已释放, 不再恢复为 {:?}", state);
        }
    }

    /// 同步释放锁，错误只记录日志
    fn release_blocking(&mut self) {
        self.state = LockState::Unlocked;
        let Some(handle) = self.lock.take() else {
            return;
        };
        if !handle.artifact_created {
            return;
        }
        match self.lock_backend.release_blocking(&handle.target) {
            Ok(_) => debug!("释放文件锁: {}", handle.target.display()),
            Err(e) => error!("释放文件锁失败: {}", e),
        }
    }
}

/// 锁文件因权限不足或只读挂载而无法创建
fn is_read_only_failure(err: &ConfigError) -> bool {
    matches!(
        err,
        ConfigError::LockIo { source, .. }
            if matches!(
                source.kind(),
                io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem
            )
    )
}

impl Drop for YamlConfigManager {
    fn drop(&mut self) {
        if self.lock.is_some() {
            debug!("配置管理器销毁时仍持有锁, 正在释放");
            self.release_blocking();
        }
    }
}

impl ConfigStore for YamlConfigManager {
    fn data(&self) -> &ConfigMap {
        &self.data
    }

    fn data_mut(&mut self) -> &mut ConfigMap {
        &mut self.data
    }
}

/// 可以进入锁作用域的配置对象
pub trait Lockable: Send {
    /// 底层的配置管理器
    fn manager(&self) -> &YamlConfigManager;

    /// 可变的底层配置管理器
    fn manager_mut(&mut self) -> &mut YamlConfigManager;
}

impl Lockable for YamlConfigManager {
    fn manager(&self) -> &YamlConfigManager {
        self
    }

    fn manager_mut(&mut self) -> &mut YamlConfigManager {
        self
    }
}

/// 锁作用域守卫
///
/// 守卫被销毁时离开作用域：非重入的作用域会释放锁文件，读锁升级而来的写锁
/// 恢复为读锁。`?` 提前返回和 panic 同样会触发释放。
#[must_use = "守卫被丢弃时会立即释放锁"]
pub struct ConfigLockGuard<'a, C: Lockable> {
    config: &'a mut C,
    exit: ScopeExit,
}

impl<C: Lockable> ConfigLockGuard<'_, C> {
    /// 是否为重入的作用域
    pub fn is_reentrant(&self) -> bool {
        self.exit == ScopeExit::Reentrant
    }

    /// 异步离开作用域并返回释放过程中的错误
    pub async fn release(mut self) -> Result<bool, ConfigError> {
        let exit = std::mem::replace(&mut self.exit, ScopeExit::Reentrant);
        self.config.manager_mut().exit_scope(exit).await
    }
}

impl<C: Lockable> Deref for ConfigLockGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.config
    }
}

impl<C: Lockable> DerefMut for ConfigLockGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.config
    }
}

impl<C: Lockable> Drop for ConfigLockGuard<'_, C> {
    fn drop(&mut self) {
        let exit = std::mem::replace(&mut self.exit, ScopeExit::Reentrant);
        self.config.manager_mut().exit_scope_blocking(exit);
    }
}

/// 进入写锁作用域
pub async fn write_lock<C: Lockable>(config: &mut C) -> Result<ConfigLockGuard<'_, C>, ConfigError> {
    let exit = config.manager_mut().enter_scope(ScopeMode::Write).await?;
    Ok(ConfigLockGuard { config, exit })
}

/// 进入读锁作用域
pub async fn read_lock<C: Lockable>(config: &mut C) -> Result<ConfigLockGuard<'_, C>, ConfigError> {
    let exit = config.manager_mut().enter_scope(ScopeMode::Read).await?;
    Ok(ConfigLockGuard { config, exit })
}

struct Builtins {
    serializer: Arc<dyn ConfigSerializer>,
    lock_backend: Arc<dyn LockBackend>,
    validator: Arc<dyn SchemaValidator>,
}

impl Default for Builtins {
    fn default() -> Self {
        Self {
            serializer: Arc::new(YamlSerializer::new()),
            lock_backend: Arc::new(FileLockManager::new()),
            validator: Arc::new(JsonSchemaValidator::new()),
        }
    }
}

/// 配置管理器构建器
#[derive(Default)]
pub struct YamlConfigManagerBuilder {
    filepath: Option<PathBuf>,
    entries: Option<ConfigMap>,
    yaml_data: Option<String>,
    wait_max: Option<Duration>,
    settings: ConfigManagerSettings,
    schema: Option<ConfigValue>,
    schema_source: Option<PathBuf>,
    serializer: Option<Arc<dyn ConfigSerializer>>,
    lock_backend: Option<Arc<dyn LockBackend>>,
    validator: Option<Arc<dyn SchemaValidator>>,
}

impl YamlConfigManagerBuilder {
    /// 绑定的配置文件路径
    pub fn filepath(mut self, path: impl Into<PathBuf>) -> Self {
        self.filepath = Some(path.into());
        self
    }

    /// 显式配置项，顶层键覆盖文件内容
    pub fn entries(mut self, entries: ConfigMap) -> Self {
        self.entries = Some(entries);
        self
    }

    /// 未绑定文件时使用的 YAML 文本
    pub fn yaml_data(mut self, text: impl Into<String>) -> Self {
        self.yaml_data = Some(text.into());
        self
    }

    /// 整体替换管理器设置
    pub fn settings(mut self, settings: ConfigManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 最长等锁时间
    pub fn wait_max(mut self, wait_max: Duration) -> Self {
        self.wait_max = Some(wait_max);
        self.settings.wait_max_secs = wait_max.as_secs_f64();
        self
    }

    /// 文件不存在时创建空文件
    pub fn create_file(mut self, create_file: bool) -> Self {
        self.settings.create_file = create_file;
        self
    }

    /// 只读文件系统上无法创建锁文件时是否报错
    pub fn strict_ro_locks(mut self, strict: bool) -> Self {
        self.settings.strict_ro_locks = strict;
        self
    }

    /// 加载文件时跳过临时读锁
    pub fn skip_read_lock(mut self, skip: bool) -> Self {
        self.settings.skip_read_lock = skip;
        self
    }

    /// 构造时获取写锁并保持
    pub fn locked(mut self, locked: bool) -> Self {
        self.settings.locked = locked;
        self
    }

    /// 每次写入前按模式验证
    pub fn validate_on_write(mut self, validate: bool) -> Self {
        self.settings.validate_on_write = validate;
        self
    }

    /// 直接提供模式
    pub fn schema(mut self, schema: ConfigValue) -> Self {
        self.schema = Some(schema);
        self
    }

    /// 从 YAML 文件加载模式
    pub fn schema_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_source = Some(path.into());
        self
    }

    /// 替换序列化器
    pub fn with_serializer(mut self, serializer: Arc<dyn ConfigSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// 替换锁后端
    pub fn with_lock_backend(mut self, backend: Arc<dyn LockBackend>) -> Self {
        self.lock_backend = Some(backend);
        self
    }

    /// 替换模式验证器
    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// 构建配置管理器
    ///
    /// 绑定文件时：在临时读锁内加载文件（`locked` 时改为获取并保持写锁），
    /// 然后把显式配置项覆盖到文件内容之上。
    pub async fn build(self) -> Result<YamlConfigManager, ConfigError> {
        let defaults = Builtins::default();
        let builtins = Builtins {
            serializer: self.serializer.unwrap_or(defaults.serializer),
            lock_backend: self.lock_backend.unwrap_or(defaults.lock_backend),
            validator: self.validator.unwrap_or(defaults.validator),
        };

        let mut manager = YamlConfigManager::unbound(ConfigMap::new(), builtins);
        manager.wait_max = self.wait_max.unwrap_or_else(|| self.settings.wait_max());
        manager.settings = self.settings;

        manager.schema = match (self.schema, self.schema_source) {
            (Some(schema), _) => Some(schema),
            (None, Some(source)) => Some(load_schema(&source).await?),
            (None, None) => None,
        };

        match self.filepath {
            Some(path) => {
                if self.yaml_data.is_some() {
                    warn!("已绑定配置文件, 忽略 yaml_data");
                }
                manager.filepath = Some(absolutize(&path)?);
                manager.load_initial().await?;
            }
            None => {
                if let Some(text) = self.yaml_data {
                    manager.data = manager.serializer.parse(&text)?;
                }
                if manager.settings.locked {
                    warn!("未绑定配置文件, 忽略 locked 设置");
                }
            }
        }

        if let Some(entries) = self.entries {
            manager.update(entries);
        }

        if manager.schema.is_some() {
            manager.validate(None, false)?;
        }

        info!(
            "配置管理器已创建: id={}, 文件={:?}, 配置项={}",
            manager.id,
            manager.filepath,
            manager.data.len()
        );
        Ok(manager)
    }
}

impl YamlConfigManager {
    /// 构造时加载绑定的文件
    async fn load_initial(&mut self) -> Result<(), ConfigError> {
        let Some(path) = self.filepath.clone() else {
            return Ok(());
        };

        let transient = if self.settings.locked {
            self.lock().await?;
            false
        } else if self.settings.skip_read_lock {
            false
        } else {
            self.enter_scope(ScopeMode::Read).await? == ScopeExit::Release
        };

        let loaded = match self.read_file(&path).await {
            Ok(data) => Ok(data),
            Err(ConfigError::FileNotFound { .. }) if self.settings.create_file => {
                info!("配置文件不存在, 创建空文件: {}", path.display());
                self.write_atomic(&path, &ConfigMap::new())
                    .await
                    .map(|()| ConfigMap::new())
            }
            Err(e) => Err(e),
        };

        if transient {
            let released = self.exit_scope(ScopeExit::Release).await;
            self.data = loaded?;
            released?;
        } else {
            self.data = loaded?;
        }
        debug!("已加载配置文件: {} ({} 项)", path.display(), self.data.len());
        Ok(())
    }
}

async fn load_schema(source: &Path) -> Result<ConfigValue, ConfigError> {
    let path = absolutize(source)?;
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound { path })
        }
        Err(e) => return Err(e.into()),
    };
    let schema = YamlSerializer::new()
        .parse(&text)
        .map_err(|e| e.with_path(&path))?;
    debug!("已加载配置模式: {}", path.display());
    Ok(ConfigValue::Object(schema))
}
