//! 配置数据模型与管理器设置

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 配置值
pub type ConfigValue = serde_json::Value;

/// 有序的字符串键映射
///
/// 依赖 `serde_json` 的 `preserve_order` 特性保持插入顺序，
/// 所有键在加载时已被规范化为字符串。
pub type ConfigMap = serde_json::Map<String, ConfigValue>;

/// 锁文件名前缀，锁文件位于目标文件同一目录下：`<dir>/lock.<basename>`
pub const LOCK_PREFIX: &str = "lock.";

/// 默认的最长等锁时间（秒）
pub const DEFAULT_WAIT_TIME_SECS: f64 = 60.0;

/// 配置管理器设置
///
/// 可以直接从配置文件反序列化，字段缺省时使用默认值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigManagerSettings {
    /// 获取文件锁的最长等待时间（秒，可带小数），0 表示只尝试一次
    pub wait_max_secs: f64,
    /// 只读文件系统上无法创建锁文件时是否报错
    pub strict_ro_locks: bool,
    /// 加载文件时是否跳过临时读锁
    pub skip_read_lock: bool,
    /// 每次写入前是否按模式验证
    pub validate_on_write: bool,
    /// 文件不存在时是否创建空文件
    pub create_file: bool,
    /// 构造时是否直接持有写锁
    pub locked: bool,
}

impl ConfigManagerSettings {
    /// 最长等锁时间
    ///
    /// 负数和 NaN 按 0 处理，超出 [`Duration`] 范围时取最大值。
    pub fn wait_max(&self) -> Duration {
        Duration::try_from_secs_f64(self.wait_max_secs).unwrap_or(if self.wait_max_secs > 0.0 {
            Duration::MAX
        } else {
            Duration::ZERO
        })
    }
}

impl Default for ConfigManagerSettings {
    fn default() -> Self {
        Self {
            wait_max_secs: DEFAULT_WAIT_TIME_SECS,
            strict_ro_locks: false,
            skip_read_lock: false,
            validate_on_write: false,
            create_file: false,
            locked: false,
        }
    }
}

/// 将配置映射绑定到具体类型
pub fn bind<T>(map: &ConfigMap) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(ConfigValue::Object(map.clone())).map_err(|e| {
        ConfigError::SerializationError {
            message: e.to_string(),
        }
    })
}
