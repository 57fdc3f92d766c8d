//! 支持别名的配置管理器
//!
//! [`AliasedYamlConfigManager`] 包装一个 [`YamlConfigManager`]，查找和删除键时
//! 先按字面键匹配，未命中再把参数当作别名解析为规范键。别名只存在于内存中，
//! 不会写入配置文件。

use crate::manager::{Lockable, YamlConfigManager};
use config_abstractions::ConfigStore;
use infrastructure_common::{ConfigError, ConfigMap, ConfigValue};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use tracing::{debug, warn};

/// 根据配置管理器计算别名映射的函数
pub type AliasFn = Box<dyn Fn(&YamlConfigManager) -> Result<ConfigValue, String> + Send + Sync>;

/// 别名来源
///
/// 两种来源都必须给出 “规范键 → 别名” 的映射，别名可以是单个字符串或字符串列表。
pub enum AliasSource {
    /// 静态映射
    Static(ConfigValue),
    /// 构造时根据已加载的配置计算
    Computed(AliasFn),
}

impl std::fmt::Debug for AliasSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// 别名输入无效时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AliasStrictness {
    /// 返回 [`ConfigError::AliasInputError`]
    Raise,
    /// 记录警告并在没有别名的情况下继续
    #[default]
    Warn,
    /// 只记录调试日志
    Log,
}

/// 别名管理器选项
#[derive(Debug, Default)]
pub struct AliasOptions {
    /// 别名来源
    pub source: Option<AliasSource>,
    /// 输入无效时的处理方式
    pub strictness: AliasStrictness,
    /// 为 `true` 时忽略别名来源
    pub exact: bool,
}

/// 支持别名的配置管理器
#[derive(Debug)]
pub struct AliasedYamlConfigManager {
    inner: YamlConfigManager,
    /// 别名 → 规范键
    aliases: HashMap<String, String>,
}

impl AliasedYamlConfigManager {
    /// 使用给定的别名来源包装配置管理器
    pub fn new(inner: YamlConfigManager, source: AliasSource) -> Result<Self, ConfigError> {
        Self::with_options(
            inner,
            AliasOptions {
                source: Some(source),
                ..AliasOptions::default()
            },
        )
    }

    /// 包装配置管理器，不定义任何别名
    pub fn without_aliases(inner: YamlConfigManager) -> Self {
        Self {
            inner,
            aliases: HashMap::new(),
        }
    }

    /// 按选项包装配置管理器
    pub fn with_options(inner: YamlConfigManager, options: AliasOptions) -> Result<Self, ConfigError> {
        let source = match options.source {
            Some(_) if options.exact => {
                debug!("exact 模式, 忽略别名来源");
                None
            }
            other => other,
        };

        let aliases = match source {
            None => HashMap::new(),
            Some(source) => match build_alias_index(&inner, source) {
                Ok(aliases) => aliases,
                Err(message) => match options.strictness {
                    AliasStrictness::Raise => {
                        return Err(ConfigError::AliasInputError { message })
                    }
                    AliasStrictness::Warn => {
                        warn!("别名输入无效, 不使用别名: {}", message);
                        HashMap::new()
                    }
                    AliasStrictness::Log => {
                        debug!("别名输入无效, 不使用别名: {}", message);
                        HashMap::new()
                    }
                },
            },
        };

        debug!("已加载 {} 个别名", aliases.len());
        Ok(Self { inner, aliases })
    }

    /// 底层配置管理器
    pub fn inner(&self) -> &YamlConfigManager {
        &self.inner
    }

    /// 拆出底层配置管理器，丢弃别名
    pub fn into_inner(self) -> YamlConfigManager {
        self.inner
    }

    /// 别名 → 规范键映射
    pub fn alias_map(&self) -> &HashMap<String, String> {
        &self.aliases
    }

    /// 把别名解析为规范键
    pub fn resolve_alias(&self, alias: &str) -> Result<&str, ConfigError> {
        self.aliases
            .get(alias)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::undefined_alias(alias))
    }

    /// 获取键的全部别名（已排序）
    pub fn get_aliases(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        let mut aliases: Vec<String> = self
            .aliases
            .iter()
            .filter(|(_, target)| target.as_str() == key)
            .map(|(alias, _)| alias.clone())
            .collect();
        if aliases.is_empty() {
            return Err(ConfigError::undefined_alias(key));
        }
        aliases.sort();
        Ok(aliases)
    }

    /// 为键设置别名
    ///
    /// 已指向其他键的别名只有在 `overwrite` 为 `true` 时才会被改指；`reset_key`
    /// 为 `true` 时先移除该键原有的全部别名。返回 `(新设置的别名, 被移除的别名)`。
    pub fn set_aliases<I, S>(
        &mut self,
        key: &str,
        aliases: I,
        overwrite: bool,
        reset_key: bool,
    ) -> (Vec<String>, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut removed = if reset_key {
            self.remove_aliases(key, None)
        } else {
            Vec::new()
        };

        let mut set = Vec::new();
        for alias in aliases {
            let alias = alias.into();
            match self.aliases.get(&alias) {
                Some(current) if current == key => continue,
                Some(current) if !overwrite => {
                    debug!("别名 '{}' 已指向 '{}', 不覆盖", alias, current);
                    continue;
                }
                Some(current) => {
                    debug!("别名 '{}' 从 '{}' 改指到 '{}'", alias, current, key);
                    removed.push(alias.clone());
                }
                None => {}
            }
            self.aliases.insert(alias.clone(), key.to_string());
            set.push(alias);
        }

        debug!("为 '{}' 设置别名: {:?}, 移除: {:?}", key, set, removed);
        (set, removed)
    }

    /// 移除键的别名，`aliases` 为 `None` 时移除全部；返回实际移除的别名
    pub fn remove_aliases(&mut self, key: &str, aliases: Option<&[&str]>) -> Vec<String> {
        let mut removed: Vec<String> = match aliases {
            Some(aliases) => aliases
                .iter()
                .filter(|alias| self.aliases.get(**alias).is_some_and(|k| k == key))
                .map(|alias| alias.to_string())
                .collect(),
            None => self
                .aliases
                .iter()
                .filter(|(_, target)| target.as_str() == key)
                .map(|(alias, _)| alias.clone())
                .collect(),
        };
        for alias in &removed {
            self.aliases.remove(alias);
        }
        removed.sort();
        removed
    }

    fn canonical_key<'a>(&'a self, key: &'a str) -> &'a str {
        if self.inner.data().contains_key(key) {
            return key;
        }
        self.aliases.get(key).map(String::as_str).unwrap_or(key)
    }
}

fn build_alias_index(
    manager: &YamlConfigManager,
    source: AliasSource,
) -> Result<HashMap<String, String>, String> {
    let value = match source {
        AliasSource::Static(value) => value,
        AliasSource::Computed(compute) => {
            compute(manager).map_err(|e| format!("计算别名失败: {}", e))?
        }
    };

    let mapping = match value {
        ConfigValue::Object(mapping) => mapping,
        other => return Err(format!("别名必须是映射, 实际为: {}", other)),
    };

    let mut index = HashMap::new();
    for (key, entry) in mapping {
        let aliases: Vec<String> = match entry {
            ConfigValue::String(alias) => vec![alias],
            ConfigValue::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    ConfigValue::String(alias) => Ok(alias),
                    other => Err(format!("键 '{}' 的别名必须是字符串, 实际为: {}", key, other)),
                })
                .collect::<Result<_, _>>()?,
            other => {
                return Err(format!(
                    "键 '{}' 的别名必须是字符串或字符串列表, 实际为: {}",
                    key, other
                ))
            }
        };

        for alias in aliases {
            if let Some(previous) = index.insert(alias.clone(), key.clone()) {
                return Err(format!(
                    "别名 '{}' 同时指向 '{}' 和 '{}'",
                    alias, previous, key
                ));
            }
        }
    }
    Ok(index)
}

impl ConfigStore for AliasedYamlConfigManager {
    fn data(&self) -> &ConfigMap {
        self.inner.data()
    }

    fn data_mut(&mut self) -> &mut ConfigMap {
        self.inner.data_mut()
    }

    fn get(&self, key: &str) -> Result<&ConfigValue, ConfigError> {
        let canonical = self.canonical_key(key);
        self.inner
            .data()
            .get(canonical)
            .ok_or_else(|| ConfigError::key_not_found(key))
    }

    fn get_mut(&mut self, key: &str) -> Result<&mut ConfigValue, ConfigError> {
        let canonical = self.canonical_key(key).to_string();
        self.inner
            .data_mut()
            .get_mut(&canonical)
            .ok_or_else(|| ConfigError::key_not_found(key))
    }

    fn remove(&mut self, key: &str) -> Result<ConfigValue, ConfigError> {
        let canonical = self.canonical_key(key).to_string();
        self.inner
            .data_mut()
            .remove(&canonical)
            .ok_or_else(|| ConfigError::key_not_found(key))
    }

    fn contains_key(&self, key: &str) -> bool {
        self.inner.data().contains_key(self.canonical_key(key))
    }
}

impl Lockable for AliasedYamlConfigManager {
    fn manager(&self) -> &YamlConfigManager {
        &self.inner
    }

    fn manager_mut(&mut self) -> &mut YamlConfigManager {
        &mut self.inner
    }
}

impl Deref for AliasedYamlConfigManager {
    type Target = YamlConfigManager;

    fn deref(&self) -> &YamlConfigManager {
        &self.inner
    }
}

impl DerefMut for AliasedYamlConfigManager {
    fn deref_mut(&mut self) -> &mut YamlConfigManager {
        &mut self.inner
    }
}
