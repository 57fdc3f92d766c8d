//! 配置映射协议

use infrastructure_common::{ConfigError, ConfigMap, ConfigValue};

/// 配置存储 trait
///
/// 配置管理器和别名装饰器共享的映射协议。只有 [`data`](ConfigStore::data) 和
/// [`data_mut`](ConfigStore::data_mut) 是必须实现的，其余方法按字面键操作；
/// 需要别名解析的实现会覆盖它们。
pub trait ConfigStore {
    /// 获取底层配置数据
    fn data(&self) -> &ConfigMap;

    /// 获取可变的底层配置数据
    fn data_mut(&mut self) -> &mut ConfigMap;

    /// 获取配置值
    fn get(&self, key: &str) -> Result<&ConfigValue, ConfigError> {
        self.data()
            .get(key)
            .ok_or_else(|| ConfigError::key_not_found(key))
    }

    /// 获取可变配置值
    fn get_mut(&mut self, key: &str) -> Result<&mut ConfigValue, ConfigError> {
        self.data_mut()
            .get_mut(key)
            .ok_or_else(|| ConfigError::key_not_found(key))
    }

    /// 插入配置值，返回旧值
    fn insert(&mut self, key: String, value: ConfigValue) -> Option<ConfigValue> {
        self.data_mut().insert(key, value)
    }

    /// 删除配置项
    fn remove(&mut self, key: &str) -> Result<ConfigValue, ConfigError> {
        self.data_mut()
            .remove(key)
            .ok_or_else(|| ConfigError::key_not_found(key))
    }

    /// 检查配置键是否存在
    fn contains_key(&self, key: &str) -> bool {
        self.data().contains_key(key)
    }

    /// 获取所有顶层键
    fn keys(&self) -> serde_json::map::Keys<'_> {
        self.data().keys()
    }

    /// 遍历顶层键值对
    fn iter(&self) -> serde_json::map::Iter<'_> {
        self.data().iter()
    }

    /// 顶层配置项数量
    fn len(&self) -> usize {
        self.data().len()
    }

    /// 是否没有任何配置项
    fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// 浅层更新：用 `entries` 的顶层键覆盖当前数据
    fn update(&mut self, entries: ConfigMap) {
        let data = self.data_mut();
        for (key, value) in entries {
            data.insert(key, value);
        }
    }
}

impl ConfigStore for ConfigMap {
    fn data(&self) -> &ConfigMap {
        self
    }

    fn data_mut(&mut self) -> &mut ConfigMap {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrastructure_common::ConfigErrorKind;
    use serde_json::json;

    #[test]
    fn test_map_protocol_on_plain_map() {
        let mut map = ConfigMap::new();
        assert!(ConfigStore::is_empty(&map));

        ConfigStore::insert(&mut map, "a".to_string(), json!(1));
        map.update(serde_json::from_value(json!({ "b": 2, "a": 3 })).unwrap());

        assert_eq!(ConfigStore::len(&map), 2);
        assert_eq!(ConfigStore::get(&map, "a").unwrap(), &json!(3));
        assert_eq!(ConfigStore::keys(&map).cloned().collect::<Vec<_>>(), ["a", "b"]);

        let err = ConfigStore::remove(&mut map, "zzz").unwrap_err();
        assert_eq!(err.kind(), ConfigErrorKind::KeyNotFound);
        assert_eq!(ConfigStore::remove(&mut map, "b").unwrap(), json!(2));
        assert!(!ConfigStore::contains_key(&map, "b"));
    }
}
