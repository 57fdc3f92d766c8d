//! 配置序列化器实现

use config_abstractions::ConfigSerializer;
use infrastructure_common::{ConfigError, ConfigMap, ConfigValue};
use serde_json::Number;
use tracing::debug;

/// YAML 序列化器
///
/// 解析使用未经修改的 `serde_yaml`，随后对结果做一次递归的键规范化：
/// 数字、布尔和空键全部转换为它们在文本中的字符串形式。
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlSerializer;

impl YamlSerializer {
    /// 创建新的 YAML 序列化器
    pub fn new() -> Self {
        Self
    }
}

impl ConfigSerializer for YamlSerializer {
    fn parse(&self, text: &str) -> Result<ConfigMap, ConfigError> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| ConfigError::malformed(None, e.to_string()))?;
        value
            .apply_merge()
            .map_err(|e| ConfigError::malformed(None, e.to_string()))?;

        match yaml_to_config(value)? {
            ConfigValue::Object(map) => Ok(map),
            // 空文档视为空映射
            ConfigValue::Null => Ok(ConfigMap::new()),
            other => Err(ConfigError::malformed(
                None,
                format!("顶层必须是映射, 实际为: {}", value_kind(&other)),
            )),
        }
    }

    fn dump(&self, map: &ConfigMap) -> Result<String, ConfigError> {
        serde_yaml::to_string(map).map_err(|e| ConfigError::SerializationError {
            message: e.to_string(),
        })
    }

    fn name(&self) -> &str {
        "YamlSerializer"
    }

    fn file_extension(&self) -> &str {
        "yaml"
    }
}

/// JSON 序列化器
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// 创建新的 JSON 序列化器
    pub fn new() -> Self {
        Self
    }
}

impl ConfigSerializer for JsonSerializer {
    fn parse(&self, text: &str) -> Result<ConfigMap, ConfigError> {
        if text.trim().is_empty() {
            return Ok(ConfigMap::new());
        }
        match serde_json::from_str::<ConfigValue>(text)
            .map_err(|e| ConfigError::malformed(None, e.to_string()))?
        {
            ConfigValue::Object(map) => Ok(map),
            ConfigValue::Null => Ok(ConfigMap::new()),
            other => Err(ConfigError::malformed(
                None,
                format!("顶层必须是对象, 实际为: {}", value_kind(&other)),
            )),
        }
    }

    fn dump(&self, map: &ConfigMap) -> Result<String, ConfigError> {
        let mut text =
            serde_json::to_string_pretty(map).map_err(|e| ConfigError::SerializationError {
                message: e.to_string(),
            })?;
        text.push('\n');
        Ok(text)
    }

    fn name(&self) -> &str {
        "JsonSerializer"
    }

    fn file_extension(&self) -> &str {
        "json"
    }
}

/// 将 YAML 值转换为配置值，同时把所有映射键规范化为字符串
pub fn yaml_to_config(value: serde_yaml::Value) -> Result<ConfigValue, ConfigError> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => ConfigValue::Null,
        Yaml::Bool(b) => ConfigValue::Bool(b),
        Yaml::Number(n) => yaml_number(&n),
        Yaml::String(s) => ConfigValue::String(s),
        Yaml::Sequence(seq) => ConfigValue::Array(
            seq.into_iter()
                .map(yaml_to_config)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = ConfigMap::new();
            for (key, value) in mapping {
                map.insert(normalize_key(key)?, yaml_to_config(value)?);
            }
            ConfigValue::Object(map)
        }
        Yaml::Tagged(tagged) => {
            debug!("忽略 YAML 标签: {}", tagged.tag);
            yaml_to_config(tagged.value)?
        }
    })
}

fn normalize_key(key: serde_yaml::Value) -> Result<String, ConfigError> {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Null => Ok("null".to_string()),
        Yaml::Tagged(tagged) => normalize_key(tagged.value),
        Yaml::Sequence(_) | Yaml::Mapping(_) => Err(ConfigError::malformed(
            None,
            "映射键必须是标量",
        )),
    }
}

fn yaml_number(n: &serde_yaml::Number) -> ConfigValue {
    if let Some(i) = n.as_i64() {
        ConfigValue::Number(Number::from(i))
    } else if let Some(u) = n.as_u64() {
        ConfigValue::Number(Number::from(u))
    } else {
        n.as_f64()
            .and_then(Number::from_f64)
            .map(ConfigValue::Number)
            // NaN 和无穷大无法用 JSON 数字表示
            .unwrap_or_else(|| ConfigValue::String(n.to_string()))
    }
}

fn value_kind(value: &ConfigValue) -> &'static str {
    match value {
        ConfigValue::Null => "null",
        ConfigValue::Bool(_) => "boolean",
        ConfigValue::Number(_) => "number",
        ConfigValue::String(_) => "string",
        ConfigValue::Array(_) => "sequence",
        ConfigValue::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrastructure_common::ConfigErrorKind;
    use serde_json::json;

    #[test]
    fn test_numeric_keys_become_strings() {
        let text = "2: second\n3.14: pi\n\"4\": four_string\ntext: regular_value\n";
        let map = YamlSerializer.parse(text).unwrap();

        assert_eq!(map.get("2"), Some(&json!("second")));
        assert_eq!(map.get("3.14"), Some(&json!("pi")));
        assert_eq!(map.get("4"), Some(&json!("four_string")));
        assert_eq!(map.get("text"), Some(&json!("regular_value")));
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_nested_keys_are_normalized() {
        let text = "outer:\n  1: one\n  true: yes_key\n  ~: nothing\n  inner:\n    2.5: deep\n";
        let map = YamlSerializer.parse(text).unwrap();
        let outer = map["outer"].as_object().unwrap();

        assert_eq!(outer["1"], json!("one"));
        assert_eq!(outer["true"], json!("yes_key"));
        assert_eq!(outer["null"], json!("nothing"));
        assert_eq!(outer["inner"]["2.5"], json!("deep"));
    }

    #[test]
    fn test_values_keep_their_types() {
        let map = YamlSerializer
            .parse("int: 3\nfloat: 2.5\nflag: true\nnone: null\nlist: [1, a]\n")
            .unwrap();
        assert_eq!(map["int"], json!(3));
        assert_eq!(map["float"], json!(2.5));
        assert_eq!(map["flag"], json!(true));
        assert_eq!(map["none"], json!(null));
        assert_eq!(map["list"], json!([1, "a"]));
    }

    #[test]
    fn test_round_trip_preserves_numeric_looking_keys() {
        let map: ConfigMap = serde_json::from_value(json!({
            "2": "second",
            "3.14": "pi",
            "nested": { "10": [1, 2.5, "x", null, true], "empty": {} },
            "quoted": "42"
        }))
        .unwrap();

        let text = YamlSerializer.dump(&map).unwrap();
        let parsed = YamlSerializer.parse(&text).unwrap();
        assert_eq!(parsed, map);
        assert_eq!(parsed["quoted"], json!("42"));
    }

    #[test]
    fn test_empty_map_renders_explicit_object() {
        assert_eq!(YamlSerializer.dump(&ConfigMap::new()).unwrap().trim(), "{}");
        assert_eq!(JsonSerializer.dump(&ConfigMap::new()).unwrap().trim(), "{}");
    }

    #[test]
    fn test_empty_document_is_empty_map() {
        assert!(YamlSerializer.parse("").unwrap().is_empty());
        assert!(YamlSerializer.parse("# only a comment\n").unwrap().is_empty());
        assert!(JsonSerializer.parse("  ").unwrap().is_empty());
    }

    #[test]
    fn test_non_mapping_top_level_is_malformed() {
        let err = YamlSerializer.parse("- a\n- b\n").unwrap_err();
        assert_eq!(err.kind(), ConfigErrorKind::MalformedDocument);

        let err = YamlSerializer.parse("key: [unclosed\n").unwrap_err();
        assert_eq!(err.kind(), ConfigErrorKind::MalformedDocument);

        let err = JsonSerializer.parse("[1, 2]").unwrap_err();
        assert_eq!(err.kind(), ConfigErrorKind::MalformedDocument);
    }

    #[test]
    fn test_merge_keys_are_applied() {
        let text = "base: &base\n  host: localhost\n  port: 1\nprod:\n  <<: *base\n  port: 2\n";
        let map = YamlSerializer.parse(text).unwrap();
        assert_eq!(map["prod"], json!({ "host": "localhost", "port": 2 }));
    }

    #[test]
    fn test_json_serializer_round_trip() {
        let map: ConfigMap = serde_json::from_value(json!({ "b": 1, "a": { "c": [true] } })).unwrap();
        let text = JsonSerializer.dump(&map).unwrap();
        assert_eq!(JsonSerializer.parse(&text).unwrap(), map);
    }
}
