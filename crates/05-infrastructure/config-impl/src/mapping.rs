//! 配置映射的合并与展开

use infrastructure_common::{ConfigMap, ConfigValue};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};

/// 环境变量引用：`$NAME` 或 `${NAME}`
static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("环境变量正则表达式无效")
});

/// 深度合并：把 `overlay` 递归合并进 `base`
///
/// 对 `overlay` 中的每个键：若其值是非空映射，则与 `base` 中同名映射递归合并
/// （`base` 中没有映射时以空映射为起点）；否则直接覆盖 `base` 中的值。
/// 只存在于 `base` 中的键保持不变。
pub fn deep_update(base: &mut ConfigMap, overlay: ConfigMap) {
    for (key, value) in overlay {
        match value {
            ConfigValue::Object(nested) if !nested.is_empty() => {
                let slot = base
                    .entry(key)
                    .or_insert_with(|| ConfigValue::Object(ConfigMap::new()));
                if !slot.is_object() {
                    *slot = ConfigValue::Object(ConfigMap::new());
                }
                if let ConfigValue::Object(target) = slot {
                    deep_update(target, nested);
                }
            }
            other => {
                base.insert(key, other);
            }
        }
    }
}

/// 返回展开了环境变量和用户主目录的新映射，原映射不变
pub fn expand_map(map: &ConfigMap) -> ConfigMap {
    map.iter()
        .map(|(key, value)| (key.clone(), expand_value(value)))
        .collect()
}

/// 递归展开配置值中的所有字符串
pub fn expand_value(value: &ConfigValue) -> ConfigValue {
    match value {
        ConfigValue::String(s) => ConfigValue::String(expand_path(s).into_owned()),
        ConfigValue::Array(items) => ConfigValue::Array(items.iter().map(expand_value).collect()),
        ConfigValue::Object(map) => ConfigValue::Object(expand_map(map)),
        other => other.clone(),
    }
}

/// 展开字符串中的 `~` 与环境变量引用
///
/// 无法解析的引用原样保留。
pub fn expand_path(text: &str) -> Cow<'_, str> {
    let home_expanded = expand_user(text);
    if !home_expanded.contains('$') {
        return home_expanded;
    }

    let replaced = ENV_VAR_PATTERN.replace_all(&home_expanded, |caps: &Captures<'_>| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
    });
    Cow::Owned(replaced.into_owned())
}

/// 展开路径中的 `~` 与环境变量，并转换为绝对路径
///
/// 相对路径基于当前工作目录，不要求路径存在。
pub fn absolutize(path: &Path) -> io::Result<PathBuf> {
    let expanded = PathBuf::from(expand_path(&path.to_string_lossy()).as_ref());
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(std::env::current_dir()?.join(expanded))
    }
}

fn expand_user(text: &str) -> Cow<'_, str> {
    let rest = match text.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => rest,
        _ => return Cow::Borrowed(text),
    };
    match dirs::home_dir() {
        Some(home) => Cow::Owned(format!("{}{}", home.display(), rest)),
        None => Cow::Borrowed(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: ConfigValue) -> ConfigMap {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_deep_update_merges_nested_maps() {
        let mut base = map(json!({
            "db": { "host": "localhost", "port": 5432 },
            "keep": "me"
        }));
        deep_update(&mut base, map(json!({ "db": { "port": 6543, "user": "admin" } })));

        assert_eq!(
            ConfigValue::Object(base),
            json!({
                "db": { "host": "localhost", "port": 6543, "user": "admin" },
                "keep": "me"
            })
        );
    }

    #[test]
    fn test_deep_update_replaces_across_kinds() {
        let mut base = map(json!({ "a": { "x": 1 }, "b": 2, "c": { "y": 1 } }));
        deep_update(
            &mut base,
            map(json!({ "a": "scalar", "b": { "z": 3 }, "c": {} })),
        );

        assert_eq!(base["a"], json!("scalar"));
        assert_eq!(base["b"], json!({ "z": 3 }));
        // 空映射直接覆盖
        assert_eq!(base["c"], json!({}));
    }

    #[test]
    fn test_expand_leaves_original_untouched() {
        std::env::set_var("CONFIG_IMPL_EXPAND_TEST", "/opt/data");
        let original = map(json!({
            "path": "$CONFIG_IMPL_EXPAND_TEST/file",
            "braced": "${CONFIG_IMPL_EXPAND_TEST}/x",
            "nested": { "list": ["$CONFIG_IMPL_EXPAND_TEST", 1] },
            "missing": "$CONFIG_IMPL_SURELY_UNSET_VAR/y",
            "number": 5
        }));

        let expanded = expand_map(&original);
        assert_eq!(expanded["path"], json!("/opt/data/file"));
        assert_eq!(expanded["braced"], json!("/opt/data/x"));
        assert_eq!(expanded["nested"]["list"], json!(["/opt/data", 1]));
        assert_eq!(expanded["missing"], json!("$CONFIG_IMPL_SURELY_UNSET_VAR/y"));
        assert_eq!(expanded["number"], json!(5));
        assert_eq!(original["path"], json!("$CONFIG_IMPL_EXPAND_TEST/file"));
    }

    #[test]
    fn test_expand_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(
            expand_path("~/configs/app.yaml"),
            format!("{}/configs/app.yaml", home.display())
        );
        assert_eq!(expand_path("~user/x"), "~user/x");
        assert_eq!(expand_path("plain"), "plain");
    }

    #[test]
    fn test_absolutize_relative_path() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolutize(Path::new("conf/app.yaml")).unwrap(), cwd.join("conf/app.yaml"));
        assert_eq!(absolutize(Path::new("/etc/app.yaml")).unwrap(), PathBuf::from("/etc/app.yaml"));
    }
}
