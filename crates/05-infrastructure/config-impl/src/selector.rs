//! 配置文件选择

use crate::mapping::absolutize;
use infrastructure_common::ConfigError;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// 配置文件选择选项
#[derive(Debug, Clone)]
pub struct SelectConfigOptions {
    /// 显式指定的文件路径，最高优先级
    pub config_filepath: Option<PathBuf>,
    /// 按顺序检查的环境变量名
    pub config_env_vars: Vec<String>,
    /// 其他方式都没有结果时使用的默认路径
    pub default_config_filepath: Option<PathBuf>,
    /// 是否要求选中的路径是已存在的文件
    pub check_exist: bool,
    /// 第一个已设置的环境变量指向不存在的文件时是否报错
    pub strict_env: bool,
}

impl Default for SelectConfigOptions {
    fn default() -> Self {
        Self {
            config_filepath: None,
            config_env_vars: Vec::new(),
            default_config_filepath: None,
            check_exist: true,
            strict_env: false,
        }
    }
}

impl SelectConfigOptions {
    /// 显式指定文件路径
    pub fn with_filepath(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_filepath = Some(path.into());
        self
    }

    /// 追加一个候选环境变量
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.config_env_vars.push(name.into());
        self
    }

    /// 设置默认路径
    pub fn with_default(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_config_filepath = Some(path.into());
        self
    }
}

/// 选择要加载的配置文件
///
/// 优先级：显式路径 > 第一个已设置的环境变量 > 默认路径。都没有时返回 `None`。
/// 返回的路径都是绝对路径。
pub fn select_config(options: &SelectConfigOptions) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = &options.config_filepath {
        let path = absolutize(path)?;
        if !options.check_exist || path.is_file() {
            debug!("使用显式指定的配置文件: {}", path.display());
            return Ok(Some(path));
        }
        error!("配置文件路径不是文件: {}", path.display());
        return Err(ConfigError::FileNotFound { path });
    }

    debug!("未显式指定配置文件");
    if let Some((name, value)) = first_set_env_var(&options.config_env_vars) {
        let candidate = absolutize(Path::new(&value))?;
        if !options.check_exist || candidate.is_file() {
            debug!("从环境变量 {} 找到配置文件: {}", name, candidate.display());
            return Ok(Some(candidate));
        }
        if options.strict_env {
            return Err(ConfigError::FileNotFound { path: candidate });
        }
        debug!(
            "环境变量 {} 指向的文件不存在: {}",
            name,
            candidate.display()
        );
    }

    info!(
        "使用默认配置, 环境变量中没有可用的配置文件: {:?}",
        options.config_env_vars
    );
    options
        .default_config_filepath
        .as_deref()
        .map(absolutize)
        .transpose()
        .map_err(ConfigError::from)
}

/// 返回第一个已设置且非空的环境变量
fn first_set_env_var(names: &[String]) -> Option<(String, String)> {
    names.iter().find_map(|name| match std::env::var(name) {
        Ok(value) if !value.is_empty() => Some((name.clone(), value)),
        _ => None,
    })
}
