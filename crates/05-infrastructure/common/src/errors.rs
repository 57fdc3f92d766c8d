//! 错误类型定义

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// 配置错误类型
///
/// 所有变体都尽量携带出错的路径或键，调用方可以通过 [`ConfigError::kind`] 分支处理。
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("获取文件锁超时: {}, 已等待 {waited:?}", .path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("目标文件已被其他持有者锁定: {}", .path.display())]
    LockConflict { path: PathBuf },

    #[error("锁文件操作失败: {}, 原因: {source}", .path.display())]
    LockIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("操作 {operation} 需要先通过作用域锁锁定文件")]
    NotLocked { operation: &'static str },

    #[error("操作 {operation} 缺少可写入的文件路径")]
    MissingFilePath { operation: &'static str },

    #[error("配置文件不存在: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("配置文件读取失败: {source}")]
    FileReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("配置文档格式错误{}: {message}", display_path(.path))]
    MalformedDocument {
        path: Option<PathBuf>,
        message: String,
    },

    #[error("配置序列化失败: {message}")]
    SerializationError { message: String },

    #[error("配置验证失败: {message}")]
    ValidationFailure {
        message: String,
        errors: Vec<String>,
        instance: Option<Box<serde_json::Value>>,
    },

    #[error("别名未定义: {alias}")]
    UndefinedAlias { alias: String },

    #[error("配置键不存在: {key}")]
    KeyNotFound { key: String },

    #[error("别名输入无效: {message}")]
    AliasInputError { message: String },
}

/// 配置错误种类，便于调用方按类别分支
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigErrorKind {
    LockTimeout,
    LockConflict,
    LockIo,
    NotLocked,
    MissingFilePath,
    FileNotFound,
    Io,
    MalformedDocument,
    Serialization,
    ValidationFailure,
    UndefinedAlias,
    KeyNotFound,
    AliasInputError,
}

impl ConfigError {
    /// 获取错误种类
    pub fn kind(&self) -> ConfigErrorKind {
        match self {
            Self::LockTimeout { .. } => ConfigErrorKind::LockTimeout,
            Self::LockConflict { .. } => ConfigErrorKind::LockConflict,
            Self::LockIo { .. } => ConfigErrorKind::LockIo,
            Self::NotLocked { .. } => ConfigErrorKind::NotLocked,
            Self::MissingFilePath { .. } => ConfigErrorKind::MissingFilePath,
            Self::FileNotFound { .. } => ConfigErrorKind::FileNotFound,
            Self::FileReadError { .. } => ConfigErrorKind::Io,
            Self::MalformedDocument { .. } => ConfigErrorKind::MalformedDocument,
            Self::SerializationError { .. } => ConfigErrorKind::Serialization,
            Self::ValidationFailure { .. } => ConfigErrorKind::ValidationFailure,
            Self::UndefinedAlias { .. } => ConfigErrorKind::UndefinedAlias,
            Self::KeyNotFound { .. } => ConfigErrorKind::KeyNotFound,
            Self::AliasInputError { .. } => ConfigErrorKind::AliasInputError,
        }
    }

    /// 获取与错误相关的文件路径（如果有）
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::LockTimeout { path, .. }
            | Self::LockConflict { path }
            | Self::LockIo { path, .. }
            | Self::FileNotFound { path } => Some(path),
            Self::MalformedDocument { path, .. } => path.as_deref(),
            _ => None,
        }
    }

    /// 是否为查找未命中类错误（调用方通常可以回退到默认值）
    pub fn is_lookup_miss(&self) -> bool {
        matches!(
            self.kind(),
            ConfigErrorKind::KeyNotFound | ConfigErrorKind::UndefinedAlias
        )
    }

    /// 创建文档格式错误
    pub fn malformed(path: Option<&Path>, message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            path: path.map(Path::to_path_buf),
            message: message.into(),
        }
    }

    /// 为未携带路径的文档格式错误补充文件路径
    pub fn with_path(self, file: &Path) -> Self {
        match self {
            Self::MalformedDocument { path: None, message } => Self::MalformedDocument {
                path: Some(file.to_path_buf()),
                message,
            },
            other => other,
        }
    }

    /// 创建键不存在错误
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// 创建别名未定义错误
    pub fn undefined_alias(alias: impl Into<String>) -> Self {
        Self::UndefinedAlias {
            alias: alias.into(),
        }
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" ({})", p.display()))
        .unwrap_or_default()
}

/// 验证错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("验证失败: {message}")]
    ValidationFailed { message: String },

    #[error("必需字段缺失: {field_name}")]
    RequiredFieldMissing { field_name: String },

    #[error("字段值无效: {field_name}, 值: {value}, 原因: {reason}")]
    InvalidFieldValue {
        field_name: String,
        value: String,
        reason: String,
    },

    #[error("字段值超出范围: {field_name}, 值: {value}, 范围: {range}")]
    ValueOutOfRange {
        field_name: String,
        value: String,
        range: String,
    },

    #[error("验证模式无效: {message}")]
    InvalidSchema { message: String },
}

impl ValidationError {
    /// 创建新的验证错误
    pub fn new(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// 创建必需字段缺失错误
    pub fn required_field_missing(field_name: impl Into<String>) -> Self {
        Self::RequiredFieldMissing {
            field_name: field_name.into(),
        }
    }

    /// 创建字段值无效错误
    pub fn invalid_field_value(
        field_name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidFieldValue {
            field_name: field_name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 创建值超出范围错误
    pub fn value_out_of_range(
        field_name: impl Into<String>,
        value: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        Self::ValueOutOfRange {
            field_name: field_name.into(),
            value: value.into(),
            range: range.into(),
        }
    }

    /// 创建验证模式无效错误
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }
}
