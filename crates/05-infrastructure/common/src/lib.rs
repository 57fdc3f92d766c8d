//! # Infrastructure Common
//!
//! 文件配置管理的公共类型。
//!
//! ## 核心内容
//!
//! - [`ConfigError`] - 结构化的配置错误，附带 [`ConfigErrorKind`] 便于分支
//! - [`ValidationError`] - 模式验证错误
//! - [`ConfigMap`] - 有序的字符串键配置映射
//! - [`ConfigManagerSettings`] - 配置管理器的可序列化设置

pub mod configuration;
pub mod errors;

pub use configuration::*;
pub use errors::*;
