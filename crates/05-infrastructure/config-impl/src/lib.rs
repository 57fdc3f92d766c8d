//! # Configuration Implementation
//!
//! 进程安全的 YAML 文件配置管理实现。
//!
//! ## 主要组件
//!
//! - [`YamlConfigManager`] - 绑定文件的配置管理器，负责锁状态和读写
//! - [`AliasedYamlConfigManager`] - 支持别名查找的配置管理器
//! - [`FileLockManager`] - 基于锁文件的进程间文件锁
//! - [`YamlSerializer`] / [`JsonSerializer`] - 配置序列化器
//! - [`JsonSchemaValidator`] - 基于 `jsonschema` 的模式验证器
//! - [`select_config`] - 按优先级选择配置文件

pub mod alias;
pub mod locking;
pub mod manager;
pub mod mapping;
pub mod selector;
pub mod serializers;
pub mod validation;

pub use alias::*;
pub use locking::*;
pub use manager::*;
pub use mapping::*;
pub use selector::*;
pub use serializers::*;
pub use validation::*;

#[cfg(test)]
mod tests;
