//! # Configuration Abstractions
//!
//! 文件配置管理的抽象层，定义各组件之间的接缝。
//!
//! ## 核心接口
//!
//! - [`ConfigStore`] - 配置映射协议
//! - [`ConfigSerializer`] - 配置序列化接口
//! - [`LockBackend`] - 进程间文件锁接口
//! - [`SchemaValidator`] - 模式验证接口

pub mod lock;
pub mod serializer;
pub mod store;
pub mod validator;

pub use lock::*;
pub use serializer::*;
pub use store::*;
pub use validator::*;
