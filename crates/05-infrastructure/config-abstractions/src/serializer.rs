//! 配置序列化抽象接口

use infrastructure_common::{ConfigError, ConfigMap};

/// 配置序列化器 trait
///
/// 在文本与 [`ConfigMap`] 之间转换。实现必须保证 `parse` 的结果中所有键都是
/// 字符串形式（包括文本中看起来像数字的键），且顶层必须是映射。
pub trait ConfigSerializer: Send + Sync + std::fmt::Debug {
    /// 解析文本
    fn parse(&self, text: &str) -> Result<ConfigMap, ConfigError>;

    /// 序列化为文本，空映射必须输出显式的空对象
    fn dump(&self, map: &ConfigMap) -> Result<String, ConfigError>;

    /// 获取序列化器名称
    fn name(&self) -> &str;

    /// 文件扩展名
    fn file_extension(&self) -> &str;
}
