//! 模式验证抽象接口

use infrastructure_common::{ConfigValue, ValidationError};

/// 模式验证器 trait
///
/// 按给定模式验证整份配置数据。模式本身也是一个 [`ConfigValue`]，通常从 YAML
/// 文件加载。
pub trait SchemaValidator: Send + Sync + std::fmt::Debug {
    /// 验证配置
    fn validate(&self, data: &ConfigValue, schema: &ConfigValue) -> ValidationReport;

    /// 获取验证器名称
    fn name(&self) -> &str;

    /// 获取验证器版本
    fn version(&self) -> &str {
        "1.0.0"
    }
}

/// 验证报告
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// 是否验证通过
    pub is_valid: bool,
    /// 验证错误列表
    pub errors: Vec<ValidationError>,
    /// 检查过的节点数量
    pub validated_count: usize,
    /// 验证耗时
    pub duration: std::time::Duration,
    /// 验证时间
    pub validated_at: chrono::DateTime<chrono::Utc>,
}

impl ValidationReport {
    /// 创建成功的验证报告
    pub fn success() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            validated_count: 0,
            duration: std::time::Duration::ZERO,
            validated_at: chrono::Utc::now(),
        }
    }

    /// 创建失败的验证报告
    pub fn failure(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            ..Self::success()
        }
    }

    /// 添加错误
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
        self.is_valid = false;
    }

    /// 合并验证报告
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.validated_count += other.validated_count;

        if !other.is_valid {
            self.is_valid = false;
        }
    }

    /// 第一条错误的描述，作为汇总信息
    pub fn summary(&self) -> String {
        match self.errors.first() {
            Some(first) if self.errors.len() > 1 => {
                format!("{} (另有 {} 个错误)", first, self.errors.len() - 1)
            }
            Some(first) => first.to_string(),
            None => "验证通过".to_string(),
        }
    }
}
