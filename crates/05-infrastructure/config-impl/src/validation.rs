//! 模式验证器实现

use config_abstractions::{SchemaValidator, ValidationReport};
use infrastructure_common::{ConfigValue, ValidationError};
use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, JSONSchema};
use std::time::Instant;
use tracing::debug;

/// 基于 `jsonschema` 的验证器
///
/// 模式按 Draft 7 编译，编译失败时报告 [`ValidationError::InvalidSchema`]。
/// 每条违规按关键字映射为对应的 [`ValidationError`]，字段名使用 JSON Pointer
/// 形式的实例路径。
#[derive(Debug, Clone, Copy)]
pub struct JsonSchemaValidator {
    draft: Draft,
}

impl Default for JsonSchemaValidator {
    fn default() -> Self {
        Self {
            draft: Draft::Draft7,
        }
    }
}

impl JsonSchemaValidator {
    /// 创建新的验证器
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用指定的 Draft 版本
    pub fn with_draft(draft: Draft) -> Self {
        Self { draft }
    }
}

fn pointer_or_root(pointer: String) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer
    }
}

fn map_error(error: &jsonschema::ValidationError<'_>) -> ValidationError {
    let field = pointer_or_root(error.instance_path.to_string());
    let value = error.instance.to_string();

    match &error.kind {
        ValidationErrorKind::Required { property } => {
            let property = match serde_json::json!(property) {
                ConfigValue::String(name) => name,
                other => other.to_string(),
            };
            let field = format!("{}/{}", field.trim_end_matches('/'), property);
            ValidationError::required_field_missing(field)
        }
        ValidationErrorKind::Minimum { .. }
        | ValidationErrorKind::Maximum { .. }
        | ValidationErrorKind::ExclusiveMinimum { .. }
        | ValidationErrorKind::ExclusiveMaximum { .. }
        | ValidationErrorKind::MinItems { .. }
        | ValidationErrorKind::MaxItems { .. }
        | ValidationErrorKind::MinProperties { .. }
        | ValidationErrorKind::MaxProperties { .. } => {
            ValidationError::value_out_of_range(field, value, error.to_string())
        }
        ValidationErrorKind::Type { .. }
        | ValidationErrorKind::Enum { .. }
        | ValidationErrorKind::Constant { .. }
        | ValidationErrorKind::Pattern { .. }
        | ValidationErrorKind::MinLength { .. }
        | ValidationErrorKind::MaxLength { .. }
        | ValidationErrorKind::MultipleOf { .. }
        | ValidationErrorKind::AdditionalProperties { .. } => {
            ValidationError::invalid_field_value(field, value, error.to_string())
        }
        // 组合关键字 (anyOf、oneOf、not 等) 没有单一的字段原因
        _ => ValidationError::new(format!("{}: {}", field, error)),
    }
}

fn count_nodes(value: &ConfigValue) -> usize {
    1 + match value {
        ConfigValue::Array(items) => items.iter().map(count_nodes).sum(),
        ConfigValue::Object(map) => map.values().map(count_nodes).sum(),
        _ => 0,
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, data: &ConfigValue, schema: &ConfigValue) -> ValidationReport {
        let start = Instant::now();
        let mut report = ValidationReport::success();

        match JSONSchema::options().with_draft(self.draft).compile(schema) {
            Ok(compiled) => {
                report.validated_count = count_nodes(data);
                if let Err(errors) = compiled.validate(data) {
                    for error in errors {
                        report.add_error(map_error(&error));
                    }
                }
            }
            Err(e) => report.add_error(ValidationError::invalid_schema(format!(
                "模式编译失败: {}",
                e
            ))),
        }

        report.duration = start.elapsed();
        report.validated_at = chrono::Utc::now();

        debug!(
            "模式验证完成: 通过={}, 错误数={}, 检查节点={}, 耗时={:?}",
            report.is_valid,
            report.errors.len(),
            report.validated_count,
            report.duration
        );
        report
    }

    fn name(&self) -> &str {
        "JsonSchemaValidator"
    }
}
