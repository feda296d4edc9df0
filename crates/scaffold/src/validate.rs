//! Whole-batch descriptor validation.
//!
//! Runs before any connection is made and collects every problem instead
//! of stopping at the first one, so an operator fixes the config in one go.

use crate::types::{DataType, ResourceDescriptor};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

/// Collection identifiers: lowercase snake case.
static RESOURCE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,62}$").expect("valid regex"));

/// Field identifiers: letters, digits, underscores; no leading digit.
static FIELD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid regex"));

/// A single validation problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Resource the issue belongs to.
    pub resource: String,
    /// Field, when the issue is field-scoped.
    pub field: Option<String>,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{}: {}", self.resource, field, self.message),
            None => write!(f, "{}: {}", self.resource, self.message),
        }
    }
}

/// Every issue found in a descriptor list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} descriptor issue(s):", self.issues.len())?;
        for issue in &self.issues {
            writeln!(f, "  - {issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    fn push(&mut self, resource: &str, field: Option<&str>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            resource: resource.to_string(),
            field: field.map(str::to_string),
            message: message.into(),
        });
    }
}

/// Validate a batch of descriptors.
///
/// `external` lists collections that already exist on the host and may be
/// used as relation targets without being part of the batch.
pub fn validate(
    descriptors: &[ResourceDescriptor],
    external: &[String],
) -> Result<(), ValidationReport> {
    let mut report = ValidationReport::default();

    let declared: HashSet<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
    let mut seen_resources = HashSet::new();

    for descriptor in descriptors {
        let name = descriptor.name.as_str();

        if !RESOURCE_NAME.is_match(name) {
            report.push(
                name,
                None,
                "name must be lowercase letters, digits and underscores, starting with a letter",
            );
        }
        if !seen_resources.insert(name) {
            report.push(name, None, "declared more than once");
        }
        if descriptor.fields.is_empty() {
            report.push(name, None, "has no fields");
        }

        let mut seen_fields = HashSet::new();
        for field in &descriptor.fields {
            let field_name = Some(field.name.as_str());

            if !FIELD_NAME.is_match(&field.name) {
                report.push(name, field_name, "invalid field name");
            }
            if !seen_fields.insert(field.name.as_str()) {
                report.push(name, field_name, "duplicate field name");
            }

            if field.data_type.is_relation() {
                match field.target.as_deref() {
                    None | Some("") => {
                        report.push(name, field_name, "relation has no target");
                    }
                    Some(target)
                        if !declared.contains(target) && !external.iter().any(|e| e == target) =>
                    {
                        report.push(
                            name,
                            field_name,
                            format!(
                                "relation target '{target}' is neither deployed in this batch nor declared external"
                            ),
                        );
                    }
                    Some(_) => {}
                }
                if let Some(key) = field.foreign_key.as_deref()
                    && !FIELD_NAME.is_match(key)
                {
                    report.push(name, field_name, format!("invalid foreign key '{key}'"));
                }
            } else if field.target.is_some() || field.foreign_key.is_some() {
                report.push(
                    name,
                    field_name,
                    format!("'{}' fields cannot declare a target or foreign key", field.data_type),
                );
            }

            if field.through.is_some() && field.data_type != DataType::BelongsToMany {
                report.push(name, field_name, "'through' is only valid on belongsToMany");
            }
        }
    }

    if report.is_empty() {
        Ok(())
    } else {
        Err(report)
    }
}
