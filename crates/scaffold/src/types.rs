//! Descriptor types: the declarative shape of a deployable collection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column or relation type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    String,
    Text,
    Decimal,
    Integer,
    Boolean,
    Date,
    Json,
    BelongsTo,
    BelongsToMany,
}

impl DataType {
    /// Name used in the generated collection definition.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Decimal => "decimal",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Json => "json",
            Self::BelongsTo => "belongsTo",
            Self::BelongsToMany => "belongsToMany",
        }
    }

    /// Whether the field references another collection.
    pub fn is_relation(&self) -> bool {
        matches!(self, Self::BelongsTo | Self::BelongsToMany)
    }

    /// Admin UI interface for this type.
    pub fn interface(&self) -> &'static str {
        match self {
            Self::String => "input",
            Self::Text => "textarea",
            Self::Decimal => "number",
            Self::Integer => "integer",
            Self::Boolean => "checkbox",
            Self::Date => "datetime",
            Self::Json => "json",
            Self::BelongsTo => "m2o",
            Self::BelongsToMany => "m2m",
        }
    }

    /// Admin UI component for this type.
    pub fn component(&self) -> &'static str {
        match self {
            Self::String => "Input",
            Self::Text => "Input.TextArea",
            Self::Decimal | Self::Integer => "InputNumber",
            Self::Boolean => "Checkbox",
            Self::Date => "DatePicker",
            Self::Json => "Input.JSON",
            Self::BelongsTo | Self::BelongsToMany => "AssociationField",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One field of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type", alias = "dataType")]
    pub data_type: DataType,
    /// Label shown in the admin UI (defaults to the field name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Target collection for relation types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(
        default,
        alias = "foreignKey",
        skip_serializing_if = "Option::is_none"
    )]
    pub foreign_key: Option<String>,
    /// Join collection for `belongsToMany`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub through: Option<String>,
}

impl FieldSpec {
    /// Create a scalar field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            title: None,
            unique: false,
            required: false,
            default: None,
            target: None,
            foreign_key: None,
            through: None,
        }
    }

    /// Create a `belongsTo` relation.
    pub fn belongs_to(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::new(name, DataType::BelongsTo)
        }
    }

    /// Create a `belongsToMany` relation.
    pub fn belongs_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::new(name, DataType::BelongsToMany)
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    pub fn through(mut self, join: impl Into<String>) -> Self {
        self.through = Some(join.into());
        self
    }

    /// Foreign key after defaults: `<name>_id` for `belongsTo`.
    pub fn resolved_foreign_key(&self) -> Option<String> {
        match self.data_type {
            DataType::BelongsTo => Some(
                self.foreign_key
                    .clone()
                    .unwrap_or_else(|| format!("{}_id", self.name)),
            ),
            DataType::BelongsToMany => self.foreign_key.clone(),
            _ => None,
        }
    }

    /// Title after defaults.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

/// A deployable collection: name, display metadata and ordered fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub name: String,
    #[serde(default, alias = "displayName")]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "fieldList")]
    pub fields: Vec<FieldSpec>,
}

impl ResourceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: String::new(),
            description: String::new(),
            fields: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Display name, falling back to the identifier.
    pub fn title(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    /// Relation targets in field order, deduplicated, without self references.
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        for field in &self.fields {
            if let Some(target) = field.target.as_ref().filter(|_| field.data_type.is_relation())
                && target != &self.name
                && !deps.contains(target)
            {
                deps.push(target.clone());
            }
        }
        deps
    }
}
