//! Table schema and partition layout.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};

use crate::metadata::{MetadataError, MetadataResult};

/// Primitive column types a table schema can declare.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    /// `true` / `false`.
    Boolean,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit IEEE float.
    Float,
    /// 64-bit IEEE float.
    Double,
    /// UTF-8 string.
    String,
    /// Arbitrary bytes.
    Binary,
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::String => "string",
            PrimitiveType::Binary => "binary",
        };
        f.write_str(s)
    }
}

/// A named, typed column with a stable field id.
///
/// Field ids are assigned once and never reused; readers and metrics resolve
/// columns by id, not by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct NestedField {
    /// Stable positive field id.
    pub id: i32,
    /// Column name.
    pub name: String,
    /// Whether the column rejects nulls.
    pub required: bool,
    /// Column type.
    #[serde(rename = "type")]
    pub field_type: PrimitiveType,
}

impl NestedField {
    /// A nullable column.
    pub fn optional(id: i32, name: impl Into<String>, field_type: PrimitiveType) -> Self {
        Self {
            id,
            name: name.into(),
            required: false,
            field_type,
        }
    }

    /// A non-nullable column.
    pub fn required(id: i32, name: impl Into<String>, field_type: PrimitiveType) -> Self {
        Self {
            id,
            name: name.into(),
            required: true,
            field_type,
        }
    }
}

/// Ordered list of columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Schema {
    schema_id: i32,
    fields: Vec<NestedField>,
}

impl Schema {
    /// Build a schema, rejecting non-positive ids and duplicate ids or names.
    pub fn new(schema_id: i32, fields: Vec<NestedField>) -> MetadataResult<Self> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();

        for field in &fields {
            if field.id <= 0 {
                return Err(MetadataError::InvalidFieldId { id: field.id });
            }
            if !ids.insert(field.id) {
                return Err(MetadataError::DuplicateFieldId { id: field.id });
            }
            if !names.insert(field.name.as_str()) {
                return Err(MetadataError::DuplicateFieldName {
                    name: field.name.clone(),
                });
            }
        }

        Ok(Self { schema_id, fields })
    }

    /// Schema id recorded in snapshots.
    pub fn schema_id(&self) -> i32 {
        self.schema_id
    }

    /// Columns in declaration order.
    pub fn fields(&self) -> &[NestedField] {
        &self.fields
    }

    /// Look up a column by id.
    pub fn field_by_id(&self, id: i32) -> Option<&NestedField> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Look up a column by exact name.
    pub fn field_by_name(&self, name: &str) -> Option<&NestedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Highest field id in the schema (0 for an empty schema).
    pub fn highest_field_id(&self) -> i32 {
        self.fields.iter().map(|f| f.id).max().unwrap_or(0)
    }
}

/// Partition layout of a table. Only the unpartitioned layout is produced
/// by this crate; the field list is kept so metadata written elsewhere still
/// round-trips.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionSpec {
    /// Partition spec id.
    pub spec_id: i32,
    /// Partition fields; empty for an unpartitioned table.
    #[serde(default)]
    pub fields: Vec<PartitionField>,
}

/// One partition field derived from a source column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionField {
    /// Source column id.
    pub source_id: i32,
    /// Partition field id.
    pub field_id: i32,
    /// Partition field name.
    pub name: String,
    /// Transform name (for example `identity`).
    pub transform: String,
}

impl PartitionSpec {
    /// The spec with no partition fields.
    pub fn unpartitioned() -> Self {
        Self::default()
    }

    /// True when the spec has no partition fields.
    pub fn is_unpartitioned(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_rejects_duplicate_ids() {
        let err = Schema::new(
            0,
            vec![
                NestedField::optional(1, "id", PrimitiveType::String),
                NestedField::optional(1, "name", PrimitiveType::String),
            ],
        )
        .expect_err("duplicate id");

        assert!(matches!(err, MetadataError::DuplicateFieldId { id: 1 }));
    }

    #[test]
    fn schema_rejects_duplicate_names() {
        let err = Schema::new(
            0,
            vec![
                NestedField::optional(1, "id", PrimitiveType::String),
                NestedField::optional(2, "id", PrimitiveType::String),
            ],
        )
        .expect_err("duplicate name");

        assert!(matches!(err, MetadataError::DuplicateFieldName { name } if name == "id"));
    }

    #[test]
    fn schema_rejects_non_positive_ids() {
        let err = Schema::new(0, vec![NestedField::optional(0, "id", PrimitiveType::Long)])
            .expect_err("zero id");
        assert!(matches!(err, MetadataError::InvalidFieldId { id: 0 }));
    }

    #[test]
    fn schema_lookups() {
        let schema = Schema::new(
            0,
            vec![
                NestedField::optional(1, "id", PrimitiveType::String),
                NestedField::required(5, "ts", PrimitiveType::Long),
            ],
        )
        .expect("valid schema");

        assert_eq!(schema.field_by_id(5).map(|f| f.name.as_str()), Some("ts"));
        assert_eq!(schema.field_by_name("id").map(|f| f.id), Some(1));
        assert!(schema.field_by_id(2).is_none());
        assert_eq!(schema.highest_field_id(), 5);
    }

    #[test]
    fn nested_field_serializes_type_key() {
        let json = serde_json::to_string(&NestedField::optional(1, "id", PrimitiveType::String))
            .expect("serialize");
        assert_eq!(
            json,
            r#"{"id":1,"name":"id","required":false,"type":"string"}"#
        );
    }

    #[test]
    fn unpartitioned_spec_has_no_fields() {
        let spec = PartitionSpec::unpartitioned();
        assert!(spec.is_unpartitioned());
        assert_eq!(spec.spec_id, 0);
    }
}
