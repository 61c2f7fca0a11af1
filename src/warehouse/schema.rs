use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldMode {
    Nullable,
    Required,
    Repeated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteDisposition {
    #[serde(rename = "WRITE_APPEND")]
    Append,
    #[serde(rename = "WRITE_TRUNCATE")]
    Truncate,
}

/// One column, serialized the way BigQuery's `TableFieldSchema` expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaField {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mode: FieldMode,
}

impl SchemaField {
    pub const fn nullable(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            mode: FieldMode::Nullable,
        }
    }

    pub const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            mode: FieldMode::Required,
        }
    }

    pub const fn repeated(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            mode: FieldMode::Repeated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: &'static str,
    pub fields: Vec<SchemaField>,
    pub write_disposition: WriteDisposition,
}

impl TableSchema {
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// `{"fields": [...]}` as used in load job configurations.
    pub fn to_bigquery_json(&self) -> serde_json::Value {
        serde_json::json!({ "fields": self.fields })
    }
}

/// A flat record with a fixed warehouse table.
pub trait TableRow: Serialize {
    fn schema() -> TableSchema;
}
