// Externally supplied schema descriptors
//
// A descriptor lists fields in file order:
//
//   [[fields]]
//   name = "rating"
//   type = "float64"
//
// JSON uses the same shape: {"fields": [{"name": "rating", "type": "float64"}]}.

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaFileError {
    #[error("unknown field type '{0}'")]
    UnknownType(String),

    #[error("duplicate field '{0}'")]
    DuplicateField(String),

    #[error("schema descriptor declares no fields")]
    Empty,

    #[error("invalid TOML schema descriptor: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON schema descriptor: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read schema file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFormat {
    Toml,
    Json,
}

impl DescriptorFormat {
    /// Pick a format from a file name; anything not ending in `.json` is TOML.
    pub fn from_path(path: &str) -> Self {
        if path.to_ascii_lowercase().ends_with(".json") {
            Self::Json
        } else {
            Self::Toml
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSpec {
    pub fields: Vec<FieldSpec>,
}

impl SchemaSpec {
    pub fn to_arrow(&self) -> Result<SchemaRef, SchemaFileError> {
        if self.fields.is_empty() {
            return Err(SchemaFileError::Empty);
        }

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(self.fields.len());
        for spec in &self.fields {
            if !seen.insert(spec.name.as_str()) {
                return Err(SchemaFileError::DuplicateField(spec.name.clone()));
            }
            fields.push(Field::new(
                &spec.name,
                parse_type(&spec.data_type)?,
                spec.nullable,
            ));
        }
        Ok(Arc::new(Schema::new(fields)))
    }
}

/// Parse a descriptor document into an Arrow schema.
pub fn parse_schema_descriptor(
    text: &str,
    format: DescriptorFormat,
) -> Result<SchemaRef, SchemaFileError> {
    let spec: SchemaSpec = match format {
        DescriptorFormat::Toml => toml::from_str(text)?,
        DescriptorFormat::Json => serde_json::from_str(text)?,
    };
    spec.to_arrow()
}

/// Read and parse a descriptor file; the format follows the extension.
pub fn parse_schema_file(path: impl AsRef<Path>) -> Result<SchemaRef, SchemaFileError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| SchemaFileError::Io {
        path: display.clone(),
        source,
    })?;
    parse_schema_descriptor(&text, DescriptorFormat::from_path(&display))
}

/// Map a descriptor type name to an Arrow DataType.
///
/// Covers:
/// - utf8, string, str          → Utf8
/// - large_utf8                 → LargeUtf8
/// - int32, int                 → Int32
/// - int64, bigint, long        → Int64
/// - float32, float             → Float32
/// - float64, double            → Float64
/// - boolean, bool              → Boolean
/// - date32, date               → Date32
/// - timestamp_ms               → Timestamp(ms)
/// - timestamp_us, timestamp    → Timestamp(µs)
/// - list<T>                    → List(T)
pub fn parse_type(name: &str) -> Result<DataType, SchemaFileError> {
    let trimmed = name.trim();
    let lower = trimmed.to_ascii_lowercase();

    if let Some(inner) = lower
        .strip_prefix("list<")
        .and_then(|rest| rest.strip_suffix('>'))
    {
        let item = parse_type(inner)?;
        return Ok(DataType::List(Arc::new(Field::new_list_field(item, true))));
    }

    let data_type = match lower.as_str() {
        "utf8" | "string" | "str" => DataType::Utf8,
        "large_utf8" => DataType::LargeUtf8,
        "int32" | "int" => DataType::Int32,
        "int64" | "bigint" | "long" => DataType::Int64,
        "float32" | "float" => DataType::Float32,
        "float64" | "double" => DataType::Float64,
        "boolean" | "bool" => DataType::Boolean,
        "date32" | "date" => DataType::Date32,
        "timestamp_ms" => DataType::Timestamp(TimeUnit::Millisecond, None),
        "timestamp_us" | "timestamp" => DataType::Timestamp(TimeUnit::Microsecond, None),
        _ => return Err(SchemaFileError::UnknownType(trimmed.to_string())),
    };
    Ok(data_type)
}
