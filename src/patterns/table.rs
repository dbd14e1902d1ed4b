use rusqlite::types::{Value, ValueRef};
use rusqlite::Row;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value as JsonValue};

use super::repository::Entity;
use crate::error::{RepositoryError, Result};

/// Storage class of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    /// Non-finite floats serialize as null, so they are only storable (as
    /// NULL) in nullable columns.
    Real,
    /// Scalar strings and numbers; nested values need [`ColumnKind::Json`].
    Text,
    /// Stored as 0/1.
    Boolean,
    /// Any serde value, stored as JSON text.
    Json,
    Blob,
}

impl ColumnKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Integer | ColumnKind::Boolean => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text | ColumnKind::Json => "TEXT",
            ColumnKind::Blob => "BLOB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub primary_key: bool,
    pub nullable: bool,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            primary_key: false,
            nullable: false,
        }
    }

    pub const fn primary_key(self) -> Self {
        Self {
            primary_key: true,
            ..self
        }
    }

    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }
}

/// Maps an entity onto a SQL table.
///
/// Column names must match the entity's serde field names; rows are
/// converted through the entity's `Serialize`/`Deserialize` impls. Exactly
/// one column must be flagged as primary key.
pub trait Table: Entity + Serialize + DeserializeOwned {
    const TABLE: &'static str;
    const COLUMNS: &'static [Column];
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn primary_key<T: Table>() -> Result<&'static Column> {
    let mut keys = T::COLUMNS.iter().filter(|c| c.primary_key);
    match (keys.next(), keys.next()) {
        (Some(column), None) => Ok(column),
        (None, _) => Err(RepositoryError::Mapping(format!(
            "Table '{}' has no primary key column",
            T::TABLE
        ))),
        (Some(_), Some(_)) => Err(RepositoryError::Mapping(format!(
            "Table '{}' declares more than one primary key column",
            T::TABLE
        ))),
    }
}

/// Whether the store assigns keys to rows inserted without one.
pub fn assigns_keys<T: Table>() -> Result<bool> {
    Ok(primary_key::<T>()?.kind == ColumnKind::Integer)
}

pub fn column_list<T: Table>() -> String {
    T::COLUMNS
        .iter()
        .map(|c| quote_ident(c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn create_table_sql<T: Table>() -> Result<String> {
    if T::COLUMNS.is_empty() {
        return Err(RepositoryError::Mapping(format!(
            "Table '{}' has no columns",
            T::TABLE
        )));
    }
    primary_key::<T>()?;

    let definitions: Vec<String> = T::COLUMNS
        .iter()
        .map(|c| {
            let mut definition = format!("{} {}", quote_ident(c.name), c.kind.sql_type());
            if c.primary_key {
                // INTEGER PRIMARY KEY aliases the rowid and is never NULL
                definition.push_str(" PRIMARY KEY");
                if c.kind != ColumnKind::Integer {
                    definition.push_str(" NOT NULL");
                }
            } else if !c.nullable {
                definition.push_str(" NOT NULL");
            }
            definition
        })
        .collect();

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(T::TABLE),
        definitions.join(", ")
    ))
}

/// Serializes an entity into SQL values ordered like `T::COLUMNS`.
pub fn entity_to_values<T: Table>(entity: &T) -> Result<Vec<Value>> {
    let object = match serde_json::to_value(entity)? {
        JsonValue::Object(object) => object,
        other => {
            return Err(RepositoryError::Mapping(format!(
                "Entity for table '{}' must serialize to an object, got {}",
                T::TABLE,
                other
            )))
        }
    };

    T::COLUMNS
        .iter()
        .map(|c| {
            let value = object.get(c.name).unwrap_or(&JsonValue::Null);
            // a keyless integer primary key is left to SQLite
            if value.is_null() && !c.nullable && !c.primary_key {
                return Err(RepositoryError::Mapping(format!(
                    "Column '{}' of table '{}' is not nullable but got null",
                    c.name,
                    T::TABLE
                )));
            }
            json_to_sql(c, value)
        })
        .collect()
}

pub fn id_to_sql<T: Table>(id: &T::Id) -> Result<Value> {
    let key = primary_key::<T>()?;
    json_to_sql(key, &serde_json::to_value(id)?)
}

/// Decodes a row selected with `column_list::<T>()`.
pub fn row_to_entity<T: Table>(row: &Row<'_>) -> Result<T> {
    let mut object = Map::with_capacity(T::COLUMNS.len());
    for (idx, column) in T::COLUMNS.iter().enumerate() {
        let value = sql_to_json(column, row.get_ref(idx)?)?;
        object.insert(column.name.to_string(), value);
    }
    Ok(serde_json::from_value(JsonValue::Object(object))?)
}

fn json_to_sql(column: &Column, value: &JsonValue) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if column.kind == ColumnKind::Json {
        return Ok(Value::Text(value.to_string()));
    }

    match value {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Integer(i64::from(*b))),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else if n.is_u64() {
                Err(RepositoryError::Mapping(format!(
                    "Value {} of column '{}' does not fit a 64-bit signed integer",
                    n, column.name
                )))
            } else {
                n.as_f64().map(Value::Real).ok_or_else(|| {
                    RepositoryError::Mapping(format!(
                        "Value {} of column '{}' is not representable",
                        n, column.name
                    ))
                })
            }
        }
        JsonValue::String(s) => Ok(Value::Text(s.clone())),
        JsonValue::Array(items) if column.kind == ColumnKind::Blob => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| {
                        RepositoryError::Mapping(format!(
                            "Blob column '{}' holds a non-byte element {}",
                            column.name, item
                        ))
                    })
            })
            .collect::<Result<Vec<u8>>>()
            .map(Value::Blob),
        JsonValue::Array(_) | JsonValue::Object(_) => Err(RepositoryError::Mapping(format!(
            "Column '{}' holds a nested value; map it as ColumnKind::Json",
            column.name
        ))),
    }
}

fn sql_to_json(column: &Column, value: ValueRef<'_>) -> Result<JsonValue> {
    match (column.kind, value) {
        (_, ValueRef::Null) => Ok(JsonValue::Null),
        (ColumnKind::Boolean, ValueRef::Integer(i)) => Ok(JsonValue::Bool(i != 0)),
        (ColumnKind::Json, ValueRef::Text(bytes)) => Ok(serde_json::from_slice(bytes)?),
        (_, other) => value_ref_to_json(other),
    }
}

/// Untyped decoding used where no column metadata is known.
pub fn value_ref_to_json(value: ValueRef<'_>) -> Result<JsonValue> {
    match value {
        ValueRef::Null => Ok(JsonValue::Null),
        ValueRef::Integer(i) => Ok(JsonValue::Number(i.into())),
        ValueRef::Real(f) => Number::from_f64(f)
            .map(JsonValue::Number)
            .ok_or_else(|| RepositoryError::Mapping(format!("Non-finite real value {f}"))),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|s| JsonValue::String(s.to_string()))
            .map_err(|e| RepositoryError::Mapping(format!("Text column is not UTF-8: {e}"))),
        ValueRef::Blob(bytes) => {
            let items = bytes.iter().map(|b| JsonValue::Number((*b).into()));
            Ok(JsonValue::Array(items.collect()))
        }
    }
}
