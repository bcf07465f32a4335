use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

/// Column type as reported by a backend, normalized across dialects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DataType {
    Boolean,
    Short,
    Int,
    Long,
    LongUnsigned,
    Float,
    Double,
    Decimal,
    Char,
    VarChar,
    String,
    Json,
    Uuid,
    Bytes,
    Date,
    Time,
    Timestamp,
    Null,
    Custom(String),
}

lazy_static! {
    static ref TYPE_MAP: HashMap<&'static str, DataType> = build_type_map();
}

impl DataType {
    fn normalize_type_name(type_name: &str) -> String {
        type_name.trim().to_uppercase()
    }
}

impl TryFrom<&str> for DataType {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        TYPE_MAP
            .get(Self::normalize_type_name(s).as_str())
            .cloned()
            .ok_or_else(|| format!("Unknown column type: {s}"))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Custom(name) => write!(f, "{name}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Type names of both supported backends. MySQL reports names such as
/// `LONGLONG`, PostgreSQL reports catalog names such as `int8`.
fn build_type_map() -> HashMap<&'static str, DataType> {
    use DataType::*;

    let entries = [
        ("BOOLEAN", Boolean),
        ("BOOL", Boolean),
        ("TINY", Short),
        ("TINYINT", Short),
        ("SHORT", Short),
        ("SMALLINT", Short),
        ("INT2", Short),
        ("YEAR", Short),
        ("INT24", Int),
        ("MEDIUMINT", Int),
        ("INT", Int),
        ("INTEGER", Int),
        ("INT4", Int),
        ("LONG", Long),
        ("LONGLONG", Long),
        ("BIGINT", Long),
        ("INT8", Long),
        ("BIGINT UNSIGNED", LongUnsigned),
        ("FLOAT", Float),
        ("FLOAT4", Float),
        ("REAL", Float),
        ("DOUBLE", Double),
        ("FLOAT8", Double),
        ("DOUBLE PRECISION", Double),
        ("DECIMAL", Decimal),
        ("NEWDECIMAL", Decimal),
        ("NUMERIC", Decimal),
        ("CHAR", Char),
        ("BPCHAR", Char),
        ("CHARACTER", Char),
        ("VARCHAR", VarChar),
        ("VAR_STRING", VarChar),
        ("CHARACTER VARYING", VarChar),
        ("STRING", String),
        ("TEXT", String),
        ("NAME", String),
        ("ENUM", String),
        ("JSON", Json),
        ("JSONB", Json),
        ("UUID", Uuid),
        ("BYTEA", Bytes),
        ("BLOB", Bytes),
        ("TINY_BLOB", Bytes),
        ("MEDIUM_BLOB", Bytes),
        ("LONG_BLOB", Bytes),
        ("BINARY", Bytes),
        ("VARBINARY", Bytes),
        ("DATE", Date),
        ("NEWDATE", Date),
        ("TIME", Time),
        ("TIMETZ", Time),
        ("TIMESTAMP", Timestamp),
        ("TIMESTAMPTZ", Timestamp),
        ("DATETIME", Timestamp),
        ("NULL", Null),
    ];

    entries.into_iter().collect()
}
