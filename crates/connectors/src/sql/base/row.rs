use crate::sql::base::error::DbError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use core::fmt;
use model::{
    core::{
        data_type::DataType,
        value::{FieldValue, Value},
    },
    records::row::RowData,
};
use mysql_async::{
    Column as MySqlColumn, Row as MySqlRow,
    consts::{ColumnFlags, ColumnType},
    prelude::FromValue,
};
use rust_decimal::Decimal;
use std::fmt::Formatter;
use tokio_postgres::{
    Row as PgRow,
    types::{FromSql, Json as PgJson, Type},
};
use tracing::warn;
use uuid::Uuid;

/// A fetched backend row. Columns are addressed by position because a
/// select list may repeat a column.
pub enum DbRow<'a> {
    MySqlRow(&'a MySqlRow),
    PostgresRow(&'a PgRow),
}

impl DbRow<'_> {
    /// Converts every column. SQL `NULL` becomes an absent value; a value
    /// that does not convert to its column type is an error.
    pub fn to_row_data(&self, table: &str) -> Result<RowData, DbError> {
        let columns = self
            .columns()
            .into_iter()
            .enumerate()
            .map(|(index, (name, type_name))| {
                let data_type = DataType::try_from(type_name.as_str()).unwrap_or_else(|_| {
                    warn!(column = %name, "Unknown column type: {type_name}");
                    DataType::String
                });

                let value = self
                    .get_value(&data_type, index)
                    .map_err(|e| DbError::Decode(format!("column {name} ({type_name}): {e}")))?;
                Ok(FieldValue {
                    value,
                    name,
                    data_type,
                })
            })
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(RowData::new(table, columns))
    }

    pub fn get_value(&self, data_type: &DataType, index: usize) -> Result<Option<Value>, DbError> {
        let value = match data_type {
            DataType::Boolean => self.try_get_bool(index)?.map(Value::Boolean),
            DataType::Short => self.try_get_i16(index)?.map(|v| Value::Int(v.into())),
            DataType::Int => self.try_get_i32(index)?.map(|v| Value::Int(v.into())),
            DataType::Long => self.try_get_i64(index)?.map(Value::Int),
            DataType::LongUnsigned => self.try_get_u64(index)?.map(Value::Uint),
            DataType::Float => self.try_get_f32(index)?.map(|v| Value::Float(v.into())),
            DataType::Double => self.try_get_f64(index)?.map(Value::Float),
            // exact text; binders parse it back for numeric parameters
            DataType::Decimal => self.try_get_decimal(index)?.map(Value::String),
            DataType::Char | DataType::VarChar | DataType::String | DataType::Custom(_) => {
                self.try_get_string(index)?.map(Value::String)
            }
            DataType::Json => self.try_get_json(index)?.map(Value::Json),
            DataType::Uuid => self.try_get_uuid(index)?.map(Value::Uuid),
            DataType::Bytes => self.try_get_bytes(index)?.map(Value::Bytes),
            DataType::Date => self.try_get_date(index)?.map(Value::Date),
            DataType::Time => self.try_get_time(index)?.map(|t| Value::String(t.to_string())),
            DataType::Timestamp => self.try_get_timestamp(index)?.map(Value::Timestamp),
            DataType::Null => None,
        };
        Ok(value)
    }

    /// Column names and backend type names, in select-list order.
    pub fn columns(&self) -> Vec<(String, String)> {
        match self {
            DbRow::MySqlRow(row) => row
                .columns_ref()
                .iter()
                .map(|col| (col.name_str().into_owned(), mysql_col_type(col).to_string()))
                .collect(),
            DbRow::PostgresRow(row) => row
                .columns()
                .iter()
                .map(|col| (col.name().to_string(), col.type_().name().to_string()))
                .collect(),
        }
    }

    pub fn try_get_bool(&self, index: usize) -> Result<Option<bool>, DbError> {
        match self {
            DbRow::MySqlRow(row) => mysql_get(row, index),
            DbRow::PostgresRow(row) => pg_get(row, index),
        }
    }

    pub fn try_get_i16(&self, index: usize) -> Result<Option<i16>, DbError> {
        match self {
            DbRow::MySqlRow(row) => mysql_get(row, index),
            DbRow::PostgresRow(row) => pg_get(row, index),
        }
    }

    pub fn try_get_i32(&self, index: usize) -> Result<Option<i32>, DbError> {
        match self {
            DbRow::MySqlRow(row) => mysql_get(row, index),
            DbRow::PostgresRow(row) => pg_get(row, index),
        }
    }

    pub fn try_get_i64(&self, index: usize) -> Result<Option<i64>, DbError> {
        match self {
            DbRow::MySqlRow(row) => mysql_get(row, index),
            DbRow::PostgresRow(row) => pg_get(row, index),
        }
    }

    pub fn try_get_u64(&self, index: usize) -> Result<Option<u64>, DbError> {
        match self {
            DbRow::MySqlRow(row) => mysql_get(row, index),
            DbRow::PostgresRow(row) => pg_get::<i64>(row, index)?
                .map(|v| {
                    u64::try_from(v).map_err(|_| DbError::Decode(format!("{v} is not unsigned")))
                })
                .transpose(),
        }
    }

    pub fn try_get_f32(&self, index: usize) -> Result<Option<f32>, DbError> {
        match self {
            DbRow::MySqlRow(row) => mysql_get(row, index),
            DbRow::PostgresRow(row) => pg_get(row, index),
        }
    }

    pub fn try_get_f64(&self, index: usize) -> Result<Option<f64>, DbError> {
        match self {
            DbRow::MySqlRow(row) => mysql_get(row, index),
            DbRow::PostgresRow(row) => pg_get(row, index),
        }
    }

    /// Decimal in plain notation, without losing digits.
    pub fn try_get_decimal(&self, index: usize) -> Result<Option<String>, DbError> {
        match self {
            DbRow::MySqlRow(row) => {
                Ok(mysql_get::<BigDecimal>(row, index)?.map(|v| v.to_plain_string()))
            }
            DbRow::PostgresRow(row) => Ok(pg_get::<Decimal>(row, index)?.map(|v| v.to_string())),
        }
    }

    pub fn try_get_string(&self, index: usize) -> Result<Option<String>, DbError> {
        match self {
            DbRow::MySqlRow(row) => mysql_get(row, index),
            DbRow::PostgresRow(row) => pg_get(row, index),
        }
    }

    pub fn try_get_json(&self, index: usize) -> Result<Option<serde_json::Value>, DbError> {
        match self {
            DbRow::MySqlRow(row) => mysql_get(row, index),
            DbRow::PostgresRow(row) => {
                Ok(pg_get::<PgJson<serde_json::Value>>(row, index)?.map(|json| json.0))
            }
        }
    }

    pub fn try_get_uuid(&self, index: usize) -> Result<Option<Uuid>, DbError> {
        match self {
            DbRow::MySqlRow(row) => mysql_get::<String>(row, index)?
                .map(|s| Uuid::parse_str(&s).map_err(|e| DbError::Decode(format!("`{s}`: {e}"))))
                .transpose(),
            DbRow::PostgresRow(row) => pg_get(row, index),
        }
    }

    pub fn try_get_bytes(&self, index: usize) -> Result<Option<Vec<u8>>, DbError> {
        match self {
            DbRow::MySqlRow(row) => mysql_get(row, index),
            DbRow::PostgresRow(row) => pg_get(row, index),
        }
    }

    pub fn try_get_date(&self, index: usize) -> Result<Option<NaiveDate>, DbError> {
        match self {
            DbRow::MySqlRow(row) => mysql_get(row, index),
            DbRow::PostgresRow(row) => pg_get(row, index),
        }
    }

    pub fn try_get_time(&self, index: usize) -> Result<Option<NaiveTime>, DbError> {
        match self {
            DbRow::MySqlRow(row) => mysql_get(row, index),
            DbRow::PostgresRow(row) => pg_get(row, index),
        }
    }

    pub fn try_get_timestamp(&self, index: usize) -> Result<Option<DateTime<Utc>>, DbError> {
        match self {
            DbRow::MySqlRow(row) => {
                Ok(mysql_get::<NaiveDateTime>(row, index)?.map(|naive| naive.and_utc()))
            }
            DbRow::PostgresRow(row) => {
                if row.columns()[index].type_() == &Type::TIMESTAMPTZ {
                    pg_get(row, index)
                } else {
                    Ok(pg_get::<NaiveDateTime>(row, index)?.map(|naive| naive.and_utc()))
                }
            }
        }
    }
}

fn mysql_get<T: FromValue>(row: &MySqlRow, index: usize) -> Result<Option<T>, DbError> {
    match row.get_opt::<Option<T>, _>(index) {
        Some(Ok(value)) => Ok(value),
        Some(Err(err)) => Err(DbError::Decode(err.to_string())),
        None => Err(DbError::Decode(format!("no column at position {index}"))),
    }
}

fn pg_get<'r, T: FromSql<'r>>(row: &'r PgRow, index: usize) -> Result<Option<T>, DbError> {
    row.try_get::<_, Option<T>>(index)
        .map_err(|e| DbError::Decode(e.to_string()))
}

/// Type name of a MySQL column, as understood by [`DataType`]. Unsigned
/// integers of every width are read as 64-bit unsigned values.
pub fn mysql_col_type(column: &MySqlColumn) -> &'static str {
    let unsigned = column.flags().contains(ColumnFlags::UNSIGNED_FLAG);

    match column.column_type() {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
            if unsigned =>
        {
            "BIGINT UNSIGNED"
        }
        ColumnType::MYSQL_TYPE_TINY => "TINY",
        ColumnType::MYSQL_TYPE_SHORT => "SHORT",
        ColumnType::MYSQL_TYPE_YEAR => "YEAR",
        ColumnType::MYSQL_TYPE_INT24 | ColumnType::MYSQL_TYPE_LONG => "INT",
        ColumnType::MYSQL_TYPE_LONGLONG => "LONGLONG",
        ColumnType::MYSQL_TYPE_FLOAT => "FLOAT",
        ColumnType::MYSQL_TYPE_DOUBLE => "DOUBLE",
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => "DECIMAL",
        ColumnType::MYSQL_TYPE_VARCHAR | ColumnType::MYSQL_TYPE_VAR_STRING => "VARCHAR",
        ColumnType::MYSQL_TYPE_STRING => "CHAR",
        ColumnType::MYSQL_TYPE_ENUM | ColumnType::MYSQL_TYPE_SET => "ENUM",
        ColumnType::MYSQL_TYPE_JSON => "JSON",
        ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_BIT
        | ColumnType::MYSQL_TYPE_GEOMETRY => "BLOB",
        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => "DATE",
        ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => "TIME",
        ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_TIMESTAMP2
        | ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_DATETIME2 => "TIMESTAMP",
        ColumnType::MYSQL_TYPE_NULL => "NULL",
        _ => "VARCHAR",
    }
}

impl fmt::Debug for DbRow<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DbRow::MySqlRow(row) => write!(f, "{row:?}"),
            DbRow::PostgresRow(row) => write!(f, "{row:?}"),
        }
    }
}
