use crate::sql::base::error::DbError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use model::core::value::Value;
use rust_decimal::{Decimal, prelude::FromPrimitive};
use std::str::FromStr;
use tokio_postgres::types::{Json as PgJson, ToSql, Type};
use uuid::Uuid;

/// A value converted to the Rust type the prepared statement expects for
/// its parameter.
pub struct PgParam(Box<dyn ToSql + Sync + Send>);

fn bind_error(value: &Value, ty: &Type) -> DbError {
    DbError::Bind(format!("cannot bind {value} as {}", ty.name()))
}

impl PgParam {
    pub fn from_value(value: Value, ty: &Type) -> Result<Self, DbError> {
        let param: Box<dyn ToSql + Sync + Send> = match (value, ty.name()) {
            (Value::Null, name) => typed_null(name),
            (Value::Int(v), "int2") => {
                Box::new(i16::try_from(v).map_err(|_| bind_error(&Value::Int(v), ty))?)
            }
            (Value::Int(v), "int4") => {
                Box::new(i32::try_from(v).map_err(|_| bind_error(&Value::Int(v), ty))?)
            }
            (Value::Int(v), "float4") => Box::new(v as f32),
            (Value::Int(v), "float8") => Box::new(v as f64),
            (Value::Int(v), "numeric") => Box::new(Decimal::from(v)),
            (Value::Int(v), "text" | "varchar" | "bpchar") => Box::new(v.to_string()),
            (Value::Int(v), _) => Box::new(v),
            (Value::Uint(v), _) => {
                let signed = i64::try_from(v).map_err(|_| bind_error(&Value::Uint(v), ty))?;
                return PgParam::from_value(Value::Int(signed), ty);
            }
            (Value::Float(v), "float4") => Box::new(v as f32),
            (Value::Float(v), "numeric") => {
                Box::new(Decimal::from_f64(v).ok_or_else(|| bind_error(&Value::Float(v), ty))?)
            }
            (Value::Float(v), _) => Box::new(v),
            (Value::String(s), "numeric") => Box::new(
                Decimal::from_str(s.trim()).map_err(|_| bind_error(&Value::String(s.clone()), ty))?,
            ),
            (Value::String(s), "uuid") => Box::new(
                Uuid::parse_str(s.trim()).map_err(|_| bind_error(&Value::String(s.clone()), ty))?,
            ),
            (Value::String(s), "json" | "jsonb") => {
                let json = serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s));
                Box::new(PgJson(json))
            }
            (Value::String(s), _) => Box::new(s),
            (Value::Boolean(v), _) => Box::new(v),
            (Value::Json(v), _) => Box::new(PgJson(v)),
            (Value::Uuid(v), "text" | "varchar" | "bpchar") => Box::new(v.to_string()),
            (Value::Uuid(v), _) => Box::new(v),
            (Value::Bytes(v), _) => Box::new(v),
            (Value::Date(v), "timestamp") => Box::new(v.and_hms_opt(0, 0, 0)),
            (Value::Date(v), _) => Box::new(v),
            (Value::Timestamp(v), "timestamp") => Box::new(v.naive_utc()),
            (Value::Timestamp(v), "date") => Box::new(v.date_naive()),
            (Value::Timestamp(v), _) => Box::new(v),
        };
        Ok(PgParam(param))
    }
}

fn typed_null(type_name: &str) -> Box<dyn ToSql + Sync + Send> {
    match type_name {
        "int2" => Box::new(None::<i16>),
        "int4" => Box::new(None::<i32>),
        "int8" => Box::new(None::<i64>),
        "float4" => Box::new(None::<f32>),
        "float8" => Box::new(None::<f64>),
        "numeric" => Box::new(None::<Decimal>),
        "bool" => Box::new(None::<bool>),
        "uuid" => Box::new(None::<Uuid>),
        "json" | "jsonb" => Box::new(None::<PgJson<serde_json::Value>>),
        "bytea" => Box::new(None::<Vec<u8>>),
        "date" => Box::new(None::<NaiveDate>),
        "timestamp" => Box::new(None::<NaiveDateTime>),
        "timestamptz" => Box::new(None::<DateTime<Utc>>),
        _ => Box::new(None::<String>),
    }
}

impl AsRef<dyn ToSql + Sync> for PgParam {
    fn as_ref(&self) -> &(dyn ToSql + Sync + 'static) {
        &*self.0
    }
}

pub struct PgParamStore {
    pub params: Vec<PgParam>,
}

impl PgParamStore {
    /// Converts one row of values against the statement's parameter types.
    pub fn from_values(values: Vec<Value>, types: &[Type]) -> Result<Self, DbError> {
        if values.len() != types.len() {
            return Err(DbError::Bind(format!(
                "expected {} parameters, got {}",
                types.len(),
                values.len()
            )));
        }

        let params = values
            .into_iter()
            .zip(types)
            .map(|(value, ty)| PgParam::from_value(value, ty))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { params })
    }

    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|param| param.as_ref())
            .collect::<Vec<_>>()
    }
}
