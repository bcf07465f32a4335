use crate::sql::base::error::DbError;
use chrono::{Datelike, NaiveDate, Timelike};
use model::core::value::Value;
use mysql_async::Value as MySqlValue;
use mysql_common::params::Params;

pub struct MySqlParam(MySqlValue);

fn year(value: &Value, year: i32) -> Result<u16, DbError> {
    u16::try_from(year).map_err(|_| DbError::Bind(format!("year of {value} is out of range")))
}

fn date_value(value: &Value, d: NaiveDate) -> Result<MySqlValue, DbError> {
    Ok(MySqlValue::Date(year(value, d.year())?, d.month() as u8, d.day() as u8, 0, 0, 0, 0))
}

impl MySqlParam {
    pub fn from_value(value: &Value) -> Result<Self, DbError> {
        let param = match value {
            Value::Int(i) => MySqlParam(MySqlValue::Int(*i)),
            Value::Uint(u) => MySqlParam(MySqlValue::UInt(*u)),
            Value::Float(f) => MySqlParam(MySqlValue::Double(*f)),
            Value::String(s) => MySqlParam(MySqlValue::Bytes(s.clone().into_bytes())),
            Value::Boolean(b) => MySqlParam(MySqlValue::Int(if *b { 1 } else { 0 })),
            Value::Json(j) => MySqlParam(MySqlValue::Bytes(j.to_string().into_bytes())),
            Value::Uuid(u) => MySqlParam(MySqlValue::Bytes(u.to_string().into_bytes())),
            Value::Bytes(b) => MySqlParam(MySqlValue::Bytes(b.clone())),
            Value::Date(d) => MySqlParam(date_value(value, *d)?),
            Value::Timestamp(ts) => {
                let naive = ts.naive_utc();
                MySqlParam(MySqlValue::Date(
                    year(value, naive.year())?,
                    naive.month() as u8,
                    naive.day() as u8,
                    naive.hour() as u8,
                    naive.minute() as u8,
                    naive.second() as u8,
                    ts.timestamp_subsec_micros(),
                ))
            }
            Value::Null => MySqlParam(MySqlValue::NULL),
        };
        Ok(param)
    }
}

pub struct MySqlParamStore {
    pub params: Vec<MySqlParam>,
}

impl MySqlParamStore {
    pub fn from_values(values: &[Value]) -> Result<Self, DbError> {
        let params = values
            .iter()
            .map(MySqlParam::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MySqlParamStore { params })
    }

    pub fn params(&self) -> Params {
        let mysql_values: Vec<MySqlValue> = self.params.iter().map(|p| p.0.clone()).collect();
        Params::Positional(mysql_values)
    }
}
