use crate::sql::base::error::DbError;
use model::{core::value::Value, records::row::RowData};

/// Moves records of type `T` in and out of relational rows for a given
/// column list. Implementations are generated or written per record type and
/// are shared by drivers, never owned by them.
pub trait RowAdapter<T>: Send + Sync {
    /// Identifier matched against a process's `jdbcSupport` value.
    fn name(&self) -> &str;

    /// Whether every column in the list can be mapped to a field of `T`.
    fn is_supported(&self, columns: &[String]) -> bool;

    /// Statement parameters for `record`, one per column, in column order.
    fn bind(&self, columns: &[String], record: &T) -> Result<Vec<Value>, DbError>;

    /// Overwrites `record` with the values of one fetched row. Row fields are
    /// in column order.
    fn populate(&self, columns: &[String], row: &RowData, record: &mut T) -> Result<(), DbError>;
}
