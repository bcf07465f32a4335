pub mod adapter;
pub mod error;
pub mod profile;
pub mod release;
pub mod retry;
pub mod script;
pub mod sql;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
