pub mod error;
pub mod resource;
