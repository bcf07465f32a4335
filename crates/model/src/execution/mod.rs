pub mod errors;
pub mod process;
pub mod profile;
pub mod properties;
