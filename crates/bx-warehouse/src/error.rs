//! Error type for the warehouse access layer.

pub use bx_core::DatabaseError as WarehouseError;

pub type Result<T> = std::result::Result<T, WarehouseError>;
