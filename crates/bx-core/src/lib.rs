//! bitrix-sync core library
//!
//! Domain types and pure logic shared by the Bitrix client, the warehouse
//! layer and the sync orchestrator: the field mapper, the reference
//! registry, the error taxonomy, and the untyped record representation
//! that flows between them.

pub mod entity;
pub mod error;
pub mod field_mapper;
pub mod record;
pub mod reference;
pub mod telemetry;

pub use entity::EntityType;
pub use error::{BitrixError, DatabaseError, SyncError};
pub use field_mapper::{FieldInfo, FieldMapper};
pub use record::BitrixRecord;
pub use reference::{ReferenceFieldDef, ReferenceType, REFERENCE_TYPES};
pub use telemetry::init_tracing;

/// bitrix-sync version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
