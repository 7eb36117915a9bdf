//! Typed, retrying, paginating client for the Bitrix24 REST-over-webhook
//! API: entity list/get/fields/userfield calls, webhook registration, and
//! the key-normalization and error-classification helpers it depends on.

pub mod client;
pub mod error;
pub mod field_types;
pub mod normalize;

pub use client::BitrixClient;
pub use error::{classify_error_code, reclassify_if_time_limit};
pub use normalize::{camel_to_upper_snake, normalize_keys};
