//! Common types, protocol definitions, and errors shared by the PII gateway
//! and its callers.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
