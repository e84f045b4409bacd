#![forbid(unsafe_code)]

pub mod common;
pub mod image;
pub mod revision;

pub use common::{ContractViolation, UtcTimestamp, Validate};
