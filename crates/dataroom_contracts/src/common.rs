#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    #[error("invalid {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    #[error("invalid {field}: {got} exceeds maximum of {max}")]
    TooLarge {
        field: &'static str,
        max: u64,
        got: u64,
    },
}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

pub(crate) fn validate_text(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if value.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if value.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "exceeds max length",
        });
    }
    Ok(())
}

/// ISO-8601 UTC layout with millisecond precision, e.g. `2025-09-01T12:30:00.250Z`.
///
/// Every stamp has the same width, so lexicographic order equals chronological order.
const ISO_MILLIS: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UtcTimestamp(String);

impl UtcTimestamp {
    pub fn now() -> Result<Self, ContractViolation> {
        Self::from_datetime(OffsetDateTime::now_utc())
    }

    pub fn from_unix_millis(ms: i64) -> Result<Self, ContractViolation> {
        let dt = OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).map_err(
            |_| ContractViolation::InvalidValue {
                field: "utc_timestamp",
                reason: "unix millis out of range",
            },
        )?;
        Self::from_datetime(dt)
    }

    pub fn parse(value: &str) -> Result<Self, ContractViolation> {
        PrimitiveDateTime::parse(value, ISO_MILLIS).map_err(|_| {
            ContractViolation::InvalidValue {
                field: "utc_timestamp",
                reason: "must be ISO-8601 UTC with millisecond precision",
            }
        })?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_datetime(dt: OffsetDateTime) -> Result<Self, ContractViolation> {
        let utc = dt.to_offset(time::UtcOffset::UTC);
        let formatted = utc
            .format(ISO_MILLIS)
            .map_err(|_| ContractViolation::InvalidValue {
                field: "utc_timestamp",
                reason: "not representable as ISO-8601",
            })?;
        Ok(Self(formatted))
    }
}

impl fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UtcTimestamp {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UtcTimestamp> for String {
    fn from(value: UtcTimestamp) -> Self {
        value.0
    }
}
