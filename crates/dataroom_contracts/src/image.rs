#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::validate_text;
use crate::{ContractViolation, UtcTimestamp, Validate};

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_IMAGE_CONTENT_TYPE: &str = "application/octet-stream";

/// 12 random bytes rendered as 24 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageId(String);

impl ImageId {
    pub const HEX_LEN: usize = 24;

    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(v.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for ImageId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.len() != Self::HEX_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "image_id",
                reason: "must be 24 hex characters",
            });
        }
        if !self
            .0
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(ContractViolation::InvalidValue {
                field: "image_id",
                reason: "must be lowercase hex",
            });
        }
        Ok(())
    }
}

impl TryFrom<String> for ImageId {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ImageId> for String {
    fn from(value: ImageId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub content_type: String,
    pub original_name: Option<String>,
}

impl ImageUpload {
    /// A missing or blank content type falls back to `application/octet-stream`.
    pub fn v1(
        data: Vec<u8>,
        content_type: Option<String>,
        original_name: Option<String>,
    ) -> Result<Self, ContractViolation> {
        let content_type = content_type
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_CONTENT_TYPE.to_string());
        let original_name = original_name.filter(|v| !v.trim().is_empty());
        let r = Self {
            data,
            content_type,
            original_name,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for ImageUpload {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.data.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "image_upload.data",
                reason: "must not be empty",
            });
        }
        if self.data.len() > MAX_IMAGE_BYTES {
            return Err(ContractViolation::TooLarge {
                field: "image_upload.data",
                max: MAX_IMAGE_BYTES as u64,
                got: self.data.len() as u64,
            });
        }
        validate_text("image_upload.content_type", &self.content_type, 255)?;
        if let Some(name) = &self.original_name {
            validate_text("image_upload.original_name", name, 1024)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub id: ImageId,
    pub data: Vec<u8>,
    pub content_type: String,
    pub original_name: Option<String>,
    pub created_at: UtcTimestamp,
}

impl StoredImage {
    pub fn from_upload(id: ImageId, upload: ImageUpload, created_at: UtcTimestamp) -> Self {
        Self {
            id,
            data: upload.data,
            content_type: upload.content_type,
            original_name: upload.original_name,
            created_at,
        }
    }
}
