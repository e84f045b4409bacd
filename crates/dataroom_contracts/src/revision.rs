#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::validate_text;
use crate::{ContractViolation, UtcTimestamp, Validate};

/// The only page the data room has ever served.
pub const DEFAULT_PAGE: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PageId(String);

impl PageId {
    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(v.into());
        v.validate()?;
        Ok(v)
    }

    pub fn main() -> Self {
        Self(DEFAULT_PAGE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for PageId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("page_id", &self.0, 64)?;
        if !self
            .0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ContractViolation::InvalidValue {
                field: "page_id",
                reason: "must contain only [A-Za-z0-9_-]",
            });
        }
        Ok(())
    }
}

impl TryFrom<String> for PageId {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PageId> for String {
    fn from(value: PageId) -> Self {
        value.0
    }
}

/// Major revision number; a publish-eligible lineage of edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MajorVersion(pub u32);

impl MajorVersion {
    pub fn new(v: u32) -> Result<Self, ContractViolation> {
        let v = Self(v);
        v.validate()?;
        Ok(v)
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl Validate for MajorVersion {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "major_version",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

/// Sub-revision within a major version. `0` is the published slot.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MinorVersion(pub u32);

impl MinorVersion {
    pub const PUBLISHED: MinorVersion = MinorVersion(0);
    pub const FIRST_DRAFT: MinorVersion = MinorVersion(1);

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionStatus {
    Draft,
    Published,
    Archived,
}

impl RevisionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RevisionStatus::Draft => "draft",
            RevisionStatus::Published => "published",
            RevisionStatus::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ContractViolation> {
        match value {
            "draft" => Ok(RevisionStatus::Draft),
            "published" => Ok(RevisionStatus::Published),
            "archived" => Ok(RevisionStatus::Archived),
            _ => Err(ContractViolation::InvalidValue {
                field: "revision_status",
                reason: "must be one of draft|published|archived",
            }),
        }
    }
}

/// Ordered category records. The store never looks inside an element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionData(Vec<serde_json::Value>);

impl RevisionData {
    pub fn new(items: Vec<serde_json::Value>) -> Self {
        Self(items)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, ContractViolation> {
        match value {
            serde_json::Value::Array(items) => Ok(Self(items)),
            serde_json::Value::Null => Ok(Self::empty()),
            _ => Err(ContractViolation::InvalidValue {
                field: "revision_data",
                reason: "must be a JSON array",
            }),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ContractViolation> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|_| ContractViolation::InvalidValue {
                field: "revision_data",
                reason: "must be valid JSON",
            })?;
        Self::from_json(value)
    }

    pub fn to_json_string(&self) -> String {
        serde_json::Value::Array(self.0.clone()).to_string()
    }

    pub fn items(&self) -> &[serde_json::Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RevisionKey {
    pub version: MajorVersion,
    pub minor: MinorVersion,
}

impl RevisionKey {
    pub fn new(version: MajorVersion, minor: MinorVersion) -> Self {
        Self { version, minor }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevisionRecord {
    pub page: PageId,
    pub version: MajorVersion,
    pub minor: MinorVersion,
    pub status: RevisionStatus,
    pub data: RevisionData,
    pub created_at: UtcTimestamp,
    pub updated_at: UtcTimestamp,
}

impl RevisionRecord {
    pub fn draft_v1(
        page: PageId,
        key: RevisionKey,
        data: RevisionData,
        now: UtcTimestamp,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            page,
            version: key.version,
            minor: key.minor,
            status: RevisionStatus::Draft,
            data,
            created_at: now.clone(),
            updated_at: now,
        };
        r.validate()?;
        Ok(r)
    }

    pub fn key(&self) -> RevisionKey {
        RevisionKey::new(self.version, self.minor)
    }

    pub fn meta(&self) -> RevisionMeta {
        RevisionMeta {
            version: self.version,
            minor: self.minor,
            status: self.status,
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

impl Validate for RevisionRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.page.validate()?;
        self.version.validate()?;
        if self.status == RevisionStatus::Published && self.minor != MinorVersion::PUBLISHED {
            return Err(ContractViolation::InvalidValue {
                field: "revision_record.minor",
                reason: "published revisions must have minor = 0",
            });
        }
        Ok(())
    }
}

/// Revision listing row; carries everything except the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionMeta {
    pub version: MajorVersion,
    pub minor: MinorVersion,
    pub status: RevisionStatus,
    pub created_at: UtcTimestamp,
    pub updated_at: UtcTimestamp,
}

/// What readers of "the current data" get: the published payload, or an
/// empty payload at version 0 before the first publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedSnapshot {
    pub page: PageId,
    pub data: RevisionData,
    pub version: u32,
}

impl PublishedSnapshot {
    pub fn empty(page: PageId) -> Self {
        Self {
            page,
            data: RevisionData::empty(),
            version: 0,
        }
    }

    pub fn from_record(record: &RevisionRecord) -> Self {
        Self {
            page: record.page.clone(),
            data: record.data.clone(),
            version: record.version.0,
        }
    }
}
