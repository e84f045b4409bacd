#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use dataroom_contracts::image::{ImageId, ImageUpload, StoredImage};
use dataroom_contracts::revision::{
    MajorVersion, MinorVersion, PageId, PublishedSnapshot, RevisionData, RevisionMeta,
    RevisionRecord, RevisionStatus,
};
use dataroom_contracts::{ContractViolation, UtcTimestamp};
use dataroom_storage::{DataroomStore, StorageError, StorageErrorKind};

pub mod config;
pub mod http;

pub use config::{AdapterConfig, ConfigError, StoreLocation};

pub mod seed_assets {
    use dataroom_contracts::revision::RevisionData;
    use dataroom_contracts::ContractViolation;

    pub const DEFAULT_DATAROOM_JSON: &str = include_str!("seed/default_dataroom.json");

    /// Category tiles the data room starts with before anyone edits it.
    pub fn default_dataroom_data() -> Result<RevisionData, ContractViolation> {
        RevisionData::from_json_str(DEFAULT_DATAROOM_JSON)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("No file uploaded")]
    MissingFile,
    #[error("file exceeds the {max_bytes} byte upload limit")]
    PayloadTooLarge { max_bytes: usize },
    #[error("adapter runtime lock poisoned")]
    LockPoisoned,
    #[error("clock unavailable: {0}")]
    Clock(ContractViolation),
}

/// Caller-correctable vs. server-side, mirroring the storage taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    NotFound,
    Validation,
    TooLarge,
    Internal,
}

impl AdapterError {
    pub fn kind(&self) -> AdapterErrorKind {
        match self {
            AdapterError::Storage(err) => match err.kind() {
                StorageErrorKind::NotFound => AdapterErrorKind::NotFound,
                StorageErrorKind::Validation => match err {
                    StorageError::ContractViolation(ContractViolation::TooLarge { .. }) => {
                        AdapterErrorKind::TooLarge
                    }
                    _ => AdapterErrorKind::Validation,
                },
                StorageErrorKind::Storage => AdapterErrorKind::Internal,
            },
            AdapterError::InvalidRequest(_) | AdapterError::MissingFile => {
                AdapterErrorKind::Validation
            }
            AdapterError::PayloadTooLarge { .. } => AdapterErrorKind::TooLarge,
            AdapterError::LockPoisoned | AdapterError::Clock(_) => AdapterErrorKind::Internal,
        }
    }
}

impl From<ContractViolation> for AdapterError {
    fn from(v: ContractViolation) -> Self {
        AdapterError::Storage(StorageError::ContractViolation(v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionResponse {
    pub version: MajorVersion,
    pub minor: MinorVersion,
    pub status: RevisionStatus,
    pub data: RevisionData,
    pub created_at: UtcTimestamp,
    pub updated_at: UtcTimestamp,
}

impl From<RevisionRecord> for RevisionResponse {
    fn from(r: RevisionRecord) -> Self {
        Self {
            version: r.version,
            minor: r.minor,
            status: r.status,
            data: r.data,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CreateDraftResponse {
    pub ok: bool,
    pub version: MajorVersion,
    pub minor: MinorVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ImageUploadResponse {
    pub id: ImageId,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Editor payload for create/update. A missing or null `data` means an empty payload.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RevisionBody {
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RevisionBody {
    /// An empty body is accepted the same as `{}`.
    pub fn parse(raw: &[u8]) -> Result<Self, AdapterError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(raw)
            .map_err(|err| AdapterError::InvalidRequest(format!("invalid JSON body: {err}")))
    }

    pub fn into_data(self) -> Result<RevisionData, AdapterError> {
        Ok(RevisionData::from_json(self.data)?)
    }
}

/// Request-scoped operations over one page of one store.
pub struct AdapterRuntime {
    store: Box<dyn DataroomStore>,
    page: PageId,
}

pub type SharedRuntime = Arc<Mutex<AdapterRuntime>>;

impl AdapterRuntime {
    /// Wraps `store` and, when `seed` is given, performs the one-time seed of an empty page.
    pub fn new(
        mut store: Box<dyn DataroomStore>,
        page: PageId,
        seed: Option<RevisionData>,
    ) -> Result<Self, AdapterError> {
        if let Some(data) = seed {
            let seeded = store.seed_if_empty(&page, data, now()?)?;
            if seeded {
                tracing::info!(page = page.as_str(), "seeded initial draft revision v1");
            }
        }
        Ok(Self { store, page })
    }

    pub fn from_config(config: &AdapterConfig) -> Result<Self, AdapterError> {
        let store = config.store.open()?;
        let seed = if config.seed_on_empty {
            Some(seed_assets::default_dataroom_data()?)
        } else {
            None
        };
        Self::new(store, config.page.clone(), seed)
    }

    pub fn into_shared(self) -> SharedRuntime {
        Arc::new(Mutex::new(self))
    }

    pub fn page(&self) -> &PageId {
        &self.page
    }

    pub fn published(&self) -> Result<PublishedSnapshot, AdapterError> {
        Ok(self.store.published_snapshot(&self.page)?)
    }

    pub fn list_revisions(&self) -> Result<Vec<RevisionMeta>, AdapterError> {
        Ok(self.store.list_revisions(&self.page)?)
    }

    pub fn get_revision(
        &self,
        version: MajorVersion,
        minor: Option<MinorVersion>,
    ) -> Result<RevisionResponse, AdapterError> {
        Ok(self.store.get_revision(&self.page, version, minor)?.into())
    }

    pub fn create_draft(
        &mut self,
        body: RevisionBody,
    ) -> Result<CreateDraftResponse, AdapterError> {
        let data = body.into_data()?;
        let key = self.store.create_draft(&self.page, data, now()?)?;
        Ok(CreateDraftResponse {
            ok: true,
            version: key.version,
            minor: key.minor,
        })
    }

    pub fn update_draft(
        &mut self,
        version: MajorVersion,
        minor: Option<MinorVersion>,
        body: RevisionBody,
    ) -> Result<OkResponse, AdapterError> {
        let data = body.into_data()?;
        self.store.update_draft(&self.page, version, minor, data, now()?)?;
        Ok(OkResponse { ok: true })
    }

    pub fn publish(
        &mut self,
        version: MajorVersion,
        minor: Option<MinorVersion>,
    ) -> Result<OkResponse, AdapterError> {
        self.store.publish(&self.page, version, minor, now()?)?;
        Ok(OkResponse { ok: true })
    }

    pub fn upload_image(
        &mut self,
        data: Vec<u8>,
        content_type: Option<String>,
        original_name: Option<String>,
    ) -> Result<ImageUploadResponse, AdapterError> {
        let upload = ImageUpload::v1(data, content_type, original_name)?;
        let id = self.store.insert_image(upload, now()?)?;
        Ok(ImageUploadResponse { id })
    }

    pub fn fetch_image(&self, id: &ImageId) -> Result<StoredImage, AdapterError> {
        Ok(self.store.get_image(id)?)
    }
}

fn now() -> Result<UtcTimestamp, AdapterError> {
    UtcTimestamp::now().map_err(AdapterError::Clock)
}
