#![forbid(unsafe_code)]

use dataroom_contracts::image::{ImageId, ImageUpload, StoredImage};
use dataroom_contracts::revision::{
    MajorVersion, MinorVersion, PageId, PublishedSnapshot, RevisionData, RevisionKey,
    RevisionMeta, RevisionRecord,
};
use dataroom_contracts::UtcTimestamp;

use crate::StorageError;

/// Typed repository interface for the per-page revision history and its publish gate.
///
/// Writers take `now` from the caller; the store never reads the clock itself.
pub trait RevisionRepo {
    /// Inserts `(version 1, minor 0, draft)` when the page has no revisions at all.
    /// Returns whether a row was written.
    fn seed_if_empty(
        &mut self,
        page: &PageId,
        data: RevisionData,
        now: UtcTimestamp,
    ) -> Result<bool, StorageError>;

    /// The published payload, or an empty version-0 snapshot before the first publish.
    fn published_snapshot(&self, page: &PageId) -> Result<PublishedSnapshot, StorageError>;

    /// Metadata ordered by version desc, minor desc, updated_at desc.
    fn list_revisions(&self, page: &PageId) -> Result<Vec<RevisionMeta>, StorageError>;

    /// Full rows in listing order, payload included. An audit and export read; no HTTP
    /// route exposes it.
    fn revision_rows(&self, page: &PageId) -> Result<Vec<RevisionRecord>, StorageError>;

    /// Exact lookup when `minor` is given; otherwise the published revision at
    /// `version`, falling back to its highest minor.
    fn get_revision(
        &self,
        page: &PageId,
        version: MajorVersion,
        minor: Option<MinorVersion>,
    ) -> Result<RevisionRecord, StorageError>;

    /// New draft at (published version + 1, max minor + 1).
    fn create_draft(
        &mut self,
        page: &PageId,
        data: RevisionData,
        now: UtcTimestamp,
    ) -> Result<RevisionKey, StorageError>;

    /// Overwrites the payload of an existing draft. Never touches published or archived rows.
    fn update_draft(
        &mut self,
        page: &PageId,
        version: MajorVersion,
        minor: Option<MinorVersion>,
        data: RevisionData,
        now: UtcTimestamp,
    ) -> Result<RevisionKey, StorageError>;

    /// Archives the current published revision and publishes the target at minor 0,
    /// all or nothing.
    fn publish(
        &mut self,
        page: &PageId,
        version: MajorVersion,
        minor: Option<MinorVersion>,
        now: UtcTimestamp,
    ) -> Result<RevisionKey, StorageError>;
}

/// Typed repository interface for uploaded image blobs.
pub trait ImageRepo {
    fn insert_image(
        &mut self,
        upload: ImageUpload,
        now: UtcTimestamp,
    ) -> Result<ImageId, StorageError>;

    fn get_image(&self, id: &ImageId) -> Result<StoredImage, StorageError>;
}

/// Everything the HTTP adapter needs from one backing store.
pub trait DataroomStore: RevisionRepo + ImageRepo + Send {}

impl<T> DataroomStore for T where T: RevisionRepo + ImageRepo + Send {}

pub(crate) fn fresh_image_id() -> Result<ImageId, StorageError> {
    let bytes: [u8; 12] = rand::random();
    Ok(ImageId::new(hex::encode(bytes))?)
}

pub(crate) fn revision_key_text(
    page: &PageId,
    version: MajorVersion,
    minor: Option<MinorVersion>,
) -> String {
    match minor {
        Some(minor) => format!("{}/{}.{}", page.as_str(), version.0, minor.0),
        None => format!("{}/{}", page.as_str(), version.0),
    }
}
