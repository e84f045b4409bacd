#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use dataroom_contracts::image::{ImageId, ImageUpload, StoredImage};
use dataroom_contracts::revision::{
    MajorVersion, MinorVersion, PageId, PublishedSnapshot, RevisionData, RevisionKey,
    RevisionMeta, RevisionRecord, RevisionStatus,
};
use dataroom_contracts::{UtcTimestamp, Validate};

use crate::repo::{fresh_image_id, revision_key_text, ImageRepo, RevisionRepo};
use crate::workflow;
use crate::StorageError;

/// Process-local store with the same semantics as the SQLite backend.
///
/// Every mutation is planned against a snapshot of the page's rows before anything is
/// written, so a failed call leaves the store untouched.
#[derive(Debug, Default)]
pub struct InMemoryDataroomStore {
    // page -> revisions in insertion order
    revisions: BTreeMap<PageId, Vec<RevisionRecord>>,
    images: BTreeMap<ImageId, StoredImage>,
}

impl InMemoryDataroomStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    fn page_rows(&self, page: &PageId) -> &[RevisionRecord] {
        self.revisions.get(page).map(Vec::as_slice).unwrap_or(&[])
    }

    fn page_metas(&self, page: &PageId) -> Vec<RevisionMeta> {
        self.page_rows(page).iter().map(RevisionRecord::meta).collect()
    }

    fn insert_revision(&mut self, record: RevisionRecord) -> Result<(), StorageError> {
        record.validate()?;
        let rows = self.revisions.entry(record.page.clone()).or_default();
        if record.status == RevisionStatus::Draft
            && record.minor > MinorVersion::PUBLISHED
            && rows.iter().any(|r| {
                r.status == RevisionStatus::Draft
                    && r.version == record.version
                    && r.minor == record.minor
            })
        {
            return Err(StorageError::DuplicateKey {
                table: "revisions",
                key: revision_key_text(&record.page, record.version, Some(record.minor)),
            });
        }
        rows.push(record);
        Ok(())
    }
}

impl RevisionRepo for InMemoryDataroomStore {
    fn seed_if_empty(
        &mut self,
        page: &PageId,
        data: RevisionData,
        now: UtcTimestamp,
    ) -> Result<bool, StorageError> {
        if !self.page_rows(page).is_empty() {
            return Ok(false);
        }
        let key = RevisionKey::new(MajorVersion(1), MinorVersion::PUBLISHED);
        self.insert_revision(RevisionRecord::draft_v1(page.clone(), key, data, now)?)?;
        Ok(true)
    }

    fn published_snapshot(&self, page: &PageId) -> Result<PublishedSnapshot, StorageError> {
        let rows = self.page_rows(page);
        let metas = self.page_metas(page);
        Ok(match workflow::find_published(&metas) {
            Some(i) => PublishedSnapshot::from_record(&rows[i]),
            None => PublishedSnapshot::empty(page.clone()),
        })
    }

    fn list_revisions(&self, page: &PageId) -> Result<Vec<RevisionMeta>, StorageError> {
        let metas = self.page_metas(page);
        Ok(workflow::listing_indexes(&metas)
            .into_iter()
            .map(|i| metas[i].clone())
            .collect())
    }

    fn revision_rows(&self, page: &PageId) -> Result<Vec<RevisionRecord>, StorageError> {
        let rows = self.page_rows(page);
        let metas = self.page_metas(page);
        Ok(workflow::listing_indexes(&metas)
            .into_iter()
            .map(|i| rows[i].clone())
            .collect())
    }

    fn get_revision(
        &self,
        page: &PageId,
        version: MajorVersion,
        minor: Option<MinorVersion>,
    ) -> Result<RevisionRecord, StorageError> {
        let metas = self.page_metas(page);
        let i = workflow::find_for_read(&metas, version, minor).ok_or_else(|| {
            StorageError::not_found("revision", revision_key_text(page, version, minor))
        })?;
        Ok(self.page_rows(page)[i].clone())
    }

    fn create_draft(
        &mut self,
        page: &PageId,
        data: RevisionData,
        now: UtcTimestamp,
    ) -> Result<RevisionKey, StorageError> {
        let key = workflow::next_draft_key(&self.page_metas(page));
        self.insert_revision(RevisionRecord::draft_v1(page.clone(), key, data, now)?)?;
        tracing::info!(
            page = page.as_str(),
            version = key.version.0,
            minor = key.minor.0,
            "created draft revision"
        );
        Ok(key)
    }

    fn update_draft(
        &mut self,
        page: &PageId,
        version: MajorVersion,
        minor: Option<MinorVersion>,
        data: RevisionData,
        now: UtcTimestamp,
    ) -> Result<RevisionKey, StorageError> {
        let i = workflow::find_update_target(&self.page_metas(page), version, minor)
            .ok_or_else(|| {
                StorageError::not_found("draft revision", revision_key_text(page, version, minor))
            })?;
        let rows = self
            .revisions
            .get_mut(page)
            .ok_or_else(|| StorageError::not_found("page", page.as_str()))?;
        let row = &mut rows[i];
        row.data = data;
        row.updated_at = now;
        Ok(row.key())
    }

    fn publish(
        &mut self,
        page: &PageId,
        version: MajorVersion,
        minor: Option<MinorVersion>,
        now: UtcTimestamp,
    ) -> Result<RevisionKey, StorageError> {
        let plan = workflow::plan_publish(&self.page_metas(page), version, minor).ok_or_else(
            || StorageError::not_found("revision", revision_key_text(page, version, minor)),
        )?;
        let rows = self
            .revisions
            .get_mut(page)
            .ok_or_else(|| StorageError::not_found("page", page.as_str()))?;

        if plan.normalize_target {
            rows[plan.target].status = RevisionStatus::Draft;
            rows[plan.target].updated_at = now.clone();
        }
        if let Some(prev) = plan.archive {
            rows[prev].status = RevisionStatus::Archived;
            rows[prev].updated_at = now.clone();
        }
        let target = &mut rows[plan.target];
        target.status = RevisionStatus::Published;
        target.minor = MinorVersion::PUBLISHED;
        target.updated_at = now;
        tracing::info!(
            page = page.as_str(),
            version = target.version.0,
            archived = plan.archive.is_some(),
            "published revision"
        );
        Ok(target.key())
    }
}

impl ImageRepo for InMemoryDataroomStore {
    fn insert_image(
        &mut self,
        upload: ImageUpload,
        now: UtcTimestamp,
    ) -> Result<ImageId, StorageError> {
        upload.validate()?;
        let id = fresh_image_id()?;
        if self.images.contains_key(&id) {
            return Err(StorageError::DuplicateKey {
                table: "images",
                key: id.as_str().to_string(),
            });
        }
        self.images
            .insert(id.clone(), StoredImage::from_upload(id.clone(), upload, now));
        Ok(id)
    }

    fn get_image(&self, id: &ImageId) -> Result<StoredImage, StorageError> {
        self.images
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("image", id.as_str()))
    }
}
