#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dataroom_contracts::image::{ImageId, ImageUpload, StoredImage};
use dataroom_contracts::revision::{
    MajorVersion, MinorVersion, PageId, PublishedSnapshot, RevisionData, RevisionKey,
    RevisionMeta, RevisionRecord, RevisionStatus,
};
use dataroom_contracts::{ContractViolation, UtcTimestamp, Validate};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};

use crate::repo::{fresh_image_id, revision_key_text, ImageRepo, RevisionRepo};
use crate::workflow;
use crate::StorageError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS revisions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page TEXT NOT NULL,
    version INTEGER NOT NULL CHECK (version >= 1),
    minor INTEGER NOT NULL CHECK (minor >= 0),
    status TEXT NOT NULL CHECK (status IN ('draft', 'published', 'archived')),
    data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (status <> 'published' OR minor = 0)
);
CREATE INDEX IF NOT EXISTS revisions_by_page_version
    ON revisions(page, version, minor);
CREATE UNIQUE INDEX IF NOT EXISTS revisions_single_published
    ON revisions(page) WHERE status = 'published';
CREATE UNIQUE INDEX IF NOT EXISTS revisions_unique_draft_minor
    ON revisions(page, version, minor) WHERE status = 'draft' AND minor > 0;
CREATE TABLE IF NOT EXISTS images (
    id TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    content_type TEXT NOT NULL,
    original_name TEXT,
    created_at TEXT NOT NULL
);
"#;

/// Durable store over a single SQLite database.
///
/// Writers run under `BEGIN IMMEDIATE`, so concurrent processes sharing the file
/// serialize on the database write lock; the partial unique indexes back up the
/// one-published-per-page and unique-draft-minor invariants.
#[derive(Debug)]
pub struct SqliteDataroomStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteDataroomStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                StorageError::backend(
                    "creating store directory",
                    format!("'{}': {err}", parent.display()),
                )
            })?;
        }
        let conn = Connection::open(path).map_err(sql("opening store"))?;
        let store = Self::from_connection(conn, Some(path.to_path_buf()))?;
        tracing::info!(path = %path.display(), "opened sqlite data room store");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(sql("opening in-memory store"))?;
        Self::from_connection(conn, None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self, StorageError> {
        conn.busy_timeout(Duration::from_secs(10))
            .map_err(sql("setting busy timeout"))?;
        // WAL only applies to file-backed databases
        if path.is_some() {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })
            .map_err(sql("enabling WAL"))?;
        }
        conn.execute_batch(SCHEMA)
            .map_err(sql("initializing schema"))?;
        Ok(Self { conn, path })
    }
}

fn sql(context: &'static str) -> impl Fn(rusqlite::Error) -> StorageError {
    move |err| StorageError::backend(context, err.to_string())
}

fn insert_failure(
    table: &'static str,
    key: String,
    context: &'static str,
    err: rusqlite::Error,
) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StorageError::DuplicateKey { table, key }
        }
        _ => StorageError::backend(context, err.to_string()),
    }
}

fn corrupt(context: &'static str) -> impl Fn(ContractViolation) -> StorageError {
    move |v| StorageError::backend(context, v.to_string())
}

type RawMeta = (i64, u32, u32, String, String, String);

fn decode_meta(raw: RawMeta) -> Result<(i64, RevisionMeta), StorageError> {
    let (id, version, minor, status, created_at, updated_at) = raw;
    let decode = corrupt("decoding revision row");
    Ok((
        id,
        RevisionMeta {
            version: MajorVersion::new(version).map_err(&decode)?,
            minor: MinorVersion(minor),
            status: RevisionStatus::parse(&status).map_err(&decode)?,
            created_at: UtcTimestamp::parse(&created_at).map_err(&decode)?,
            updated_at: UtcTimestamp::parse(&updated_at).map_err(&decode)?,
        },
    ))
}

/// Row ids and metadata for a page, in insertion order.
fn load_slots(
    conn: &Connection,
    page: &PageId,
) -> Result<(Vec<i64>, Vec<RevisionMeta>), StorageError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, version, minor, status, created_at, updated_at \
             FROM revisions WHERE page = ?1 ORDER BY id ASC",
        )
        .map_err(sql("listing revisions"))?;
    let raw = stmt
        .query_map(params![page.as_str()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .map_err(sql("listing revisions"))?
        .collect::<rusqlite::Result<Vec<RawMeta>>>()
        .map_err(sql("listing revisions"))?;

    let mut ids = Vec::with_capacity(raw.len());
    let mut metas = Vec::with_capacity(raw.len());
    for r in raw {
        let (id, meta) = decode_meta(r)?;
        ids.push(id);
        metas.push(meta);
    }
    Ok((ids, metas))
}

fn fetch_record(
    conn: &Connection,
    page: &PageId,
    id: i64,
) -> Result<RevisionRecord, StorageError> {
    let raw = conn
        .query_row(
            "SELECT id, version, minor, status, created_at, updated_at, data \
             FROM revisions WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    (
                        row.get::<_, i64>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ),
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()
        .map_err(sql("reading revision"))?;
    let (meta_raw, data) =
        raw.ok_or_else(|| StorageError::not_found("revision", format!("row {id}")))?;
    let (_, meta) = decode_meta(meta_raw)?;
    Ok(RevisionRecord {
        page: page.clone(),
        version: meta.version,
        minor: meta.minor,
        status: meta.status,
        data: RevisionData::from_json_str(&data).map_err(corrupt("decoding revision data"))?,
        created_at: meta.created_at,
        updated_at: meta.updated_at,
    })
}

fn insert_revision(conn: &Connection, record: &RevisionRecord) -> Result<(), StorageError> {
    record.validate()?;
    conn.execute(
        "INSERT INTO revisions(page, version, minor, status, data, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.page.as_str(),
            record.version.0,
            record.minor.0,
            record.status.as_str(),
            record.data.to_json_string(),
            record.created_at.as_str(),
            record.updated_at.as_str(),
        ],
    )
    .map_err(|err| {
        insert_failure(
            "revisions",
            revision_key_text(&record.page, record.version, Some(record.minor)),
            "inserting revision",
            err,
        )
    })?;
    Ok(())
}

fn set_status(
    conn: &Connection,
    id: i64,
    status: RevisionStatus,
    now: &UtcTimestamp,
) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE revisions SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now.as_str(), id],
    )
    .map_err(sql("relabelling revision"))?;
    Ok(())
}

impl RevisionRepo for SqliteDataroomStore {
    fn seed_if_empty(
        &mut self,
        page: &PageId,
        data: RevisionData,
        now: UtcTimestamp,
    ) -> Result<bool, StorageError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql("starting seed transaction"))?;
        let count: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM revisions WHERE page = ?1",
                params![page.as_str()],
                |row| row.get(0),
            )
            .map_err(sql("counting revisions"))?;
        if count > 0 {
            return Ok(false);
        }
        let key = RevisionKey::new(MajorVersion(1), MinorVersion::PUBLISHED);
        insert_revision(&tx, &RevisionRecord::draft_v1(page.clone(), key, data, now)?)?;
        tx.commit().map_err(sql("committing seed"))?;
        Ok(true)
    }

    fn published_snapshot(&self, page: &PageId) -> Result<PublishedSnapshot, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT version, data FROM revisions \
                 WHERE page = ?1 AND status = 'published' \
                 ORDER BY updated_at DESC, id DESC LIMIT 1",
                params![page.as_str()],
                |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(sql("reading published revision"))?;
        let Some((version, data)) = row else {
            return Ok(PublishedSnapshot::empty(page.clone()));
        };
        Ok(PublishedSnapshot {
            page: page.clone(),
            data: RevisionData::from_json_str(&data).map_err(corrupt("decoding revision data"))?,
            version,
        })
    }

    fn list_revisions(&self, page: &PageId) -> Result<Vec<RevisionMeta>, StorageError> {
        let (_, metas) = load_slots(&self.conn, page)?;
        Ok(workflow::listing_indexes(&metas)
            .into_iter()
            .map(|i| metas[i].clone())
            .collect())
    }

    fn revision_rows(&self, page: &PageId) -> Result<Vec<RevisionRecord>, StorageError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(sql("starting read transaction"))?;
        let (ids, metas) = load_slots(&tx, page)?;
        let rows = workflow::listing_indexes(&metas)
            .into_iter()
            .map(|i| fetch_record(&tx, page, ids[i]))
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit().map_err(sql("finishing read transaction"))?;
        Ok(rows)
    }

    fn get_revision(
        &self,
        page: &PageId,
        version: MajorVersion,
        minor: Option<MinorVersion>,
    ) -> Result<RevisionRecord, StorageError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(sql("starting read transaction"))?;
        let (ids, metas) = load_slots(&tx, page)?;
        let i = workflow::find_for_read(&metas, version, minor).ok_or_else(|| {
            StorageError::not_found("revision", revision_key_text(page, version, minor))
        })?;
        let record = fetch_record(&tx, page, ids[i])?;
        tx.commit().map_err(sql("finishing read transaction"))?;
        Ok(record)
    }

    fn create_draft(
        &mut self,
        page: &PageId,
        data: RevisionData,
        now: UtcTimestamp,
    ) -> Result<RevisionKey, StorageError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql("starting draft transaction"))?;
        let (_, metas) = load_slots(&tx, page)?;
        let key = workflow::next_draft_key(&metas);
        insert_revision(&tx, &RevisionRecord::draft_v1(page.clone(), key, data, now)?)?;
        tx.commit().map_err(sql("committing draft"))?;
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
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql("starting update transaction"))?;
        let (ids, metas) = load_slots(&tx, page)?;
        let i = workflow::find_update_target(&metas, version, minor).ok_or_else(|| {
            StorageError::not_found("draft revision", revision_key_text(page, version, minor))
        })?;
        let changed = tx
            .execute(
                "UPDATE revisions SET data = ?1, updated_at = ?2 \
                 WHERE id = ?3 AND status = 'draft'",
                params![data.to_json_string(), now.as_str(), ids[i]],
            )
            .map_err(sql("updating draft"))?;
        if changed != 1 {
            return Err(StorageError::not_found(
                "draft revision",
                revision_key_text(page, version, minor),
            ));
        }
        tx.commit().map_err(sql("committing draft update"))?;
        Ok(RevisionKey::new(metas[i].version, metas[i].minor))
    }

    fn publish(
        &mut self,
        page: &PageId,
        version: MajorVersion,
        minor: Option<MinorVersion>,
        now: UtcTimestamp,
    ) -> Result<RevisionKey, StorageError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql("starting publish transaction"))?;
        let (ids, metas) = load_slots(&tx, page)?;
        let plan = workflow::plan_publish(&metas, version, minor).ok_or_else(|| {
            StorageError::not_found("revision", revision_key_text(page, version, minor))
        })?;
        let target_id = ids[plan.target];

        if plan.normalize_target {
            set_status(&tx, target_id, RevisionStatus::Draft, &now)?;
        }
        if let Some(prev) = plan.archive {
            set_status(&tx, ids[prev], RevisionStatus::Archived, &now)?;
        }
        tx.execute(
            "UPDATE revisions SET status = 'published', minor = 0, updated_at = ?1 WHERE id = ?2",
            params![now.as_str(), target_id],
        )
        .map_err(sql("publishing revision"))?;
        tx.commit().map_err(sql("committing publish"))?;

        let published_version = metas[plan.target].version;
        tracing::info!(
            page = page.as_str(),
            version = published_version.0,
            archived = plan.archive.is_some(),
            "published revision"
        );
        Ok(RevisionKey::new(published_version, MinorVersion::PUBLISHED))
    }
}

impl ImageRepo for SqliteDataroomStore {
    fn insert_image(
        &mut self,
        upload: ImageUpload,
        now: UtcTimestamp,
    ) -> Result<ImageId, StorageError> {
        upload.validate()?;
        let id = fresh_image_id()?;
        self.conn
            .execute(
                "INSERT INTO images(id, data, content_type, original_name, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.as_str(),
                    upload.data,
                    upload.content_type,
                    upload.original_name,
                    now.as_str(),
                ],
            )
            .map_err(|err| {
                insert_failure("images", id.as_str().to_string(), "inserting image", err)
            })?;
        Ok(id)
    }

    fn get_image(&self, id: &ImageId) -> Result<StoredImage, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT data, content_type, original_name, created_at FROM images WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(sql("reading image"))?;
        let (data, content_type, original_name, created_at) =
            row.ok_or_else(|| StorageError::not_found("image", id.as_str()))?;
        Ok(StoredImage {
            id: id.clone(),
            data,
            content_type,
            original_name,
            created_at: UtcTimestamp::parse(&created_at).map_err(corrupt("decoding image row"))?,
        })
    }
}
