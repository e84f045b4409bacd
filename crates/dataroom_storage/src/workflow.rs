#![forbid(unsafe_code)]

//! Revision selection rules shared by every store backend.
//!
//! Each function takes a page's revisions in insertion order and returns an index into
//! that slice. When two candidates rank equally the later insertion wins.

use std::cmp::Ordering;

use dataroom_contracts::revision::{
    MajorVersion, MinorVersion, RevisionKey, RevisionMeta, RevisionStatus,
};

/// Listing order: version desc, minor desc, updated_at desc.
pub fn listing_order(a: &RevisionMeta, b: &RevisionMeta) -> Ordering {
    b.version
        .cmp(&a.version)
        .then_with(|| b.minor.cmp(&a.minor))
        .then_with(|| b.updated_at.cmp(&a.updated_at))
}

/// Indexes of `rows` in listing order. Stable, so ties keep insertion order.
pub fn listing_indexes(rows: &[RevisionMeta]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..rows.len()).collect();
    idx.sort_by(|&a, &b| listing_order(&rows[a], &rows[b]));
    idx
}

pub fn find_published(rows: &[RevisionMeta]) -> Option<usize> {
    last_max_by(
        rows,
        |r| r.status == RevisionStatus::Published,
        |r| r.updated_at.clone(),
    )
}

/// Key for the next draft: one major past the published version (or 1), one minor past
/// the highest minor already used at that major (or 1).
pub fn next_draft_key(rows: &[RevisionMeta]) -> RevisionKey {
    let base = find_published(rows).map(|i| rows[i].version.0).unwrap_or(0);
    let version = MajorVersion(base).next();
    let minor = rows
        .iter()
        .filter(|r| r.version == version)
        .map(|r| r.minor)
        .max()
        .map(MinorVersion::next)
        .unwrap_or(MinorVersion::FIRST_DRAFT);
    RevisionKey::new(version, minor)
}

/// Exact `(version, minor)` match. Several rows can share `(v, 0)` once a major has been
/// published more than once; the published one wins, then the most recently updated.
pub fn find_exact(
    rows: &[RevisionMeta],
    version: MajorVersion,
    minor: MinorVersion,
) -> Option<usize> {
    last_max_by(
        rows,
        |r| r.version == version && r.minor == minor,
        |r| (r.status == RevisionStatus::Published, r.updated_at.clone()),
    )
}

/// Read-side resolution for a major version.
pub fn find_for_read(
    rows: &[RevisionMeta],
    version: MajorVersion,
    minor: Option<MinorVersion>,
) -> Option<usize> {
    if let Some(minor) = minor {
        return find_exact(rows, version, minor);
    }
    let published = last_max_by(
        rows,
        |r| r.version == version && r.status == RevisionStatus::Published,
        |r| r.updated_at.clone(),
    );
    published.or_else(|| {
        last_max_by(
            rows,
            |r| r.version == version,
            |r| (r.minor, r.updated_at.clone()),
        )
    })
}

/// Draft that an update lands on: the exact minor when given, else the highest-minor
/// draft at `version`. Published and archived rows never qualify.
pub fn find_update_target(
    rows: &[RevisionMeta],
    version: MajorVersion,
    minor: Option<MinorVersion>,
) -> Option<usize> {
    last_max_by(
        rows,
        |r| {
            r.version == version
                && r.status == RevisionStatus::Draft
                && minor.map_or(true, |m| r.minor == m)
        },
        |r| (r.minor, r.updated_at.clone()),
    )
}

/// Publish target: the exact minor when given, else the latest non-archived revision
/// at `version`.
pub fn find_publish_target(
    rows: &[RevisionMeta],
    version: MajorVersion,
    minor: Option<MinorVersion>,
) -> Option<usize> {
    if let Some(minor) = minor {
        return find_exact(rows, version, minor);
    }
    last_max_by(
        rows,
        |r| r.version == version && r.status != RevisionStatus::Archived,
        |r| (r.minor, r.updated_at.clone()),
    )
}

/// The relabelling a publish performs, expressed as row indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishPlan {
    pub target: usize,
    /// Target already carries `published`; it is relabelled `draft` before anything else.
    pub normalize_target: bool,
    /// A different row currently published; it becomes `archived`.
    pub archive: Option<usize>,
}

pub fn plan_publish(
    rows: &[RevisionMeta],
    version: MajorVersion,
    minor: Option<MinorVersion>,
) -> Option<PublishPlan> {
    let target = find_publish_target(rows, version, minor)?;
    let normalize_target = rows[target].status == RevisionStatus::Published;
    let archive = last_max_by(
        rows,
        |r| r.status == RevisionStatus::Published,
        |r| r.updated_at.clone(),
    )
    .filter(|&i| i != target);
    Some(PublishPlan {
        target,
        normalize_target,
        archive,
    })
}

fn last_max_by<K, F, R>(rows: &[RevisionMeta], mut filter: F, mut rank: R) -> Option<usize>
where
    K: Ord,
    F: FnMut(&RevisionMeta) -> bool,
    R: FnMut(&RevisionMeta) -> K,
{
    rows.iter()
        .enumerate()
        .filter(|(_, r)| filter(*r))
        .max_by_key(|(i, r)| (rank(*r), *i))
        .map(|(i, _)| i)
}
