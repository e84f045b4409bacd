#![forbid(unsafe_code)]

use dataroom_contracts::revision::{
    MajorVersion, MinorVersion, PageId, RevisionData, RevisionKey, RevisionStatus,
};
use dataroom_contracts::UtcTimestamp;
use dataroom_storage::{
    DataroomStore, InMemoryDataroomStore, SqliteDataroomStore, StorageError, StorageErrorKind,
};
use serde_json::json;

fn t(ms: i64) -> UtcTimestamp {
    UtcTimestamp::from_unix_millis(1_700_000_000_000 + ms).unwrap()
}

fn page() -> PageId {
    PageId::main()
}

fn data(title: &str) -> RevisionData {
    RevisionData::new(vec![json!({"title": title, "metrics": []})])
}

fn key(version: u32, minor: u32) -> RevisionKey {
    RevisionKey::new(MajorVersion(version), MinorVersion(minor))
}

/// Every rule below must hold for both backends.
fn stores() -> Vec<(&'static str, Box<dyn DataroomStore>)> {
    let memory: Box<dyn DataroomStore> = Box::new(InMemoryDataroomStore::new_in_memory());
    let sqlite: Box<dyn DataroomStore> = Box::new(SqliteDataroomStore::open_in_memory().unwrap());
    vec![("memory", memory), ("sqlite", sqlite)]
}

fn listing(s: &dyn DataroomStore) -> Vec<(u32, u32, RevisionStatus)> {
    s.list_revisions(&page())
        .unwrap()
        .into_iter()
        .map(|m| (m.version.0, m.minor.0, m.status))
        .collect()
}

fn published_count(s: &dyn DataroomStore) -> usize {
    s.list_revisions(&page())
        .unwrap()
        .iter()
        .filter(|m| m.status == RevisionStatus::Published)
        .count()
}

#[test]
fn at_revisions_db_01_seed_only_fills_an_empty_page() {
    for (name, mut s) in stores() {
        assert!(s.seed_if_empty(&page(), data("Retention"), t(1)).unwrap(), "{name}");
        assert!(!s.seed_if_empty(&page(), data("Other"), t(2)).unwrap(), "{name}");
        assert_eq!(
            listing(s.as_ref()),
            vec![(1, 0, RevisionStatus::Draft)],
            "{name}"
        );
        let row = s.get_revision(&page(), MajorVersion(1), None).unwrap();
        assert_eq!(row.data, data("Retention"), "{name}");

        let snap = s.published_snapshot(&page()).unwrap();
        assert_eq!(snap.version, 0, "{name}");
        assert!(snap.data.is_empty(), "{name}");
    }
}

#[test]
fn at_revisions_db_02_publish_archive_and_next_draft_scenario() {
    for (name, mut s) in stores() {
        s.seed_if_empty(&page(), data("Seed"), t(1)).unwrap();
        assert_eq!(
            s.publish(&page(), MajorVersion(1), None, t(2)).unwrap(),
            key(1, 0),
            "{name}"
        );
        let snap = s.published_snapshot(&page()).unwrap();
        assert_eq!((snap.version, snap.data.clone()), (1, data("Seed")), "{name}");

        assert_eq!(
            s.create_draft(&page(), data("Second"), t(3)).unwrap(),
            key(2, 1),
            "{name}"
        );
        assert_eq!(
            s.create_draft(&page(), data("Third"), t(4)).unwrap(),
            key(2, 2),
            "{name}"
        );
        assert_eq!(
            s.publish(&page(), MajorVersion(2), Some(MinorVersion(1)), t(5))
                .unwrap(),
            key(2, 0),
            "{name}"
        );
        assert_eq!(
            listing(s.as_ref()),
            vec![
                (2, 2, RevisionStatus::Draft),
                (2, 0, RevisionStatus::Published),
                (1, 0, RevisionStatus::Archived),
            ],
            "{name}"
        );
        let snap = s.published_snapshot(&page()).unwrap();
        assert_eq!((snap.version, snap.data), (2, data("Second")), "{name}");

        // next draft follows the published major
        assert_eq!(
            s.create_draft(&page(), data("Fourth"), t(6)).unwrap(),
            key(3, 1),
            "{name}"
        );
    }
}

#[test]
fn at_revisions_db_03_at_most_one_published_revision_per_page() {
    for (name, mut s) in stores() {
        s.seed_if_empty(&page(), data("Seed"), t(1)).unwrap();
        s.publish(&page(), MajorVersion(1), None, t(2)).unwrap();
        for step in 0..4 {
            let k = s.create_draft(&page(), data("step"), t(10 + step * 2)).unwrap();
            s.publish(&page(), k.version, Some(k.minor), t(11 + step * 2))
                .unwrap();
            assert_eq!(published_count(s.as_ref()), 1, "{name} step {step}");
        }
        let snap = s.published_snapshot(&page()).unwrap();
        assert_eq!(snap.version, 5, "{name}");
    }
}

#[test]
fn at_revisions_db_04_republishing_a_major_archives_the_previous_minor_zero() {
    for (name, mut s) in stores() {
        s.create_draft(&page(), data("A"), t(1)).unwrap();
        s.create_draft(&page(), data("B"), t(2)).unwrap();
        s.publish(&page(), MajorVersion(1), Some(MinorVersion(1)), t(3))
            .unwrap();

        // (1,2) is still a draft, so a bare publish of v1 picks it
        assert_eq!(
            s.publish(&page(), MajorVersion(1), None, t(4)).unwrap(),
            key(1, 0),
            "{name}"
        );
        let mut rows = listing(s.as_ref());
        rows.sort();
        assert_eq!(
            rows,
            vec![
                (1, 0, RevisionStatus::Published),
                (1, 0, RevisionStatus::Archived),
            ],
            "{name}"
        );
        let exact = s
            .get_revision(&page(), MajorVersion(1), Some(MinorVersion(0)))
            .unwrap();
        assert_eq!(exact.status, RevisionStatus::Published, "{name}");
        assert_eq!(exact.data, data("B"), "{name}");
    }
}

#[test]
fn at_revisions_db_05_self_publish_keeps_single_published_row() {
    for (name, mut s) in stores() {
        s.seed_if_empty(&page(), data("Seed"), t(1)).unwrap();
        s.publish(&page(), MajorVersion(1), None, t(2)).unwrap();
        s.publish(&page(), MajorVersion(1), Some(MinorVersion(0)), t(3))
            .unwrap();
        assert_eq!(
            listing(s.as_ref()),
            vec![(1, 0, RevisionStatus::Published)],
            "{name}"
        );
        let row = s.get_revision(&page(), MajorVersion(1), None).unwrap();
        assert_eq!(row.updated_at, t(3), "{name}");
    }
}

#[test]
fn at_revisions_db_06_failed_publish_leaves_state_unchanged() {
    for (name, mut s) in stores() {
        s.seed_if_empty(&page(), data("Seed"), t(1)).unwrap();
        s.publish(&page(), MajorVersion(1), None, t(2)).unwrap();
        let before = s.revision_rows(&page()).unwrap();

        let err = s.publish(&page(), MajorVersion(9), None, t(3)).unwrap_err();
        assert!(err.is_not_found(), "{name}");
        let err = s
            .publish(&page(), MajorVersion(1), Some(MinorVersion(4)), t(3))
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::NotFound, "{name}");

        assert_eq!(s.revision_rows(&page()).unwrap(), before, "{name}");
    }
}

#[test]
fn at_revisions_db_07_update_only_touches_drafts() {
    for (name, mut s) in stores() {
        s.create_draft(&page(), data("A"), t(1)).unwrap();
        s.create_draft(&page(), data("B"), t(2)).unwrap();

        // no minor: highest-minor draft
        assert_eq!(
            s.update_draft(&page(), MajorVersion(1), None, data("B2"), t(3))
                .unwrap(),
            key(1, 2),
            "{name}"
        );
        s.update_draft(
            &page(),
            MajorVersion(1),
            Some(MinorVersion(1)),
            data("A2"),
            t(4),
        )
        .unwrap();
        let a = s
            .get_revision(&page(), MajorVersion(1), Some(MinorVersion(1)))
            .unwrap();
        assert_eq!((a.data, a.updated_at), (data("A2"), t(4)), "{name}");
        assert_eq!(a.created_at, t(1), "{name}");

        s.publish(&page(), MajorVersion(1), Some(MinorVersion(1)), t(5))
            .unwrap();
        let err = s
            .update_draft(
                &page(),
                MajorVersion(1),
                Some(MinorVersion(0)),
                data("nope"),
                t(6),
            )
            .unwrap_err();
        assert!(
            matches!(err, StorageError::NotFound { .. }),
            "{name}: {err}"
        );
        let published = s.published_snapshot(&page()).unwrap();
        assert_eq!(published.data, data("A2"), "{name}");

        let err = s
            .update_draft(&page(), MajorVersion(7), None, data("x"), t(7))
            .unwrap_err();
        assert!(err.is_not_found(), "{name}");
    }
}

#[test]
fn at_revisions_db_08_reads_prefer_published_then_highest_minor() {
    for (name, mut s) in stores() {
        s.create_draft(&page(), data("A"), t(1)).unwrap();
        s.create_draft(&page(), data("B"), t(2)).unwrap();
        s.create_draft(&page(), data("C"), t(3)).unwrap();

        let latest = s.get_revision(&page(), MajorVersion(1), None).unwrap();
        assert_eq!(latest.key(), key(1, 3), "{name}");

        s.publish(&page(), MajorVersion(1), Some(MinorVersion(2)), t(4))
            .unwrap();
        let read = s.get_revision(&page(), MajorVersion(1), None).unwrap();
        assert_eq!(read.status, RevisionStatus::Published, "{name}");
        assert_eq!(read.data, data("B"), "{name}");

        let err = s
            .get_revision(&page(), MajorVersion(2), None)
            .unwrap_err();
        assert!(err.is_not_found(), "{name}");
    }
}

#[test]
fn at_revisions_db_09_archived_revision_can_be_republished_by_exact_key() {
    for (name, mut s) in stores() {
        s.seed_if_empty(&page(), data("One"), t(1)).unwrap();
        s.publish(&page(), MajorVersion(1), None, t(2)).unwrap();
        s.create_draft(&page(), data("Two"), t(3)).unwrap();
        s.publish(&page(), MajorVersion(2), None, t(4)).unwrap();

        // bare publish never picks an archived row
        assert!(s
            .publish(&page(), MajorVersion(1), None, t(5))
            .unwrap_err()
            .is_not_found());

        s.publish(&page(), MajorVersion(1), Some(MinorVersion(0)), t(6))
            .unwrap();
        assert_eq!(
            listing(s.as_ref()),
            vec![
                (2, 0, RevisionStatus::Archived),
                (1, 0, RevisionStatus::Published),
            ],
            "{name}"
        );
        assert_eq!(
            s.create_draft(&page(), data("Three"), t(7)).unwrap(),
            key(2, 1),
            "{name}"
        );
    }
}

#[test]
fn at_revisions_db_10_pages_are_isolated() {
    for (name, mut s) in stores() {
        let other = PageId::new("investors").unwrap();
        s.seed_if_empty(&page(), data("Main"), t(1)).unwrap();
        s.publish(&page(), MajorVersion(1), None, t(2)).unwrap();

        assert!(s.list_revisions(&other).unwrap().is_empty(), "{name}");
        assert_eq!(s.published_snapshot(&other).unwrap().version, 0, "{name}");
        assert_eq!(
            s.create_draft(&other, data("Other"), t(3)).unwrap(),
            key(1, 1),
            "{name}"
        );
        assert!(s.seed_if_empty(&page(), data("x"), t(4)).is_ok_and(|v| !v));
        assert_eq!(listing(s.as_ref()).len(), 1, "{name}");
    }
}

#[test]
fn at_revisions_db_11_listing_metadata_omits_payload_but_rows_keep_it() {
    for (name, mut s) in stores() {
        s.create_draft(&page(), data("A"), t(1)).unwrap();
        s.create_draft(&page(), data("B"), t(2)).unwrap();
        let rows = s.revision_rows(&page()).unwrap();
        let metas = s.list_revisions(&page()).unwrap();
        assert_eq!(rows.len(), metas.len(), "{name}");
        for (row, meta) in rows.iter().zip(metas.iter()) {
            assert_eq!(&row.meta(), meta, "{name}");
        }
        assert_eq!(rows[0].data, data("B"), "{name}");
        let value = serde_json::to_value(&metas[0]).unwrap();
        assert!(value.get("data").is_none(), "{name}");
        assert!(value.get("updatedAt").is_some(), "{name}");
    }
}
