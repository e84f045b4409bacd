#![forbid(unsafe_code)]

use dataroom_contracts::image::{ImageId, ImageUpload, DEFAULT_IMAGE_CONTENT_TYPE, MAX_IMAGE_BYTES};
use dataroom_contracts::{ContractViolation, UtcTimestamp};
use dataroom_storage::{
    DataroomStore, InMemoryDataroomStore, SqliteDataroomStore, StorageError, StorageErrorKind,
};

fn t(ms: i64) -> UtcTimestamp {
    UtcTimestamp::from_unix_millis(1_700_000_000_000 + ms).unwrap()
}

fn stores() -> Vec<(&'static str, Box<dyn DataroomStore>)> {
    let memory: Box<dyn DataroomStore> = Box::new(InMemoryDataroomStore::new_in_memory());
    let sqlite: Box<dyn DataroomStore> = Box::new(SqliteDataroomStore::open_in_memory().unwrap());
    vec![("memory", memory), ("sqlite", sqlite)]
}

fn png_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    bytes.extend((0..len).map(|i| (i % 251) as u8));
    bytes
}

#[test]
fn at_images_db_01_upload_round_trips_bytes_and_metadata() {
    for (name, mut s) in stores() {
        let bytes = png_bytes(2048);
        let upload = ImageUpload::v1(
            bytes.clone(),
            Some("image/png".to_string()),
            Some("retention.png".to_string()),
        )
        .unwrap();
        let id = s.insert_image(upload, t(1)).unwrap();
        assert_eq!(id.as_str().len(), ImageId::HEX_LEN, "{name}");

        let got = s.get_image(&id).unwrap();
        assert_eq!(got.id, id, "{name}");
        assert_eq!(got.data, bytes, "{name}");
        assert_eq!(got.content_type, "image/png", "{name}");
        assert_eq!(got.original_name.as_deref(), Some("retention.png"), "{name}");
        assert_eq!(got.created_at, t(1), "{name}");
    }
}

#[test]
fn at_images_db_02_each_upload_gets_a_fresh_id() {
    for (name, mut s) in stores() {
        let mut ids = Vec::new();
        for i in 0..8 {
            let upload = ImageUpload::v1(png_bytes(16), None, None).unwrap();
            ids.push(s.insert_image(upload, t(i)).unwrap());
        }
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len(), "{name}");

        let got = s.get_image(&ids[3]).unwrap();
        assert_eq!(got.content_type, DEFAULT_IMAGE_CONTENT_TYPE, "{name}");
        assert!(got.original_name.is_none(), "{name}");
    }
}

#[test]
fn at_images_db_03_unknown_id_is_not_found() {
    for (name, s) in stores() {
        let id = ImageId::new("0123456789abcdef01234567").unwrap();
        let err = s.get_image(&id).unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::NotFound, "{name}");
    }
}

#[test]
fn at_images_db_04_oversize_and_empty_uploads_are_rejected() {
    let err = ImageUpload::v1(vec![0u8; MAX_IMAGE_BYTES + 1], None, None).unwrap_err();
    assert!(matches!(err, ContractViolation::TooLarge { .. }));
    assert!(ImageUpload::v1(Vec::new(), None, None).is_err());

    // a hand-built upload still goes through validation at the store boundary
    for (name, mut s) in stores() {
        let upload = ImageUpload {
            data: vec![1u8; MAX_IMAGE_BYTES + 1],
            content_type: "image/png".to_string(),
            original_name: None,
        };
        let err = s.insert_image(upload, t(1)).unwrap_err();
        assert!(
            matches!(
                err,
                StorageError::ContractViolation(ContractViolation::TooLarge { .. })
            ),
            "{name}: {err}"
        );
        assert_eq!(err.kind(), StorageErrorKind::Validation, "{name}");
    }
}

#[test]
fn at_images_db_05_largest_allowed_upload_is_accepted() {
    for (name, mut s) in stores() {
        let upload = ImageUpload::v1(vec![7u8; MAX_IMAGE_BYTES], None, None).unwrap();
        let id = s.insert_image(upload, t(1)).unwrap();
        assert_eq!(s.get_image(&id).unwrap().data.len(), MAX_IMAGE_BYTES, "{name}");
    }
}
