use object_store::memory::InMemory;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use twinstore::{FsBackend, ObjectKey, ObjectStoreBackend, StorageBackend, Style};

fn backends() -> (TempDir, FsBackend, ObjectStoreBackend) {
    let dir = TempDir::new().unwrap();
    let local = FsBackend::new(dir.path(), "/system");
    let remote = ObjectStoreBackend::new(Arc::new(InMemory::new()), "uploads");
    (dir, local, remote)
}

#[test]
fn test_same_key_same_layout_on_both_backends() {
    let (dir, local, remote) = backends();
    let key = ObjectKey::new("avatars", "42", Style::new("thumbnail"), "me.png");

    local.write(&key, b"small").unwrap();
    remote.write(&key, b"small").unwrap();

    assert_eq!(
        local.path(&key),
        dir.path().join("avatars/42/thumbnail/me.png")
    );
    assert_eq!(remote.path(&key).to_str(), Some("avatars/42/thumbnail/me.png"));
    assert_eq!(local.read(&key).unwrap(), remote.read(&key).unwrap());
}

#[test]
fn test_copy_to_local_file_from_remote() {
    let (_dir, _local, remote) = backends();
    let out = TempDir::new().unwrap();
    let key = ObjectKey::new("docs", "1", Style::original(), "report.pdf");
    remote.write(&key, b"%PDF").unwrap();

    let dest = out.path().join("report.pdf");
    remote.copy_to_local_file(&key, &dest).unwrap();
    assert_eq!(fs::read(dest).unwrap(), b"%PDF");
}

#[test]
fn test_missing_objects() {
    let (_dir, local, remote) = backends();
    let key = ObjectKey::new("docs", "1", Style::original(), "gone.pdf");

    assert!(!local.exists(&key).unwrap());
    assert!(!remote.exists(&key).unwrap());
    assert_eq!(local.read(&key).unwrap(), None);
    assert_eq!(remote.read(&key).unwrap(), None);
    assert!(local.delete(&key).is_ok());
    assert!(remote.delete(&key).is_ok());
}
