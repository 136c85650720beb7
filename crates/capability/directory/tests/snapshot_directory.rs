use domain::{AttributeType, PointDescriptor, ValueKind};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use vlisten_directory::{
    DeviceDirectory, DirectorySnapshot, SnapshotDirectory, load_snapshot_file, spawn_reload,
};

const ONE_DEVICE: &str = r#"{"devices": [{"id": 1, "name": "ListeningVirtualDevice", "points": [
    {"id": 11, "name": "altitude", "kind": "float32", "attributes": {
        "key": {"type": "hex", "value": "62"},
        "start": {"type": "int", "value": "23"},
        "end": {"type": "int", "value": "27"}
    }}
]}]}"#;

const TWO_DEVICES: &str = r#"{"devices": [
    {"id": 1, "name": "ListeningVirtualDevice", "points": []},
    {"id": 2, "name": "SecondDevice", "points": []}
]}"#;

fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(content.as_bytes()).expect("write");
    file.flush().expect("flush");
    file
}

#[tokio::test]
async fn directory_resolves_from_file() {
    let file = write_temp(ONE_DEVICE);
    let snapshot = load_snapshot_file(file.path()).expect("load");
    let directory: Arc<dyn DeviceDirectory> = Arc::new(SnapshotDirectory::new(snapshot));

    let device_id = directory
        .resolve_device_id("ListeningVirtualDevice")
        .await
        .expect("resolve")
        .expect("device");
    assert_eq!(device_id, 1);

    let points = directory
        .points_of(device_id)
        .await
        .expect("points")
        .expect("device points");
    assert_eq!(points.len(), 1);
    assert_eq!(points[&11].kind, Some(ValueKind::Float32));

    let missing = directory.resolve_device_id("Nobody").await.expect("resolve");
    assert!(missing.is_none());
}

#[tokio::test]
async fn replace_is_visible_to_next_lookup() {
    let directory = SnapshotDirectory::new(DirectorySnapshot::new());
    let held = directory.snapshot();
    assert!(directory.resolve_device_id("dev").await.expect("resolve").is_none());

    directory.replace(DirectorySnapshot::new().with_device(9, "dev", []));
    assert_eq!(
        directory.resolve_device_id("dev").await.expect("resolve"),
        Some(9)
    );
    // 旧快照不受影响
    assert_eq!(held.device_count(), 0);
}

#[tokio::test]
async fn incremental_point_update() {
    let directory = SnapshotDirectory::new(DirectorySnapshot::new());
    directory.upsert_device(3, "dev-3", &[]);
    let point = PointDescriptor::new(30, "level")
        .with_kind(ValueKind::Int64)
        .with_attribute("key", AttributeType::Hex, "62");
    assert!(directory.upsert_point(3, &point));
    assert!(!directory.upsert_point(4, &point));

    let points = directory
        .points_of(3)
        .await
        .expect("points")
        .expect("device points");
    assert_eq!(points[&30].kind, Some(ValueKind::Int64));

    assert!(directory.remove_point(3, 30));
    assert!(directory.remove_device(3));
    assert!(directory.points_of(3).await.expect("points").is_none());
}

#[tokio::test]
async fn reload_task_picks_up_file_changes() {
    let file = write_temp(ONE_DEVICE);
    let directory = Arc::new(SnapshotDirectory::new(
        load_snapshot_file(file.path()).expect("load"),
    ));
    let handle = spawn_reload(
        directory.clone(),
        file.path().to_path_buf(),
        Duration::from_millis(20),
    );

    std::fs::write(file.path(), TWO_DEVICES).expect("rewrite");
    let mut resolved = None;
    for _ in 0..100 {
        resolved = directory
            .resolve_device_id("SecondDevice")
            .await
            .expect("resolve");
        if resolved.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.abort();
    assert_eq!(resolved, Some(2));
}

#[tokio::test]
async fn reload_keeps_snapshot_on_bad_file() {
    let file = write_temp(ONE_DEVICE);
    let directory = Arc::new(SnapshotDirectory::new(
        load_snapshot_file(file.path()).expect("load"),
    ));
    let handle = spawn_reload(
        directory.clone(),
        file.path().to_path_buf(),
        Duration::from_millis(10),
    );
    std::fs::write(file.path(), "not json").expect("rewrite");
    tokio::time::sleep(Duration::from_millis(60)).await;
    handle.abort();

    assert_eq!(
        directory
            .resolve_device_id("ListeningVirtualDevice")
            .await
            .expect("resolve"),
        Some(1)
    );
}
