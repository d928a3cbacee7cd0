//! Cross-handle integration tests: one writer handle, independent reader
//! handles, re-creation semantics.

use mrd_shmem::{SensorMap, SensorValue, ShmError};

fn unique(name: &str) -> String {
    format!("{name}_{}", std::process::id())
}

fn value(reading: &str) -> SensorValue {
    SensorValue::new(
        reading,
        "/redfish/v1/Chassis/HGX_Chassis_0/Sensors/HGX_Chassis_0_HSC_0_Temp_0",
        23_140_448,
        "1970-01-01T06:25:40.448+00:00",
    )
}

#[test]
fn reader_sees_writer_updates() {
    let name = unique("xh_visibility");
    let writer = SensorMap::with_create(&name, 1024 * 1000, 16).unwrap();
    writer.insert("temp0", &value("19.062500")).unwrap();

    let reader = SensorMap::readonly(&name).unwrap();
    assert_eq!(reader.get("temp0").unwrap().unwrap().reading, "19.062500");

    // A later update through the writer is visible through the same reader
    // handle without reopening.
    writer
        .update_value_and_timestamp("temp0", "29.062500", 23_141_000, "later")
        .unwrap();
    let read = reader.get("temp0").unwrap().unwrap();
    assert_eq!(read.reading, "29.062500");
    assert_eq!(read.timestamp_ms, 23_141_000);
}

#[test]
fn writer_recreation_resets_contents() {
    let name = unique("xh_recreate");
    let writer = SensorMap::with_create(&name, 1024 * 1000, 16).unwrap();
    for i in 0..20 {
        writer.insert(&format!("k{i}"), &value("1")).unwrap();
    }
    assert_eq!(writer.size(), 20);
    drop(writer);

    // Re-creation removes the old object and write-initializes a fresh map.
    let writer = SensorMap::with_create(&name, 1024 * 1000, 16).unwrap();
    assert_eq!(writer.size(), 0);

    let reader = SensorMap::readonly(&name).unwrap();
    assert_eq!(reader.get_all().unwrap().len(), 0);
}

#[test]
fn multiple_readers_share_a_segment() {
    let name = unique("xh_multireader");
    let writer = SensorMap::with_create(&name, 1024 * 1000, 16).unwrap();
    writer.insert("k", &value("7")).unwrap();

    let r1 = SensorMap::readonly(&name).unwrap();
    let r2 = SensorMap::readonly(&name).unwrap();
    let r3 = SensorMap::readonly(&name).unwrap();
    for reader in [&r1, &r2, &r3] {
        assert_eq!(reader.get("k").unwrap().unwrap().reading, "7");
    }
}

#[test]
fn concurrent_writer_threads_serialize() {
    let name = unique("xh_threads");
    let writer = std::sync::Arc::new(SensorMap::with_create(&name, 4 * 1024 * 1000, 512).unwrap());

    let mut handles = Vec::new();
    for t in 0..4 {
        let map = writer.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..100 {
                let key = format!("t{t}_k{i}");
                map.insert(&key, &value(&i.to_string())).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(writer.size(), 400);
}

#[test]
fn reader_of_missing_segment_fails_cleanly() {
    let result = SensorMap::readonly("xh_never_existed_424242");
    assert!(matches!(
        result,
        Err(ShmError::NotFound { segment }) if segment == "xh_never_existed_424242"
    ));
}
