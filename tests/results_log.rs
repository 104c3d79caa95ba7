use std::fs::{self, OpenOptions};
use std::io::Write;

use anyhow::Result;

use person_counter::results::{read_log, JsonArrayStore, JsonLinesStore, ResultStore};
use person_counter::{DetectionEvent, PipelineError, ResultFormat, ResultLogger};

fn event(source: &str, frame_number: u64, person_count: u32) -> DetectionEvent {
    DetectionEvent {
        timestamp: format!("2024-05-01 10:00:{:02}", frame_number % 60),
        source: source.to_string(),
        frame_number,
        person_count,
    }
}

#[test]
fn appended_events_read_back_in_order() -> Result<()> {
    for format in [ResultFormat::JsonArray, ResultFormat::JsonLines] {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("log");
        let mut logger = ResultLogger::open(&path, format);

        let written: Vec<DetectionEvent> = (1..=25).map(|n| event("cam", n, (n % 4) as u32)).collect();
        for ev in &written {
            logger.append(ev)?;
        }

        assert_eq!(logger.read_all()?, written, "{:?}", format);
        assert_eq!(read_log(&path)?, written, "{:?}", format);
    }
    Ok(())
}

#[test]
fn array_log_matches_documented_layout() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("detection_results.json");
    let mut store = JsonArrayStore::new(&path);
    store.append_event(&event("Big Buck Bunny", 1, 2))?;

    let raw = fs::read_to_string(&path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let first = &value[0];
    assert_eq!(first["timestamp"], "2024-05-01 10:00:01");
    assert_eq!(first["source"], "Big Buck Bunny");
    assert_eq!(first["frame_number"], 1);
    assert_eq!(first["person_count"], 2);
    assert_eq!(value.as_array().map(Vec::len), Some(1));
    Ok(())
}

#[test]
fn rewrite_leaves_no_temp_files_behind() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("detection_results.json");
    let mut store = JsonArrayStore::new(&path);
    for n in 1..=5 {
        store.append_event(&event("cam", n, 1))?;
    }
    let entries: Vec<_> = fs::read_dir(dir.path())?.collect::<std::io::Result<_>>()?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].file_name(), "detection_results.json");
    Ok(())
}

#[test]
fn failed_append_keeps_prior_content() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("detection_results.json");
    let mut logger = ResultLogger::open(&path, ResultFormat::JsonArray);
    logger.append(&event("cam", 1, 0))?;
    let before = fs::read_to_string(&path)?;

    // A directory where the temp file would go makes the rewrite fail.
    let blocked = dir.path().join("blocked");
    fs::create_dir(&blocked)?;
    let mut blocked_logger = ResultLogger::open(&blocked, ResultFormat::JsonArray);
    let err = blocked_logger.append(&event("cam", 1, 0)).unwrap_err();
    assert!(matches!(err, PipelineError::Persistence(_)));

    assert_eq!(fs::read_to_string(&path)?, before);
    Ok(())
}

#[test]
fn separate_stores_share_one_file_sequentially() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log.jsonl");
    JsonLinesStore::new(&path).append_event(&event("a", 1, 1))?;
    JsonLinesStore::new(&path).append_event(&event("b", 1, 2))?;

    let events = JsonLinesStore::new(&path).read_events()?;
    assert_eq!(events, vec![event("a", 1, 1), event("b", 1, 2)]);
    assert_eq!(fs::read_to_string(&path)?.lines().count(), 2);
    Ok(())
}

#[test]
fn append_after_interrupted_write_keeps_complete_records() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log.jsonl");
    let mut store = JsonLinesStore::new(&path);
    store.append_event(&event("cam", 1, 2))?;

    // A crash mid-append leaves an unterminated fragment at the end.
    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(b"{\"timestamp\":\"2024")?;
    drop(file);
    assert_eq!(store.read_events()?, vec![event("cam", 1, 2)]);

    store.append_event(&event("cam", 2, 0))?;
    let expected = vec![event("cam", 1, 2), event("cam", 2, 0)];
    assert_eq!(store.read_events()?, expected);
    assert_eq!(read_log(&path)?, expected);
    assert!(fs::read_to_string(&path)?.ends_with('\n'));
    Ok(())
}

#[test]
fn missing_log_is_an_error_for_readers() {
    let dir = tempfile::tempdir().unwrap();
    assert!(read_log(&dir.path().join("absent.json")).is_err());
}
