//! Persisted per-frame detection events.
//!
//! The default store keeps a single pretty-printed JSON array and rewrites the
//! whole file on every append. The rewrite goes through a temp file in the same
//! directory and an atomic rename, so a failed write never leaves a truncated
//! log behind. The line-delimited store appends one object per line instead.
//!
//! Both stores assume a single writer.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;

use crate::error::{chain_message, PipelineError};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One record per processed frame. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub timestamp: String,
    pub source: String,
    pub frame_number: u64,
    pub person_count: u32,
}

impl DetectionEvent {
    /// Stamp an event with the local wall-clock time.
    pub fn now(source: &str, frame_number: u64, person_count: u32) -> Self {
        Self {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            source: source.to_string(),
            frame_number,
            person_count,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultFormat {
    JsonArray,
    JsonLines,
}

impl ResultFormat {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "json-array" | "json" => Ok(Self::JsonArray),
            "json-lines" | "jsonl" | "ndjson" => Ok(Self::JsonLines),
            other => Err(anyhow!(
                "unknown results format {:?} (expected json-array or json-lines)",
                other
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonArray => "json-array",
            Self::JsonLines => "json-lines",
        }
    }

    /// Guess the format of an existing log from its first non-blank byte.
    pub fn sniff(content: &str) -> Self {
        match content.trim_start().chars().next() {
            Some('{') => Self::JsonLines,
            _ => Self::JsonArray,
        }
    }
}

pub trait ResultStore: Send {
    fn append_event(&mut self, event: &DetectionEvent) -> Result<()>;

    fn read_events(&self) -> Result<Vec<DetectionEvent>>;

    fn path(&self) -> &Path;
}

pub struct JsonArrayStore {
    path: PathBuf,
}

impl JsonArrayStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write_atomic(&self, events: &[DetectionEvent]) -> Result<()> {
        let dir = ensure_parent_dir(&self.path)?;

        let mut body = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut body, PrettyFormatter::with_indent(b"    "));
        events
            .serialize(&mut serializer)
            .context("serialize detection events")?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("create temp file in {}", dir.display()))?;
        tmp.write_all(&body).context("write results temp file")?;
        tmp.as_file().sync_all().context("sync results temp file")?;
        tmp.persist(&self.path)
            .map_err(|err| anyhow::Error::new(err.error))
            .with_context(|| format!("replace {}", self.path.display()))?;
        Ok(())
    }
}

impl ResultStore for JsonArrayStore {
    fn append_event(&mut self, event: &DetectionEvent) -> Result<()> {
        // A malformed log fails the append rather than being replaced.
        let mut events = self.read_events()?;
        events.push(event.clone());
        self.write_atomic(&events)
    }

    fn read_events(&self) -> Result<Vec<DetectionEvent>> {
        let Some(content) = read_if_exists(&self.path)? else {
            return Ok(Vec::new());
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("{} is not a JSON array of events", self.path.display()))
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

pub struct JsonLinesStore {
    path: PathBuf,
}

impl JsonLinesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ResultStore for JsonLinesStore {
    fn append_event(&mut self, event: &DetectionEvent) -> Result<()> {
        ensure_parent_dir(&self.path)?;
        let mut line = serde_json::to_vec(event).context("serialize detection event")?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        drop_partial_tail(&mut file, &self.path)?;
        file.write_all(&line)
            .with_context(|| format!("append to {}", self.path.display()))?;
        file.sync_data().context("sync results log")?;
        Ok(())
    }

    fn read_events(&self) -> Result<Vec<DetectionEvent>> {
        let Some(content) = read_if_exists(&self.path)? else {
            return Ok(Vec::new());
        };
        parse_lines(&content, &self.path)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Make sure the next record starts on a fresh line. A complete record that only
/// lacks its newline gets one; a fragment left by an interrupted append is cut.
fn drop_partial_tail(file: &mut fs::File, path: &Path) -> Result<()> {
    let len = file
        .metadata()
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))
        .and_then(|_| file.read_exact(&mut last))
        .with_context(|| format!("read tail of {}", path.display()))?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let mut content = Vec::with_capacity(len as usize);
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut content))
        .with_context(|| format!("read {}", path.display()))?;
    let keep = content
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    if serde_json::from_slice::<DetectionEvent>(&content[keep..]).is_ok() {
        file.write_all(b"\n")
            .with_context(|| format!("terminate last line of {}", path.display()))?;
        return Ok(());
    }
    let keep = keep as u64;
    log::warn!(
        "dropping {} bytes of partial trailing record in {}",
        len - keep,
        path.display()
    );
    file.set_len(keep)
        .with_context(|| format!("truncate {}", path.display()))?;
    Ok(())
}

fn parse_lines(content: &str, path: &Path) -> Result<Vec<DetectionEvent>> {
    let terminated = content.ends_with('\n');
    let lines: Vec<&str> = content.lines().collect();
    let mut events = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<DetectionEvent>(line) {
            Ok(event) => events.push(event),
            Err(_) if !terminated && i + 1 == lines.len() => {
                log::warn!(
                    "ignoring partial trailing line {} in {}",
                    i + 1,
                    path.display()
                );
            }
            Err(err) => {
                return Err(anyhow::Error::new(err))
                    .with_context(|| format!("{} line {}", path.display(), i + 1));
            }
        }
    }
    Ok(events)
}

fn read_if_exists(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(anyhow::Error::new(err)).with_context(|| format!("read {}", path.display())),
    }
}

fn ensure_parent_dir(path: &Path) -> Result<PathBuf> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// Open a store of the given format. Nothing touches disk until the first append.
pub fn open_store(path: impl Into<PathBuf>, format: ResultFormat) -> Box<dyn ResultStore> {
    match format {
        ResultFormat::JsonArray => Box::new(JsonArrayStore::new(path)),
        ResultFormat::JsonLines => Box::new(JsonLinesStore::new(path)),
    }
}

/// Read a log in whichever format it was written.
pub fn read_log(path: &Path) -> Result<Vec<DetectionEvent>> {
    let Some(content) = read_if_exists(path)? else {
        return Err(anyhow!("results log {} does not exist", path.display()));
    };
    match ResultFormat::sniff(&content) {
        ResultFormat::JsonLines => parse_lines(&content, path),
        ResultFormat::JsonArray => JsonArrayStore::new(path).read_events(),
    }
}

/// Controller-facing logger: maps store failures to persistence errors.
pub struct ResultLogger {
    store: Box<dyn ResultStore>,
    appended: u64,
}

impl ResultLogger {
    pub fn open(path: impl Into<PathBuf>, format: ResultFormat) -> Self {
        Self::from_store(open_store(path, format))
    }

    pub fn from_store(store: Box<dyn ResultStore>) -> Self {
        Self { store, appended: 0 }
    }

    pub fn append(&mut self, event: &DetectionEvent) -> Result<(), PipelineError> {
        self.store
            .append_event(event)
            .map_err(|err| PipelineError::Persistence(chain_message(&err)))?;
        self.appended += 1;
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<DetectionEvent>> {
        self.store.read_events()
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Events appended through this logger since it was opened.
    pub fn appended(&self) -> u64 {
        self.appended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(frame_number: u64, person_count: u32) -> DetectionEvent {
        DetectionEvent {
            timestamp: "2024-05-01 10:00:00".to_string(),
            source: "Camera 0".to_string(),
            frame_number,
            person_count,
        }
    }

    #[test]
    fn format_names_parse() -> Result<()> {
        assert_eq!(ResultFormat::parse("json-array")?, ResultFormat::JsonArray);
        assert_eq!(ResultFormat::parse("JSON-LINES")?, ResultFormat::JsonLines);
        assert!(ResultFormat::parse("csv").is_err());
        Ok(())
    }

    #[test]
    fn timestamp_has_fixed_shape() {
        let stamped = DetectionEvent::now("cam", 1, 0);
        assert_eq!(stamped.timestamp.len(), "YYYY-MM-DD HH:MM:SS".len());
        assert_eq!(&stamped.timestamp[4..5], "-");
        assert_eq!(&stamped.timestamp[10..11], " ");
    }

    #[test]
    fn array_store_uses_four_space_indent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.json");
        let mut store = JsonArrayStore::new(&path);
        store.append_event(&event(1, 2))?;
        let content = fs::read_to_string(&path)?;
        assert!(content.starts_with("[\n    {\n        \"timestamp\""));
        Ok(())
    }

    #[test]
    fn missing_log_reads_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = JsonArrayStore::new(dir.path().join("absent.json"));
        assert!(store.read_events()?.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_array_is_left_untouched() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.json");
        fs::write(&path, "[{\"timestamp\":")?;
        let mut store = JsonArrayStore::new(&path);
        assert!(store.append_event(&event(1, 0)).is_err());
        assert_eq!(fs::read_to_string(&path)?, "[{\"timestamp\":");
        Ok(())
    }

    #[test]
    fn partial_trailing_line_is_skipped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.jsonl");
        let mut store = JsonLinesStore::new(&path);
        store.append_event(&event(1, 1))?;
        store.append_event(&event(2, 3))?;
        let mut file = OpenOptions::new().append(true).open(&path)?;
        file.write_all(b"{\"timestamp\":\"2024")?;
        assert_eq!(store.read_events()?, vec![event(1, 1), event(2, 3)]);
        Ok(())
    }

    #[test]
    fn append_replaces_partial_first_record() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.jsonl");
        fs::write(&path, "{\"timestamp\":\"20")?;
        let mut store = JsonLinesStore::new(&path);
        store.append_event(&event(1, 2))?;
        assert_eq!(store.read_events()?, vec![event(1, 2)]);
        assert_eq!(fs::read_to_string(&path)?.lines().count(), 1);
        Ok(())
    }

    #[test]
    fn unterminated_complete_record_is_kept() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.jsonl");
        fs::write(&path, serde_json::to_string(&event(1, 1))?)?;
        let mut store = JsonLinesStore::new(&path);
        store.append_event(&event(2, 0))?;
        assert_eq!(store.read_events()?, vec![event(1, 1), event(2, 0)]);
        Ok(())
    }

    #[test]
    fn corrupt_middle_line_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.jsonl");
        fs::write(&path, "not json\n{}\n")?;
        assert!(JsonLinesStore::new(&path).read_events().is_err());
        Ok(())
    }

    #[test]
    fn read_log_sniffs_format() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let lines = dir.path().join("a.jsonl");
        let array = dir.path().join("b.json");
        JsonLinesStore::new(&lines).append_event(&event(1, 4))?;
        JsonArrayStore::new(&array).append_event(&event(1, 5))?;
        assert_eq!(read_log(&lines)?, vec![event(1, 4)]);
        assert_eq!(read_log(&array)?, vec![event(1, 5)]);
        Ok(())
    }

    #[test]
    fn logger_creates_directory_on_first_append() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("results").join("detection_results.json");
        let mut logger = ResultLogger::open(&path, ResultFormat::JsonArray);
        assert!(!path.exists());
        logger
            .append(&event(1, 0))
            .map_err(|err| anyhow!("{err}"))?;
        assert!(path.exists());
        assert_eq!(logger.appended(), 1);
        Ok(())
    }
}
