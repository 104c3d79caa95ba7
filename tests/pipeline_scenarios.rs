use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{anyhow, Result};
use tempfile::TempDir;

use person_counter::detect::ScriptedBackend;
use person_counter::display::DisplaySurface;
use person_counter::ingest::{
    BackendOpener, CaptureBackend, CapturedImage, SourceConnector, SourceResolver, StreamResolver,
    StreamTarget, SyntheticCapture,
};
use person_counter::results::{read_log, ResultStore};
use person_counter::{
    AnnotationRenderer, Detection, DetectionEvent, DetectorBackend, Frame, FrameSampler,
    PipelineController, PipelineError, PipelineParts, PipelineState, ResultFormat, ResultLogger,
    RunEnd, SourceDescriptor,
};

/// Frames a local file fixture decodes to.
const FILE_FRAMES: u64 = 3;

struct Counted {
    inner: SyntheticCapture,
    releases: Arc<AtomicUsize>,
}

impl CaptureBackend for Counted {
    fn name(&self) -> &'static str {
        "counted"
    }

    fn grab(&mut self) -> Result<Option<CapturedImage>> {
        self.inner.grab()
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release();
    }
}

/// Existing files decode as 1920x1080 synthetic clips; `stub://` URLs pass through.
struct CountingOpener {
    opens: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl BackendOpener for CountingOpener {
    fn open(&self, target: &StreamTarget, _buffer_frames: usize) -> Result<Box<dyn CaptureBackend>> {
        let url = match target {
            StreamTarget::File(path) if path.is_file() => format!(
                "stub://file?frames={}&width=1920&height=1080",
                FILE_FRAMES
            ),
            StreamTarget::File(path) => return Err(anyhow!("no such file {}", path.display())),
            StreamTarget::Url(raw) if raw.starts_with("stub://") => raw.clone(),
            other => return Err(anyhow!("unsupported target {}", other)),
        };
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Counted {
            inner: SyntheticCapture::from_url(&url)?,
            releases: Arc::clone(&self.releases),
        }))
    }
}

struct NoExtractor;

impl StreamResolver for NoExtractor {
    fn name(&self) -> &'static str {
        "none"
    }

    fn resolve_stream(&self, page_url: &str, _max_height: u32) -> Result<String> {
        Err(anyhow!("extraction unavailable for {}", page_url))
    }
}

#[derive(Clone, Default)]
struct DisplayLog {
    shown: Arc<Mutex<Vec<(u32, u32)>>>,
    closes: Arc<AtomicUsize>,
    refreshes: Arc<AtomicUsize>,
}

/// Records shown frame sizes and replays scripted key polls.
struct RecordingDisplay {
    log: DisplayLog,
    keys: VecDeque<Option<char>>,
}

impl DisplaySurface for RecordingDisplay {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn show(&mut self, frame: &Frame) -> Result<()> {
        self.log
            .shown
            .lock()
            .map_err(|_| anyhow!("display log poisoned"))?
            .push((frame.width(), frame.height()));
        Ok(())
    }

    fn refresh(&mut self) {
        self.log.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn poll_key(&mut self) -> Option<char> {
        self.keys.pop_front().flatten()
    }

    fn close(&mut self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sets the controller's interrupt flag once it has seen `after` frames.
struct InterruptingDetector {
    flag: Arc<OnceLock<Arc<AtomicBool>>>,
    after: usize,
    calls: usize,
}

impl DetectorBackend for InterruptingDetector {
    fn name(&self) -> &'static str {
        "interrupting"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        if self.calls == self.after {
            let flag = self.flag.get().ok_or_else(|| anyhow!("interrupt handle not wired"))?;
            flag.store(true, Ordering::SeqCst);
        }
        Ok(Vec::new())
    }
}

struct FailingStore {
    path: PathBuf,
}

impl ResultStore for FailingStore {
    fn append_event(&mut self, _event: &DetectionEvent) -> Result<()> {
        Err(anyhow!("disk full"))
    }

    fn read_events(&self) -> Result<Vec<DetectionEvent>> {
        Ok(Vec::new())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

struct Harness {
    controller: PipelineController,
    opens: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    display: DisplayLog,
    results: PathBuf,
    dir: TempDir,
}

struct Setup {
    detector: Box<dyn DetectorBackend>,
    skip_frames: u32,
    keys: Vec<Option<char>>,
    store: Option<Box<dyn ResultStore>>,
}

impl Setup {
    fn new(detector: impl DetectorBackend + 'static) -> Self {
        Self {
            detector: Box::new(detector),
            skip_frames: 0,
            keys: Vec::new(),
            store: None,
        }
    }
}

fn harness(setup: Setup) -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let results = dir.path().join("results").join("detection_results.json");
    let opens = Arc::new(AtomicUsize::new(0));
    let releases = Arc::new(AtomicUsize::new(0));
    let display = DisplayLog::default();

    let logger = match setup.store {
        Some(store) => ResultLogger::from_store(store),
        None => ResultLogger::open(&results, ResultFormat::JsonArray),
    };
    let controller = PipelineController::from_parts(PipelineParts {
        resolver: SourceResolver::new(Box::new(NoExtractor), 720),
        connector: SourceConnector::new(Box::new(CountingOpener {
            opens: Arc::clone(&opens),
            releases: Arc::clone(&releases),
        })),
        sampler: FrameSampler::new(1280, setup.skip_frames),
        detector: setup.detector,
        renderer: AnnotationRenderer::default(),
        logger,
        display: Box::new(RecordingDisplay {
            log: display.clone(),
            keys: setup.keys.into(),
        }),
        quit_key: 'q',
    });

    Harness {
        controller,
        opens,
        releases,
        display,
        results,
        dir,
    }
}

fn fixture_file(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("clip.mp4");
    std::fs::write(&path, b"fixture").expect("write fixture");
    path
}

fn parse_source(raw: &str) -> SourceDescriptor {
    SourceDescriptor::parse(raw).expect("valid source")
}

fn logged(results: &Path) -> Vec<DetectionEvent> {
    read_log(results).expect("read results log")
}

fn person(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Detection {
    Detection::person(x1, y1, x2, y2, confidence)
}

#[test]
fn three_frame_file_logs_one_event_per_frame() {
    let detector = ScriptedBackend::new(vec![
        vec![
            person(10.0, 20.0, 110.0, 300.0, 0.91),
            person(400.0, 50.0, 520.0, 360.0, 0.67),
            Detection::new(600.0, 300.0, 900.0, 500.0, 0.88, 2),
        ],
        vec![],
        vec![],
    ]);
    let mut h = harness(Setup::new(detector));
    let file = fixture_file(&h.dir);

    let report = h
        .controller
        .run(&SourceDescriptor::LocalFile(file), "")
        .expect("run succeeds");

    assert_eq!(report.end, RunEnd::EndOfStream);
    assert_eq!(report.source_name, "clip.mp4");
    assert_eq!(report.frames_read, 3);
    assert_eq!(report.events_logged, 3);

    let events = logged(&h.results);
    let counts: Vec<u32> = events.iter().map(|e| e.person_count).collect();
    let numbers: Vec<u64> = events.iter().map(|e| e.frame_number).collect();
    assert_eq!(counts, vec![2, 0, 0]);
    assert_eq!(numbers, vec![1, 2, 3]);
    assert!(events.iter().all(|e| e.source == "clip.mp4"));

    // Frames were bounded to max_width before display.
    let shown = h.display.shown.lock().unwrap().clone();
    assert_eq!(shown, vec![(1280, 720); 3]);
    assert_eq!(h.releases.load(Ordering::SeqCst), 1);
    assert_eq!(h.controller.state(), PipelineState::Closed);
}

#[test]
fn missing_file_fails_without_touching_log_or_window() {
    let mut h = harness(Setup::new(ScriptedBackend::new(Vec::new())));
    let missing = h.dir.path().join("nope.mp4");

    let err = h
        .controller
        .run(&SourceDescriptor::LocalFile(missing), "nope")
        .unwrap_err();

    assert!(matches!(err, PipelineError::Connect { .. }));
    assert!(!h.results.exists());
    assert!(!h.results.parent().unwrap().exists());
    assert!(h.display.shown.lock().unwrap().is_empty());
    assert_eq!(h.opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.controller.state(), PipelineState::Closed);
}

#[test]
fn read_error_on_frame_five_keeps_four_events() {
    let mut h = harness(Setup::new(ScriptedBackend::new(Vec::new())));

    let err = h
        .controller
        .run(&parse_source("stub://cam?fail_at=5"), "cam")
        .unwrap_err();

    assert!(matches!(err, PipelineError::Read(_)));
    assert!(err.is_mid_run_fault());
    assert_eq!(logged(&h.results).len(), 4);
    assert_eq!(h.controller.state(), PipelineState::Closed);
    assert_eq!(h.releases.load(Ordering::SeqCst), 1);
    assert_eq!(h.display.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn skipping_selects_every_n_plus_first_frame() {
    let detector = ScriptedBackend::new(Vec::new());
    let seen = detector.seen_frames();
    let mut setup = Setup::new(detector);
    setup.skip_frames = 2;
    let mut h = harness(setup);

    let report = h
        .controller
        .run(&parse_source("stub://cam?frames=10&width=64&height=48"), "cam")
        .expect("run succeeds");

    assert_eq!(*seen.lock().unwrap(), vec![3, 6, 9]);
    assert_eq!(report.frames_read, 10);
    assert_eq!(report.frames_processed, 3);
    let numbers: Vec<u64> = logged(&h.results).iter().map(|e| e.frame_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    // Skipped frames are not shown, but the window still processes events.
    assert_eq!(h.display.shown.lock().unwrap().len(), 3);
    assert_eq!(h.display.refreshes.load(Ordering::SeqCst), 7);
}

#[test]
fn quit_key_is_honoured_on_skipped_frames() {
    let mut setup = Setup::new(ScriptedBackend::new(Vec::new()));
    setup.skip_frames = 2;
    // Frames 1, 2 skipped, 3 processed, quit arrives while frame 4 is skipped.
    setup.keys = vec![None, None, None, Some('q')];
    let mut h = harness(setup);

    let report = h
        .controller
        .run(&parse_source("stub://cam?frames=10&width=64&height=48"), "cam")
        .expect("run succeeds");

    assert_eq!(report.end, RunEnd::UserQuit);
    assert_eq!(report.frames_read, 4);
    assert_eq!(report.events_logged, 1);
    assert_eq!(h.display.shown.lock().unwrap().len(), 1);
    assert_eq!(h.display.refreshes.load(Ordering::SeqCst), 3);
    assert_eq!(h.releases.load(Ordering::SeqCst), 1);
}

#[test]
fn quit_key_drains_the_run() {
    let mut setup = Setup::new(ScriptedBackend::new(Vec::new()));
    setup.keys = vec![None, Some('Q')];
    let mut h = harness(setup);

    let report = h
        .controller
        .run(&parse_source("stub://cam?width=64&height=48"), "cam")
        .expect("run succeeds");

    assert_eq!(report.end, RunEnd::UserQuit);
    assert_eq!(report.events_logged, 2);
    assert_eq!(h.releases.load(Ordering::SeqCst), 1);
    assert_eq!(h.display.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn interrupt_flag_is_treated_like_quit() {
    let slot = Arc::new(OnceLock::new());
    let detector = InterruptingDetector {
        flag: Arc::clone(&slot),
        after: 3,
        calls: 0,
    };
    let mut h = harness(Setup::new(detector));
    slot.set(h.controller.interrupt_handle()).unwrap();

    let report = h
        .controller
        .run(&parse_source("stub://cam?width=64&height=48"), "cam")
        .expect("run succeeds");

    assert_eq!(report.end, RunEnd::Interrupted);
    assert_eq!(report.events_logged, 3);
    assert_eq!(h.releases.load(Ordering::SeqCst), 1);
    assert_eq!(h.display.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn detector_fault_ends_run_after_release() {
    let detector = ScriptedBackend::with_faults(vec![Ok(vec![]), Err("model crashed".into())]);
    let mut h = harness(Setup::new(detector));

    let err = h
        .controller
        .run(&parse_source("stub://cam?width=64&height=48"), "cam")
        .unwrap_err();

    assert!(matches!(err, PipelineError::Detection(_)));
    assert_eq!(logged(&h.results).len(), 1);
    assert_eq!(h.releases.load(Ordering::SeqCst), 1);
    assert_eq!(h.controller.state(), PipelineState::Closed);
}

#[test]
fn malformed_detection_is_a_detection_fault() {
    let detector = ScriptedBackend::new(vec![vec![person(0.0, 0.0, 10.0, 10.0, 1.5)]]);
    let mut h = harness(Setup::new(detector));

    let err = h
        .controller
        .run(&parse_source("stub://cam?width=64&height=48"), "cam")
        .unwrap_err();

    assert!(matches!(err, PipelineError::Detection(_)));
    assert!(!h.results.exists());
}

#[test]
fn persistence_failures_do_not_stop_the_run() {
    let mut setup = Setup::new(ScriptedBackend::new(Vec::new()));
    setup.store = Some(Box::new(FailingStore {
        path: PathBuf::from("unwritable.json"),
    }));
    let mut h = harness(setup);

    let report = h
        .controller
        .run(&parse_source("stub://cam?frames=4&width=64&height=48"), "cam")
        .expect("run succeeds");

    assert_eq!(report.end, RunEnd::EndOfStream);
    assert_eq!(report.events_logged, 0);
    assert_eq!(report.persistence_failures, 4);
    assert_eq!(h.display.shown.lock().unwrap().len(), 4);
}

#[test]
fn frame_numbers_restart_for_each_run() {
    let mut h = harness(Setup::new(ScriptedBackend::new(Vec::new())));

    for name in ["first", "second"] {
        h.controller
            .run(&parse_source("stub://cam?frames=2&width=64&height=48"), name)
            .expect("run succeeds");
        assert_eq!(h.controller.state(), PipelineState::Closed);
    }

    let events = logged(&h.results);
    let numbers: Vec<u64> = events.iter().map(|e| e.frame_number).collect();
    let sources: Vec<&str> = events.iter().map(|e| e.source.as_str()).collect();
    assert_eq!(numbers, vec![1, 2, 1, 2]);
    assert_eq!(sources, vec!["first", "first", "second", "second"]);
    assert_eq!(h.opens.load(Ordering::SeqCst), 2);
    assert_eq!(h.releases.load(Ordering::SeqCst), 2);
}

#[test]
fn platform_extraction_failure_is_reported() {
    let mut h = harness(Setup::new(ScriptedBackend::new(Vec::new())));

    let err = h
        .controller
        .run(
            &parse_source("https://youtu.be/dQw4w9WgXcQ"),
            "yt",
        )
        .unwrap_err();

    assert!(matches!(err, PipelineError::Resolution { .. }));
    assert_eq!(h.opens.load(Ordering::SeqCst), 0);
    assert!(!h.results.exists());
}
