//! Run orchestration.
//!
//! `PipelineController` owns every resource a run touches. One call to
//! [`PipelineController::run`] walks `Idle → Connecting → Running → Draining →
//! Closed`; the drain step closes the source and the display exactly once no
//! matter how the loop ended.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::CounterConfig;
use crate::detect::{build_backend, filter_persons, DetectorBackend};
use crate::display::{open_display, DisplaySurface};
use crate::error::{chain_message, PipelineError};
use crate::ingest::{
    OpenSource, ReadOutcome, SourceConnector, SourceDescriptor, SourceResolver, YtDlpResolver,
};
use crate::render::AnnotationRenderer;
use crate::results::{DetectionEvent, ResultLogger};
use crate::sampler::{FrameSampler, Sampled};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Connecting,
    Running,
    Draining,
    Closed,
}

/// Per-run counters, reset at the start of every run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunState {
    /// Read index of the latest frame.
    pub frame_count: u64,
    /// Frames that went through detection.
    pub processed_count: u64,
    pub last_person_count: usize,
}

/// How a run that did not fault came to an end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunEnd {
    EndOfStream,
    UserQuit,
    Interrupted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    pub source_name: String,
    pub frames_read: u64,
    pub frames_processed: u64,
    pub events_logged: u64,
    pub persistence_failures: u64,
    pub end: RunEnd,
}

/// Everything a controller needs, for callers that build their own collaborators.
pub struct PipelineParts {
    pub resolver: SourceResolver,
    pub connector: SourceConnector,
    pub sampler: FrameSampler,
    pub detector: Box<dyn DetectorBackend>,
    pub renderer: AnnotationRenderer,
    pub logger: ResultLogger,
    pub display: Box<dyn DisplaySurface>,
    pub quit_key: char,
}

pub struct PipelineController {
    resolver: SourceResolver,
    connector: SourceConnector,
    sampler: FrameSampler,
    detector: Box<dyn DetectorBackend>,
    renderer: AnnotationRenderer,
    logger: ResultLogger,
    display: Box<dyn DisplaySurface>,
    quit_key: char,
    interrupt: Arc<AtomicBool>,
    state: PipelineState,
    run_state: RunState,
}

impl PipelineController {
    /// Wire the system collaborators described by `config`.
    pub fn new(config: &CounterConfig) -> Result<Self, PipelineError> {
        let mut detector =
            build_backend(config).map_err(|err| PipelineError::Config(chain_message(&err)))?;
        detector
            .warm_up()
            .map_err(|err| PipelineError::Detection(chain_message(&err)))?;
        log::info!("detector backend: {}", detector.name());

        let display = &config.display;
        Ok(Self::from_parts(PipelineParts {
            resolver: SourceResolver::new(
                Box::new(YtDlpResolver::new(config.resolver.program.clone())),
                config.resolver.max_height,
            ),
            connector: SourceConnector::system(),
            sampler: FrameSampler::new(config.max_width, config.skip_frames),
            detector,
            renderer: AnnotationRenderer::new(display.quit_key),
            logger: ResultLogger::open(&config.results.path, config.results.format),
            display: open_display(display.enabled, &display.window_title, display.quit_key),
            quit_key: display.quit_key,
        }))
    }

    pub fn from_parts(parts: PipelineParts) -> Self {
        Self {
            resolver: parts.resolver,
            connector: parts.connector,
            sampler: parts.sampler,
            detector: parts.detector,
            renderer: parts.renderer,
            logger: parts.logger,
            display: parts.display,
            quit_key: parts.quit_key,
            interrupt: Arc::new(AtomicBool::new(false)),
            state: PipelineState::Idle,
            run_state: RunState::default(),
        }
    }

    /// Flag checked once per iteration. Setting it ends the run like the quit key.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn logger(&self) -> &ResultLogger {
        &self.logger
    }

    /// Process one source until it ends, the user quits, or a fault occurs.
    ///
    /// An empty `name` falls back to the name derived from the descriptor.
    pub fn run(
        &mut self,
        descriptor: &SourceDescriptor,
        name: &str,
    ) -> Result<RunReport, PipelineError> {
        self.interrupt.store(false, Ordering::SeqCst);
        self.run_state = RunState::default();
        self.set_state(PipelineState::Connecting);

        let mut source = match self.open(descriptor, name) {
            Ok(source) => source,
            Err(err) => {
                self.set_state(PipelineState::Closed);
                return Err(err);
            }
        };
        let source_name = source.display_name().to_string();

        self.set_state(PipelineState::Running);
        log::info!("starting detection on {}", source_name);

        let mut report = RunReport {
            source_name: source_name.clone(),
            frames_read: 0,
            frames_processed: 0,
            events_logged: 0,
            persistence_failures: 0,
            end: RunEnd::EndOfStream,
        };
        let outcome = self.drive(&mut source, &source_name, &mut report);

        self.set_state(PipelineState::Draining);
        self.drain(&mut source);
        report.frames_read = source.frames_read();
        report.frames_processed = self.run_state.processed_count;
        self.set_state(PipelineState::Closed);

        match outcome {
            Ok(end) => {
                report.end = end;
                log::info!(
                    "run on {} finished: {:?}, {} frames read, {} processed, {} events logged",
                    report.source_name,
                    end,
                    report.frames_read,
                    report.frames_processed,
                    report.events_logged
                );
                Ok(report)
            }
            Err(err) => {
                log::error!("run on {} aborted: {}", report.source_name, err);
                Err(err)
            }
        }
    }

    fn open(
        &mut self,
        descriptor: &SourceDescriptor,
        name: &str,
    ) -> Result<OpenSource, PipelineError> {
        let mut resolved = self.resolver.resolve(descriptor)?;
        let name = name.trim();
        if !name.is_empty() {
            resolved.display_name = name.to_string();
        }
        self.connector.connect(resolved)
    }

    fn drive(
        &mut self,
        source: &mut OpenSource,
        source_name: &str,
        report: &mut RunReport,
    ) -> Result<RunEnd, PipelineError> {
        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                log::info!("interrupt received, stopping {}", source_name);
                return Ok(RunEnd::Interrupted);
            }

            let frame = match source.read() {
                Ok(ReadOutcome::Frame(frame)) => frame,
                Ok(ReadOutcome::EndOfStream) => {
                    log::info!("end of stream reached for {}", source_name);
                    return Ok(RunEnd::EndOfStream);
                }
                Err(err) => {
                    log::error!("read error on {}: {}", source_name, err);
                    return Err(err);
                }
            };
            self.run_state.frame_count = frame.index();

            let sampled = self
                .sampler
                .sample(frame)
                .map_err(|err| PipelineError::Render(chain_message(&err)))?;
            let frame = match sampled {
                Sampled::Process(frame) => frame,
                Sampled::Skip(_) => {
                    self.display.refresh();
                    if self.quit_requested() {
                        log::info!("quit key pressed, stopping {}", source_name);
                        return Ok(RunEnd::UserQuit);
                    }
                    continue;
                }
            };

            let detections = self
                .detector
                .detect(&frame)
                .map_err(|err| PipelineError::Detection(chain_message(&err)))?;
            let persons = filter_persons(detections)
                .map_err(|err| PipelineError::Detection(chain_message(&err)))?;
            self.run_state.processed_count += 1;
            self.run_state.last_person_count = persons.len();

            let annotated =
                self.renderer
                    .render(&frame, &persons, &self.run_state, source_name)?;

            let person_count = u32::try_from(persons.len()).unwrap_or(u32::MAX);
            let event =
                DetectionEvent::now(source_name, self.run_state.processed_count, person_count);
            match self.logger.append(&event) {
                Ok(()) => report.events_logged += 1,
                Err(err) => {
                    report.persistence_failures += 1;
                    log::warn!(
                        "frame {} of {} not logged: {}",
                        event.frame_number,
                        source_name,
                        err
                    );
                }
            }

            self.display
                .show(annotated.frame())
                .map_err(|err| PipelineError::Render(chain_message(&err)))?;

            if self.quit_requested() {
                log::info!("quit key pressed, stopping {}", source_name);
                return Ok(RunEnd::UserQuit);
            }
        }
    }

    fn quit_requested(&mut self) -> bool {
        let quit_key = self.quit_key;
        self.display
            .poll_key()
            .map_or(false, |key| key.eq_ignore_ascii_case(&quit_key))
    }

    fn drain(&mut self, source: &mut OpenSource) {
        source.close();
        self.display.close();
        log::info!("resources released for {}", source.display_name());
    }

    fn set_state(&mut self, next: PipelineState) {
        log::debug!("pipeline state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
