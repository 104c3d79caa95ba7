//! person_counter - count people in a live or recorded video stream
//!
//! Without `--source` an interactive menu offers a local camera, two public
//! sample videos, a local file, a platform video page and a custom URL. Each
//! selection runs until the stream ends, the quit key is pressed, or Ctrl-C.
//! Ctrl-C at the menu after an interrupted run (or twice in a row) exits.

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use person_counter::{
    CounterConfig, PipelineController, PipelineError, RunReport, SourceDescriptor,
};

#[path = "../ui.rs"]
mod ui;

const BIG_BUCK_BUNNY_URL: &str =
    "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4";
const SAMPLE_VIDEO_URL: &str =
    "https://www.learningcontainer.com/wp-content/uploads/2020/05/sample-mp4-file.mp4";

#[derive(Parser, Debug)]
#[command(
    name = "person_counter",
    about = "Detect and count people in a video stream"
)]
struct Args {
    /// Run one source and exit: camera index, file path, or URL
    #[arg(long, value_name = "SOURCE")]
    source: Option<String>,

    /// Display name for --source (derived from the source when omitted)
    #[arg(long, requires = "source")]
    name: Option<String>,

    /// Frames wider than this are scaled down before detection
    #[arg(long, value_name = "PIXELS")]
    max_width: Option<u32>,

    /// Process one frame out of every N+1
    #[arg(long, value_name = "N")]
    skip_frames: Option<u32>,

    /// Results log path
    #[arg(long, value_name = "PATH")]
    results: Option<PathBuf>,

    /// Do not open a window
    #[arg(long)]
    headless: bool,

    /// Detection model weights
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Detector backend (stub|tract)
    #[arg(long)]
    detector: Option<String>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

enum MenuChoice {
    Run(SourceDescriptor, String),
    Invalid,
    Quit,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = io::stderr().is_terminal();
    let stdout_is_tty = io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = load_config(&args)?;
    log::info!(
        "max width {}, skip {} frames, results -> {} ({})",
        cfg.max_width,
        cfg.skip_frames,
        cfg.results.path.display(),
        cfg.results.format.as_str()
    );

    let mut controller = {
        let _stage = ui.stage("Load detector");
        PipelineController::new(&cfg)?
    };

    let interrupt = controller.interrupt_handle();
    install_interrupt_handler(Arc::clone(&interrupt));

    if let Some(raw) = args.source.as_deref() {
        let descriptor = SourceDescriptor::parse(raw)?;
        let name = args.name.clone().unwrap_or_default();
        let report = run_source(&ui, &mut controller, &descriptor, &name)?;
        print_report(&report);
        return Ok(());
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    loop {
        match prompt_choice(&mut input)? {
            MenuChoice::Quit => break,
            MenuChoice::Invalid => log::warn!("invalid choice"),
            MenuChoice::Run(descriptor, name) => {
                match run_source(&ui, &mut controller, &descriptor, &name) {
                    Ok(report) => print_report(&report),
                    Err(err) => log::error!("{}", err),
                }
            }
        }
    }

    log::info!("bye");
    Ok(())
}

fn load_config(args: &Args) -> Result<CounterConfig> {
    let mut cfg = CounterConfig::load()?;
    if let Some(width) = args.max_width {
        cfg.max_width = width;
    }
    if let Some(skip) = args.skip_frames {
        cfg.skip_frames = skip;
    }
    if let Some(path) = &args.results {
        cfg.results.path = path.clone();
    }
    if let Some(model) = &args.model {
        cfg.model_path = model.clone();
    }
    if let Some(detector) = &args.detector {
        cfg.detector = detector.clone();
    }
    if args.headless {
        cfg.display.enabled = false;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn install_interrupt_handler(interrupt: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        if interrupt.swap(true, Ordering::SeqCst) {
            eprintln!();
            std::process::exit(130);
        }
    })
    .expect("error setting Ctrl-C handler");
}

fn run_source(
    ui: &ui::Ui,
    controller: &mut PipelineController,
    descriptor: &SourceDescriptor,
    name: &str,
) -> Result<RunReport, PipelineError> {
    let label = if name.trim().is_empty() {
        descriptor.display_name()
    } else {
        name.trim().to_string()
    };
    let mut stage = ui.stage(&format!("Run {}", label));
    let outcome = controller.run(descriptor, name);
    if let Err(err) = &outcome {
        stage.fail(err.to_string());
    }
    outcome
}

fn print_report(report: &RunReport) {
    println!(
        "{}: {} frames read, {} processed, {} events logged ({:?})",
        report.source_name,
        report.frames_read,
        report.frames_processed,
        report.events_logged,
        report.end
    );
    if report.persistence_failures > 0 {
        println!(
            "warning: {} events could not be written to the results log",
            report.persistence_failures
        );
    }
}

fn prompt_choice(input: &mut impl BufRead) -> Result<MenuChoice> {
    println!();
    println!("Choose a video source:");
    println!("1. Local webcam");
    println!("2. Big Buck Bunny");
    println!("3. Sample video");
    println!("4. Local file");
    println!("5. YouTube");
    println!("6. Custom URL");
    println!("0. Quit");

    let Some(choice) = prompt(input, "Your choice (0-6): ")? else {
        return Ok(MenuChoice::Quit);
    };
    let choice = match choice.as_str() {
        "0" => MenuChoice::Quit,
        "1" => MenuChoice::Run(SourceDescriptor::LocalCamera(0), "Local webcam".into()),
        "2" => MenuChoice::Run(
            SourceDescriptor::RemoteVideoUrl(BIG_BUCK_BUNNY_URL.into()),
            "Big Buck Bunny".into(),
        ),
        "3" => MenuChoice::Run(
            SourceDescriptor::RemoteVideoUrl(SAMPLE_VIDEO_URL.into()),
            "Sample video".into(),
        ),
        "4" => {
            let Some(path) = prompt(input, "Path to file: ")? else {
                return Ok(MenuChoice::Quit);
            };
            let path = PathBuf::from(path);
            if !path.exists() {
                log::error!("file not found: {}", path.display());
                return Ok(MenuChoice::Invalid);
            }
            let descriptor = SourceDescriptor::LocalFile(path);
            let name = descriptor.display_name();
            MenuChoice::Run(descriptor, name)
        }
        "5" => match prompt(input, "YouTube URL: ")? {
            Some(url) => MenuChoice::Run(
                SourceDescriptor::StreamedPlatformUrl(url),
                "YouTube".into(),
            ),
            None => MenuChoice::Quit,
        },
        "6" => match prompt(input, "Custom URL: ")? {
            Some(url) => match SourceDescriptor::parse(&url) {
                Ok(descriptor) => MenuChoice::Run(descriptor, "Custom URL".into()),
                Err(err) => {
                    log::error!("{}", err);
                    MenuChoice::Invalid
                }
            },
            None => MenuChoice::Quit,
        },
        _ => MenuChoice::Invalid,
    };
    Ok(choice)
}

/// Read one trimmed line. `None` on end of input.
fn prompt(input: &mut impl BufRead, label: &str) -> Result<Option<String>> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}
