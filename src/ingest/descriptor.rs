//! Source descriptors and their resolution into openable streams.
//!
//! A `SourceDescriptor` is what the user typed. A `ResolvedStream` is what the
//! connector can open directly. Resolution is deterministic and has no side
//! effects except the single extractor call for streamed platform URLs.

use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::resolver::StreamResolver;
use crate::error::{chain_message, PipelineError};

/// Where to read video from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceDescriptor {
    LocalCamera(u32),
    LocalFile(PathBuf),
    RemoteVideoUrl(String),
    StreamedPlatformUrl(String),
}

impl SourceDescriptor {
    /// Classify raw user input.
    ///
    /// Integers are camera indices, platform video pages are streamed URLs, other
    /// strings with a URL scheme are remote URLs and everything else is a path.
    /// An integer outside the camera index range is rejected.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let raw = raw.trim();
        if let Ok(index) = raw.parse::<i64>() {
            return u32::try_from(index)
                .map(SourceDescriptor::LocalCamera)
                .map_err(|_| PipelineError::Resolution {
                    reason: format!(
                        "camera index must be between 0 and {}, got {}",
                        u32::MAX,
                        index
                    ),
                });
        }
        if is_platform_url(raw) {
            return Ok(SourceDescriptor::StreamedPlatformUrl(raw.to_string()));
        }
        if has_url_scheme(raw) {
            return Ok(SourceDescriptor::RemoteVideoUrl(raw.to_string()));
        }
        Ok(SourceDescriptor::LocalFile(PathBuf::from(raw)))
    }

    /// Human-readable name used when the caller does not supply one.
    pub fn display_name(&self) -> String {
        match self {
            SourceDescriptor::LocalCamera(index) => format!("Camera {}", index),
            SourceDescriptor::LocalFile(path) => file_display_name(path),
            SourceDescriptor::RemoteVideoUrl(raw) => url_display_name(raw),
            SourceDescriptor::StreamedPlatformUrl(raw) => match url::Url::parse(raw)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
            {
                Some(host) => format!("{} stream", host.trim_start_matches("www.")),
                None => "Streamed video".to_string(),
            },
        }
    }
}

impl From<u32> for SourceDescriptor {
    fn from(index: u32) -> Self {
        SourceDescriptor::LocalCamera(index)
    }
}

impl TryFrom<&str> for SourceDescriptor {
    type Error = PipelineError;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        SourceDescriptor::parse(raw)
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::LocalCamera(index) => write!(f, "camera:{}", index),
            SourceDescriptor::LocalFile(path) => write!(f, "{}", path.display()),
            SourceDescriptor::RemoteVideoUrl(raw) => write!(f, "{}", raw),
            SourceDescriptor::StreamedPlatformUrl(raw) => write!(f, "{}", raw),
        }
    }
}

/// A concrete endpoint the connector can open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamTarget {
    Device(u32),
    File(PathBuf),
    Url(String),
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamTarget::Device(index) => write!(f, "camera:{}", index),
            StreamTarget::File(path) => write!(f, "{}", path.display()),
            StreamTarget::Url(raw) => write!(f, "{}", raw),
        }
    }
}

/// Resolver output. Consumed exactly once by the connector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedStream {
    pub target: StreamTarget,
    pub display_name: String,
}

/// Turns descriptors into resolved streams, delegating platform pages to a `StreamResolver`.
pub struct SourceResolver {
    platform: Box<dyn StreamResolver>,
    max_height: u32,
}

impl SourceResolver {
    pub fn new(platform: Box<dyn StreamResolver>, max_height: u32) -> Self {
        Self {
            platform,
            max_height,
        }
    }

    pub fn resolve(&self, descriptor: &SourceDescriptor) -> Result<ResolvedStream, PipelineError> {
        let display_name = descriptor.display_name();
        let target = match descriptor {
            SourceDescriptor::LocalCamera(index) => StreamTarget::Device(*index),
            SourceDescriptor::LocalFile(path) => StreamTarget::File(path.clone()),
            SourceDescriptor::RemoteVideoUrl(raw) => StreamTarget::Url(raw.clone()),
            SourceDescriptor::StreamedPlatformUrl(page) => {
                log::info!(
                    "resolving streamed URL via {} (max {}p)",
                    self.platform.name(),
                    self.max_height
                );
                let direct = self
                    .platform
                    .resolve_stream(page, self.max_height)
                    .map_err(|err| {
                        log::error!("stream extraction failed for {}: {:#}", page, err);
                        PipelineError::Resolution {
                            reason: chain_message(&err),
                        }
                    })?;
                StreamTarget::Url(direct)
            }
        };
        Ok(ResolvedStream {
            target,
            display_name,
        })
    }
}

fn platform_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(https?://)?([a-z0-9-]+\.)*(youtube\.com|youtu\.be)(/|$|\?)")
            .unwrap_or_else(|err| panic!("platform URL pattern is invalid: {err}"))
    })
}

fn is_platform_url(raw: &str) -> bool {
    platform_pattern().is_match(raw)
}

fn has_url_scheme(raw: &str) -> bool {
    match url::Url::parse(raw) {
        // Single-letter schemes are Windows drive letters (C:\video.mp4).
        Ok(parsed) => parsed.scheme().len() > 1,
        Err(_) => false,
    }
}

fn file_display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn url_display_name(raw: &str) -> String {
    let Ok(parsed) = url::Url::parse(raw) else {
        return raw.to_string();
    };
    let last_segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string));
    match (last_segment, parsed.host_str()) {
        (Some(segment), _) => segment,
        (None, Some(host)) => host.to_string(),
        (None, None) => raw.to_string(),
    }
}
