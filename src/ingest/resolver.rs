//! Stream-resolution collaborator for platform-hosted videos.
//!
//! Platform pages (YouTube and friends) are not directly decodable. An external
//! extractor turns the page URL into a direct, time-limited media URL capped at
//! a quality ceiling. Failures are surfaced as errors, never replaced by a stale URL.

use anyhow::{anyhow, Context, Result};
use std::process::Command;

/// Resolve a platform page URL into a directly playable media URL.
pub trait StreamResolver: Send {
    /// Resolver identifier for logs.
    fn name(&self) -> &'static str;

    /// Return a direct URL whose video height does not exceed `max_height`.
    fn resolve_stream(&self, page_url: &str, max_height: u32) -> Result<String>;
}

/// Resolver backed by a `yt-dlp` compatible executable.
#[derive(Clone, Debug)]
pub struct YtDlpResolver {
    program: String,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn format_selector(max_height: u32) -> String {
        format!("best[height<={}]", max_height)
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl StreamResolver for YtDlpResolver {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn resolve_stream(&self, page_url: &str, max_height: u32) -> Result<String> {
        let output = Command::new(&self.program)
            .args(["--quiet", "--no-warnings", "--no-playlist", "-f"])
            .arg(Self::format_selector(max_height))
            .arg("--get-url")
            .arg(page_url)
            .output()
            .with_context(|| format!("failed to launch {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.trim();
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                if reason.is_empty() { "no diagnostic output" } else { reason }
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_direct_url(&stdout)
    }
}

/// Pick the first usable URL line from extractor output.
pub(crate) fn parse_direct_url(stdout: &str) -> Result<String> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| anyhow!("extractor returned no playable URL"))?;
    let parsed = url::Url::parse(line).with_context(|| format!("extractor returned '{}'", line))?;
    match parsed.scheme() {
        "http" | "https" | "rtsp" | "rtmp" => Ok(line.to_string()),
        other => Err(anyhow!("extractor returned unsupported scheme '{}'", other)),
    }
}
