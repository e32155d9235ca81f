//! Seam between the pipeline and the external codec/probe binaries.

pub mod ffmpeg;

#[cfg(test)]
pub(crate) mod fake;

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} not found (set {env} or add it to PATH)")]
    Missing { tool: &'static str, env: &'static str },

    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed ({status}): {stderr}")]
    Failed {
        tool: &'static str,
        status: String,
        stderr: String,
    },

    #[error("{tool} produced no output")]
    EmptyOutput { tool: &'static str },

    #[error("unreadable {tool} output: {message}")]
    Parse { tool: &'static str, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operation profiles understood by the codec tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    /// Full-size still, width capped
    ImageFull,
    ImageThumb,
    /// Streaming-friendly re-encode
    VideoStream,
    /// Stream copy into a progressive container
    VideoRemux,
    /// Black canvas paired with the source's audio track
    VideoFromAudio,
    /// Single still frame from a video
    PosterFrame,
    /// Solid-color frame; the input is ignored
    PlaceholderFrame,
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::ImageFull => "image-full",
            Profile::ImageThumb => "image-thumb",
            Profile::VideoStream => "video-stream",
            Profile::VideoRemux => "video-remux",
            Profile::VideoFromAudio => "video-from-audio",
            Profile::PosterFrame => "poster-frame",
            Profile::PlaceholderFrame => "placeholder-frame",
        }
    }
}

/// Container facts reported by the probe tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeInfo {
    pub has_video: bool,
    pub has_audio: bool,
    /// Raw `creation_time` tag, format or first stream that carries one
    pub creation_time: Option<String>,
}

pub trait Toolchain: Send + Sync {
    /// Fails when a required binary cannot be run.
    fn check_available(&self) -> Result<(), ToolError>;

    /// Produce `output` from `input`. On failure no file is left at `output`.
    fn transcode(&self, input: &Path, output: &Path, profile: Profile) -> Result<(), ToolError>;

    fn probe(&self, input: &Path) -> Result<ProbeInfo, ToolError>;
}
