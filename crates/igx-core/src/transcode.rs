//! Fallback chains around the codec tool.

use std::fmt;
use std::path::Path;

use crate::tools::{Profile, Toolchain};

type AttemptFn<'a, T> = Box<dyn FnOnce() -> anyhow::Result<T> + 'a>;

/// Ordered (name, attempt) pairs, tried until one succeeds.
pub struct FallbackChain<'a, T> {
    attempts: Vec<(&'static str, AttemptFn<'a, T>)>,
}

/// Every attempt of a chain failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainFailure {
    pub attempts: Vec<(&'static str, String)>,
}

impl fmt::Display for ChainFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .attempts
            .iter()
            .map(|(name, msg)| format!("{}: {}", name, msg))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ChainFailure {}

impl<'a, T> Default for FallbackChain<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> FallbackChain<'a, T> {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn then(mut self, name: &'static str, attempt: impl FnOnce() -> anyhow::Result<T> + 'a) -> Self {
        self.attempts.push((name, Box::new(attempt)));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.attempts.iter().map(|(name, _)| *name).collect()
    }

    /// Run attempts in order; the first success wins and reports its name.
    pub fn run(self) -> Result<(&'static str, T), ChainFailure> {
        let mut failures = Vec::with_capacity(self.attempts.len());
        for (name, attempt) in self.attempts {
            match attempt() {
                Ok(value) => {
                    if !failures.is_empty() {
                        log::debug!("{} succeeded after {} failed attempt(s)", name, failures.len());
                    }
                    return Ok((name, value));
                }
                Err(e) => failures.push((name, format!("{:#}", e))),
            }
        }
        Err(ChainFailure { attempts: failures })
    }
}

/// Full-size image and thumbnail. Both must succeed.
pub fn transcode_image(
    tools: &dyn Toolchain,
    src: &Path,
    full: &Path,
    thumb: &Path,
) -> anyhow::Result<()> {
    tools.transcode(src, full, Profile::ImageFull)?;
    tools.transcode(src, thumb, Profile::ImageThumb)?;
    Ok(())
}

/// Transcode, else remux, else a black canvas over the source audio.
/// Returns the name of the step that produced `out`.
pub fn transcode_video(
    tools: &dyn Toolchain,
    src: &Path,
    out: &Path,
) -> Result<&'static str, ChainFailure> {
    FallbackChain::new()
        .then("transcode", || Ok(tools.transcode(src, out, Profile::VideoStream)?))
        .then("remux", || Ok(tools.transcode(src, out, Profile::VideoRemux)?))
        .then("audio-only", || {
            let info = tools.probe(src)?;
            anyhow::ensure!(info.has_audio, "no audio stream");
            Ok(tools.transcode(src, out, Profile::VideoFromAudio)?)
        })
        .run()
        .map(|(step, ())| step)
}

/// Poster from the transcoded output, else from the source, else a placeholder.
/// `None` only when even the placeholder could not be written.
pub fn video_poster(
    tools: &dyn Toolchain,
    src: &Path,
    transcoded: &Path,
    poster: &Path,
) -> Option<&'static str> {
    let result = FallbackChain::new()
        .then("from-output", || Ok(tools.transcode(transcoded, poster, Profile::PosterFrame)?))
        .then("from-source", || Ok(tools.transcode(src, poster, Profile::PosterFrame)?))
        .then("placeholder", || Ok(tools.transcode(src, poster, Profile::PlaceholderFrame)?))
        .run();

    match result {
        Ok((step, ())) => {
            if step != "from-output" {
                log::debug!("poster for {} via {}", src.display(), step);
            }
            Some(step)
        }
        Err(failure) => {
            log::warn!("no poster for {}: {}", src.display(), failure);
            None
        }
    }
}
