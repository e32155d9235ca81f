use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{ProbeInfo, Profile, ToolError, Toolchain};

/// Scripted stand-in for ffmpeg/ffprobe. Succeeds by writing a small file,
/// fails for any (profile, path fragment) pair it was told to fail on.
#[derive(Default)]
pub struct ScriptedTools {
    failures: Vec<(Profile, String)>,
    probes: HashMap<String, ProbeInfo>,
    missing: bool,
    calls: Mutex<Vec<(Profile, PathBuf)>>,
    probe_calls: Mutex<usize>,
}

impl ScriptedTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, profile: Profile, path_fragment: &str) -> Self {
        self.failures.push((profile, path_fragment.to_string()));
        self
    }

    /// Probe result for inputs whose filename equals `filename`.
    pub fn with_probe(mut self, filename: &str, info: ProbeInfo) -> Self {
        self.probes.insert(filename.to_string(), info);
        self
    }

    pub fn missing(mut self) -> Self {
        self.missing = true;
        self
    }

    pub fn calls(&self) -> Vec<(Profile, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn transcode_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn probe_count(&self) -> usize {
        *self.probe_calls.lock().unwrap()
    }
}

impl Toolchain for ScriptedTools {
    fn check_available(&self) -> Result<(), ToolError> {
        if self.missing {
            return Err(ToolError::Missing {
                tool: "ffmpeg",
                env: "IGX_FFMPEG_PATH",
            });
        }
        Ok(())
    }

    fn transcode(&self, input: &Path, output: &Path, profile: Profile) -> Result<(), ToolError> {
        self.calls.lock().unwrap().push((profile, input.to_path_buf()));

        let input_str = input.to_string_lossy();
        if self
            .failures
            .iter()
            .any(|(p, frag)| *p == profile && input_str.contains(frag.as_str()))
        {
            return Err(ToolError::Failed {
                tool: "ffmpeg",
                status: "exit status: 1".to_string(),
                stderr: format!("{}: Invalid data found when processing input", profile.name()),
            });
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output, profile.name())?;
        Ok(())
    }

    fn probe(&self, input: &Path) -> Result<ProbeInfo, ToolError> {
        *self.probe_calls.lock().unwrap() += 1;
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(self.probes.get(&name).cloned().unwrap_or(ProbeInfo {
            has_video: true,
            has_audio: false,
            creation_time: None,
        }))
    }
}
