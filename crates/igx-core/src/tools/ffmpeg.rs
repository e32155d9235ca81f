// ffmpeg/ffprobe invocation
//
// Binary resolution: IGX_FFMPEG_PATH / IGX_FFPROBE_PATH when set and present,
// otherwise the bare name for PATH lookup.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde::Deserialize;

use super::{ProbeInfo, Profile, ToolError, Toolchain};
use crate::settings::EncodeSettings;

const FFMPEG_ENV: &str = "IGX_FFMPEG_PATH";
const FFPROBE_ENV: &str = "IGX_FFPROBE_PATH";

/// Lines of stderr kept in error messages
const STDERR_TAIL_LINES: usize = 3;

fn resolve_tool(env_key: &str, default_name: &str) -> PathBuf {
    if let Ok(v) = env::var(env_key) {
        let p = PathBuf::from(&v);
        if p.exists() {
            return p;
        }
    }
    PathBuf::from(default_name)
}

pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    settings: EncodeSettings,
}

impl Ffmpeg {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf, settings: EncodeSettings) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            settings,
        }
    }

    pub fn from_env(settings: EncodeSettings) -> Self {
        Self::new(
            resolve_tool(FFMPEG_ENV, "ffmpeg"),
            resolve_tool(FFPROBE_ENV, "ffprobe"),
            settings,
        )
    }

    /// Full ffmpeg argument list for one operation.
    pub fn args_for(&self, input: &Path, output: &Path, profile: Profile) -> Vec<OsString> {
        let s = &self.settings;

        // (options before the source input, options after it)
        let (before, after): (Vec<String>, Vec<String>) = match profile {
            Profile::ImageFull | Profile::ImageThumb => {
                let width = if profile == Profile::ImageFull {
                    s.image_max_width
                } else {
                    s.thumb_max_width
                };
                (
                    strings(&["-autorotate"]),
                    strings(&[
                        "-vf", &format!("scale='min({},iw)':-2", width),
                        "-frames:v", "1",
                        "-c:v", "libwebp", "-quality", &s.image_quality.to_string(),
                    ]),
                )
            }
            Profile::VideoStream => {
                let max = s.video_max_dimension;
                let scale = format!(
                    "scale='min({max},iw)':'min({max},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2,format=yuv420p"
                );
                (
                    Vec::new(),
                    strings(&[
                        "-vf", &scale,
                        "-c:v", "libx264", "-preset", &s.video_preset, "-crf", &s.video_crf.to_string(),
                        "-c:a", "aac", "-b:a", &s.audio_bitrate, "-ac", "2",
                        "-movflags", "+faststart",
                    ]),
                )
            }
            Profile::VideoRemux => (
                Vec::new(),
                strings(&["-map", "0", "-c", "copy", "-movflags", "+faststart"]),
            ),
            Profile::VideoFromAudio => (
                strings(&[
                    "-f", "lavfi",
                    "-i", &format!("color=c=black:s={}x{}:r=30", s.placeholder_width, s.placeholder_height),
                ]),
                strings(&[
                    "-map", "0:v:0", "-map", "1:a:0", "-shortest",
                    "-c:v", "libx264", "-preset", "veryfast", "-tune", "stillimage", "-pix_fmt", "yuv420p",
                    "-c:a", "aac", "-b:a", &s.audio_bitrate,
                    "-movflags", "+faststart",
                ]),
            ),
            Profile::PosterFrame => (
                strings(&["-ss", &format!("{:.3}", s.poster_seek_seconds)]),
                strings(&[
                    "-frames:v", "1",
                    "-vf", &format!("scale='min({},iw)':-2", s.image_max_width),
                    "-q:v", &s.poster_qscale.to_string(),
                ]),
            ),
            Profile::PlaceholderFrame => (
                strings(&[
                    "-f", "lavfi",
                    "-i", &format!(
                        "color=c={}:s={}x{}",
                        s.placeholder_color, s.placeholder_width, s.placeholder_height
                    ),
                ]),
                strings(&["-frames:v", "1", "-q:v", &s.poster_qscale.to_string()]),
            ),
        };

        let mut args: Vec<OsString> = strings(&["-y", "-nostdin", "-v", "error"])
            .into_iter()
            .map(OsString::from)
            .collect();
        args.extend(before.into_iter().map(OsString::from));
        if profile != Profile::PlaceholderFrame {
            args.push("-i".into());
            args.push(input.into());
        }
        args.extend(after.into_iter().map(OsString::from));
        args.push(output.into());
        args
    }

    fn run(tool: &'static str, mut cmd: Command) -> Result<Output, ToolError> {
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ToolError::Spawn { tool, source })?;
        if !output.status.success() {
            return Err(ToolError::Failed {
                tool,
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(output)
    }

    fn check_binary(path: &Path, tool: &'static str, env: &'static str) -> Result<(), ToolError> {
        let mut cmd = Command::new(path);
        cmd.arg("-version").stdout(Stdio::null()).stderr(Stdio::null());
        match Self::run(tool, cmd) {
            Ok(_) => Ok(()),
            Err(_) => Err(ToolError::Missing { tool, env }),
        }
    }
}

impl Toolchain for Ffmpeg {
    fn check_available(&self) -> Result<(), ToolError> {
        Self::check_binary(&self.ffmpeg, "ffmpeg", FFMPEG_ENV)?;
        Self::check_binary(&self.ffprobe, "ffprobe", FFPROBE_ENV)
    }

    fn transcode(&self, input: &Path, output: &Path, profile: Profile) -> Result<(), ToolError> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Keep the real extension last so ffmpeg still picks the muxer from it
        let tmp_path = temp_sibling(output);

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(self.args_for(input, &tmp_path, profile));
        if let Err(e) = Self::run("ffmpeg", cmd) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }

        let size = std::fs::metadata(&tmp_path).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(ToolError::EmptyOutput { tool: "ffmpeg" });
        }

        std::fs::rename(&tmp_path, output)?;
        Ok(())
    }

    fn probe(&self, input: &Path) -> Result<ProbeInfo, ToolError> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(input);
        let output = Self::run("ffprobe", cmd)?;
        parse_probe_output(&output.stdout)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn temp_sibling(output: &Path) -> PathBuf {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("out");
    output.with_extension(format!("tmp.{}", ext))
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join(" | ");
    if tail.is_empty() {
        "no diagnostic output".to_string()
    } else {
        tail
    }
}

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    streams: Option<Vec<FFprobeStream>>,
    format: Option<FFprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    tags: Option<FFprobeTags>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    tags: Option<FFprobeTags>,
}

#[derive(Debug, Deserialize)]
struct FFprobeTags {
    creation_time: Option<String>,
}

pub(crate) fn parse_probe_output(stdout: &[u8]) -> Result<ProbeInfo, ToolError> {
    let parsed: FFprobeOutput = serde_json::from_slice(stdout).map_err(|e| ToolError::Parse {
        tool: "ffprobe",
        message: e.to_string(),
    })?;

    let mut info = ProbeInfo::default();
    let streams = parsed.streams.unwrap_or_default();
    for stream in &streams {
        match stream.codec_type.as_deref() {
            Some("video") => info.has_video = true,
            Some("audio") => info.has_audio = true,
            _ => {}
        }
    }

    info.creation_time = parsed
        .format
        .and_then(|f| f.tags)
        .and_then(|t| t.creation_time)
        .or_else(|| {
            streams
                .iter()
                .filter_map(|s| s.tags.as_ref())
                .find_map(|t| t.creation_time.clone())
        });

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> Ffmpeg {
        Ffmpeg::new("ffmpeg".into(), "ffprobe".into(), EncodeSettings::default())
    }

    fn args(profile: Profile) -> Vec<String> {
        tool()
            .args_for(Path::new("/in/src.mov"), Path::new("/out/x.mp4"), profile)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_image_args() {
        let a = args(Profile::ImageThumb);
        assert!(a.contains(&"scale='min(400,iw)':-2".to_string()));
        assert!(a.contains(&"libwebp".to_string()));
        let autorotate = a.iter().position(|x| x == "-autorotate").unwrap();
        let input = a.iter().position(|x| x == "/in/src.mov").unwrap();
        assert!(autorotate < input);
        assert_eq!(a.last().unwrap(), "/out/x.mp4");
    }

    #[test]
    fn test_video_args() {
        let a = args(Profile::VideoStream);
        assert!(a.contains(&"libx264".to_string()));
        assert!(a.contains(&"+faststart".to_string()));
        assert!(a.contains(&"23".to_string()));

        let remux = args(Profile::VideoRemux);
        assert!(remux.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));

        let synth = args(Profile::VideoFromAudio);
        assert!(synth.contains(&"color=c=black:s=1280x720:r=30".to_string()));
        assert!(synth.contains(&"1:a:0".to_string()));
    }

    #[test]
    fn test_placeholder_ignores_input() {
        let a = args(Profile::PlaceholderFrame);
        assert!(!a.contains(&"/in/src.mov".to_string()));
        assert!(a.contains(&"color=c=0x202020:s=1280x720".to_string()));
    }

    #[test]
    fn test_temp_sibling_keeps_extension() {
        assert_eq!(temp_sibling(Path::new("/o/a.webp")), PathBuf::from("/o/a.tmp.webp"));
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "streams": [
                {"codec_type": "video", "tags": {"creation_time": "2021-06-01T10:00:00.000000Z"}},
                {"codec_type": "audio"}
            ],
            "format": {"tags": {}}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert!(info.has_video);
        assert!(info.has_audio);
        assert_eq!(info.creation_time.as_deref(), Some("2021-06-01T10:00:00.000000Z"));

        let silent = parse_probe_output(br#"{"streams":[{"codec_type":"video"}],"format":{"tags":{"creation_time":"2020-01-01T00:00:00Z"}}}"#).unwrap();
        assert!(!silent.has_audio);
        assert_eq!(silent.creation_time.as_deref(), Some("2020-01-01T00:00:00Z"));

        assert!(parse_probe_output(b"garbage").is_err());
    }

    #[test]
    fn test_stderr_tail() {
        assert_eq!(stderr_tail(b"a\nb\n\nc\nd\n"), "b | c | d");
        assert_eq!(stderr_tail(b""), "no diagnostic output");
    }
}
