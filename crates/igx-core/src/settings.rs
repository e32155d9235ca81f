use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Encoder parameters for every derived asset. Any field missing from a
/// settings file keeps its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeSettings {
    pub image_max_width: u32,
    pub thumb_max_width: u32,
    /// WebP quality, 0-100
    pub image_quality: u32,
    /// Longest side of transcoded video
    pub video_max_dimension: u32,
    pub video_crf: u32,
    pub video_preset: String,
    pub audio_bitrate: String,
    pub poster_seek_seconds: f64,
    /// JPEG qscale for posters (2 = best, 31 = worst)
    pub poster_qscale: u32,
    pub placeholder_width: u32,
    pub placeholder_height: u32,
    pub placeholder_color: String,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            image_max_width: 1280,
            thumb_max_width: 400,
            image_quality: 82,
            video_max_dimension: 1280,
            video_crf: 23,
            video_preset: "slow".to_string(),
            audio_bitrate: "160k".to_string(),
            poster_seek_seconds: 1.0,
            poster_qscale: 3,
            placeholder_width: 1280,
            placeholder_height: 720,
            placeholder_color: "0x202020".to_string(),
        }
    }
}

impl EncodeSettings {
    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("cannot open settings file {}", path.display()))?;
        let settings: EncodeSettings = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("invalid settings file {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.image_quality <= 100, "image_quality must be 0-100");
        anyhow::ensure!(
            self.image_max_width > 0 && self.thumb_max_width > 0 && self.video_max_dimension > 0,
            "sizes must be positive"
        );
        anyhow::ensure!(
            (2..=31).contains(&self.poster_qscale),
            "poster_qscale must be 2-31"
        );
        anyhow::ensure!(
            self.placeholder_width % 2 == 0 && self.placeholder_height % 2 == 0,
            "placeholder dimensions must be even"
        );
        Ok(())
    }
}
