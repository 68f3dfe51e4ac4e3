//! Media inspection and transcoding via ffprobe/ffmpeg
//!
//! Used only by the stereo tier of the fallback ladder: probe the channel
//! count, split a stereo file into two mono files and merge two mono files
//! back into stereo.

use super::probe_log::ProbeLog;
use crate::config::MediaSettings;
use crate::error::{EnhanceError, Result};
use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Output};
use tracing::{debug, warn};

/// Split argument templates, tried in order since ffmpeg versions differ
const SPLIT_SYNTAXES: &[&[&str]] = &[
    &["-y", "-i", "{input}", "-map_channel", "0.0.0", "{left}", "-map_channel", "0.0.1", "{right}"],
    &[
        "-y",
        "-i",
        "{input}",
        "-filter_complex",
        "channelsplit=channel_layout=stereo[L][R]",
        "-map",
        "[L]",
        "{left}",
        "-map",
        "[R]",
        "{right}",
    ],
];

#[derive(Debug, Clone)]
pub struct MediaTools {
    ffprobe: String,
    ffmpeg: String,
}

impl MediaTools {
    pub fn new(ffprobe: &str, ffmpeg: &str) -> Self {
        Self {
            ffprobe: ffprobe.to_string(),
            ffmpeg: ffmpeg.to_string(),
        }
    }

    pub fn from_settings(settings: &MediaSettings) -> Self {
        Self::new(&settings.ffprobe, &settings.ffmpeg)
    }

    /// Channel count of the first audio stream, 0 when unknown
    pub fn probe_channels(&self, input: &Path) -> u32 {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-select_streams", "a:0", "-show_entries", "stream=channels"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(input)
            .output();

        match output {
            Ok(output) => {
                let text = String::from_utf8_lossy(&output.stdout);
                let channels = text.trim().parse().unwrap_or(0);
                debug!(input = %input.display(), channels, "Probed channels");
                channels
            }
            Err(e) => {
                warn!(program = %self.ffprobe, error = %e, "Channel probe failed");
                0
            }
        }
    }

    /// Split a stereo file into `left` and `right` mono files
    pub fn split_stereo(&self, input: &Path, left: &Path, right: &Path, log: &ProbeLog) -> Result<()> {
        let mut failures = Vec::new();

        for syntax in SPLIT_SYNTAXES {
            let args: Vec<String> = syntax
                .iter()
                .map(|a| {
                    a.replace("{input}", &input.to_string_lossy())
                        .replace("{left}", &left.to_string_lossy())
                        .replace("{right}", &right.to_string_lossy())
                })
                .collect();

            let output = self.ffmpeg(&args)?;
            if output.status.success() {
                return Ok(());
            }
            failures.push(format!(
                "{}\n{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        log.append(format!("ffmpeg split failed:\n{}", failures.join("\n")));
        Err(EnhanceError::TranscodeFailed("ffmpeg split failed".into()))
    }

    /// Merge two mono files into a stereo `merged`; returns ffmpeg's stderr
    pub fn merge_stereo(&self, left: &Path, right: &Path, merged: &Path, log: &ProbeLog) -> Result<String> {
        let args: Vec<String> = vec![
            "-y".into(),
            "-i".into(),
            left.to_string_lossy().into_owned(),
            "-i".into(),
            right.to_string_lossy().into_owned(),
            "-filter_complex".into(),
            "amerge=inputs=2".into(),
            "-ac".into(),
            "2".into(),
            merged.to_string_lossy().into_owned(),
        ];

        let output = self.ffmpeg(&args)?;
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        log.append(format!(
            "ffmpeg merge RC={}\nSTDOUT:\n{}\nSTDERR:\n{}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout),
            stderr
        ));

        if output.status.success() && merged.is_file() {
            Ok(stderr)
        } else {
            Err(EnhanceError::TranscodeFailed(stderr))
        }
    }

    fn ffmpeg(&self, args: &[String]) -> Result<Output> {
        Command::new(&self.ffmpeg).args(args).output().map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::NotFound => format!("{} not found", self.ffmpeg),
                _ => format!("{}: {}", self.ffmpeg, e),
            };
            EnhanceError::TranscodeFailed(reason)
        })
    }
}
