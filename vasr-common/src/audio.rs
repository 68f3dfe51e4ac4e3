//! Audio buffer model and file codec
//!
//! Decoding uses symphonia so that any container the original tool accepted
//! (WAV, FLAC, MP3, OGG, M4A) can be fed to the pipeline. Encoding always
//! produces 32-bit float WAV through hound.

use crate::{Error, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Fixed output rate of every enhanced file (48 kHz)
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// File extensions treated as audio when searching for produced files
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "flac", "mp3", "m4a", "ogg"];

/// Planar floating-point audio
///
/// Invariant: every channel has the same length and shares `sample_rate`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Build a buffer from planar channel data
    ///
    /// Fails if no channel is given, the rate is zero, or channel lengths differ.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if channels.is_empty() {
            return Err(Error::InvalidInput("audio buffer needs at least one channel".into()));
        }
        if sample_rate == 0 {
            return Err(Error::InvalidInput("sample rate must be non-zero".into()));
        }
        let frames = channels[0].len();
        if let Some(idx) = channels.iter().position(|c| c.len() != frames) {
            return Err(Error::InvalidInput(format!(
                "channel {} has {} samples, expected {}",
                idx,
                channels[idx].len(),
                frames
            )));
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Single-channel buffer
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(vec![samples], sample_rate)
    }

    /// Two-channel buffer; lengths must already match
    pub fn stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(vec![left, right], sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Consume the buffer, handing back planar channel data
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Arithmetic mean across channels
    pub fn downmix(&self) -> Vec<f32> {
        let count = self.channels.len() as f32;
        (0..self.frames())
            .map(|frame| self.channels.iter().map(|c| c[frame]).sum::<f32>() / count)
            .collect()
    }
}

/// Decode an audio file into planar f32 channels
pub fn read_audio(path: &Path) -> Result<AudioBuffer> {
    debug!(path = %path.display(), "Decoding audio file");

    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Decode(format!("{}: {}", path.display(), e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode(format!("no audio track in {}", path.display())))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode(format!("unknown sample rate in {}", path.display())))?;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                debug!(path = %path.display(), error = msg, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let channel_count = spec.channels.count();
        if channels.is_empty() {
            channels = vec![Vec::new(); channel_count];
        }

        let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        samples.copy_interleaved_ref(decoded);
        for frame in samples.samples().chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
    }

    if channels.is_empty() {
        // Header-only file: report a single empty channel
        channels.push(Vec::new());
    }

    debug!(
        path = %path.display(),
        sample_rate,
        channels = channels.len(),
        frames = channels[0].len(),
        "Audio decoding complete"
    );

    AudioBuffer::new(channels, sample_rate)
}

/// Encode a buffer as 32-bit float WAV
pub fn write_wav(path: &Path, buffer: &AudioBuffer) -> Result<()> {
    let channel_count = u16::try_from(buffer.channel_count())
        .map_err(|_| Error::Encode(format!("too many channels: {}", buffer.channel_count())))?;
    let spec = hound::WavSpec {
        channels: channel_count,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for frame in 0..buffer.frames() {
        for channel in buffer.channels() {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Whether a path carries one of the known audio extensions
pub fn has_audio_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
