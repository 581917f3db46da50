//! WAV (RIFF PCM) encoder
//!
//! Produces the canonical 44-byte header followed by interleaved little-endian
//! samples. Integer formats clamp to [-1, 1] and scale negative values by
//! 2^(bits-1) and positive values by 2^(bits-1) - 1, truncating toward zero.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use waveshop_audio::transform::{self, ChannelMode};
use waveshop_audio::{AudioError, SampleBuffer};

/// Size of the RIFF/WAVE header we write
pub const HEADER_LEN: usize = 44;

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;

/// Errors that can occur while encoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unsupported bit depth: {0} (expected 16, 24 or 32)")]
    UnsupportedBitDepth(u16),
    #[error("unsupported channel count: {0} (expected 1 or 2)")]
    UnsupportedChannels(u16),
    #[error("audio data too large for a RIFF container")]
    DataTooLarge,
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitDepth {
    #[default]
    Pcm16,
    Pcm24,
    Float32,
}

impl BitDepth {
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Pcm16 => 16,
            BitDepth::Pcm24 => 24,
            BitDepth::Float32 => 32,
        }
    }

    pub fn bytes_per_sample(self) -> u16 {
        self.bits() / 8
    }

    /// WAVE format tag (1 = integer PCM, 3 = IEEE float)
    pub fn format_tag(self) -> u16 {
        match self {
            BitDepth::Float32 => FORMAT_IEEE_FLOAT,
            BitDepth::Pcm16 | BitDepth::Pcm24 => FORMAT_PCM,
        }
    }

    /// Scale factors for negative and positive full scale
    fn scale(self) -> (f32, f32) {
        match self {
            BitDepth::Pcm16 => (32768.0, 32767.0),
            BitDepth::Pcm24 => (8_388_608.0, 8_388_607.0),
            BitDepth::Float32 => (1.0, 1.0),
        }
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = CodecError;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        match bits {
            16 => Ok(BitDepth::Pcm16),
            24 => Ok(BitDepth::Pcm24),
            32 => Ok(BitDepth::Float32),
            other => Err(CodecError::UnsupportedBitDepth(other)),
        }
    }
}

/// Encoding options
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WavSpec {
    pub bit_depth: BitDepth,
    /// Target channel count (1 or 2); `None` keeps the buffer's layout
    pub channels: Option<u16>,
    /// Target sample rate; `None` keeps the buffer's rate
    pub sample_rate: Option<u32>,
    /// Add TPDF dither before integer quantization
    #[serde(default)]
    pub dither: bool,
    /// Fixed dither seed for reproducible output
    #[serde(default)]
    pub dither_seed: Option<u64>,
}

impl WavSpec {
    pub fn new(bit_depth: BitDepth) -> Self {
        Self {
            bit_depth,
            ..Self::default()
        }
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_dither(mut self, seed: Option<u64>) -> Self {
        self.dither = true;
        self.dither_seed = seed;
        self
    }
}

/// Bring `buffer` to the requested rate and channel count
///
/// Rate conversion runs first, then channel routing: 1 mixes down to mono,
/// 2 keeps the first two channels or duplicates a mono channel.
pub fn conform(
    buffer: &SampleBuffer,
    channels: Option<u16>,
    sample_rate: Option<u32>,
) -> Result<SampleBuffer, CodecError> {
    let mut out = match sample_rate {
        Some(rate) if rate != buffer.sample_rate() => transform::resample(buffer, rate)?,
        _ => buffer.clone(),
    };

    if let Some(target) = channels {
        if target as usize != out.num_channels() {
            out = match target {
                1 => transform::mixdown(&out, ChannelMode::Mono)?,
                2 if out.num_channels() > 2 => {
                    SampleBuffer::new(out.channels()[..2].to_vec(), out.sample_rate())?
                }
                2 => transform::mixdown(&out, ChannelMode::Stereo)?,
                other => return Err(CodecError::UnsupportedChannels(other)),
            };
        }
    }
    Ok(out)
}

/// The 44-byte header for `data_len` bytes of sample data
///
/// Fails with [`CodecError::DataTooLarge`] when a size field does not fit
/// its header slot.
pub fn header_bytes(
    channels: u16,
    sample_rate: u32,
    bit_depth: BitDepth,
    data_len: u32,
) -> Result<[u8; HEADER_LEN], CodecError> {
    let block_align = channels as u64 * bit_depth.bytes_per_sample() as u64;
    let block_align = u16::try_from(block_align).map_err(|_| CodecError::DataTooLarge)?;
    let byte_rate = u32::try_from(sample_rate as u64 * block_align as u64)
        .map_err(|_| CodecError::DataTooLarge)?;
    let riff_len = data_len
        .checked_add(HEADER_LEN as u32 - 8)
        .ok_or(CodecError::DataTooLarge)?;

    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&riff_len.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&bit_depth.format_tag().to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.bits().to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());
    Ok(header)
}

/// Clamp and scale to an integer sample, truncating toward zero
#[inline]
fn quantize(sample: f32, (neg, pos): (f32, f32)) -> i32 {
    let x = sample.clamp(-1.0, 1.0);
    if x < 0.0 {
        (x * neg) as i32
    } else {
        (x * pos) as i32
    }
}

/// Encode `buffer` as a complete WAV file in memory
#[instrument(skip_all, fields(frames = buffer.frame_count(), bits = spec.bit_depth.bits()))]
pub fn encode_wav(buffer: &SampleBuffer, spec: &WavSpec) -> Result<Vec<u8>, CodecError> {
    let buffer = conform(buffer, spec.channels, spec.sample_rate)?;
    let channels = buffer.num_channels();
    let channels_u16 =
        u16::try_from(channels).map_err(|_| CodecError::UnsupportedChannels(u16::MAX))?;
    let bit_depth = spec.bit_depth;

    let data_len = buffer.frame_count() as u64
        * channels as u64
        * bit_depth.bytes_per_sample() as u64;
    let data_len = u32::try_from(data_len)
        .ok()
        .filter(|len| *len <= u32::MAX - HEADER_LEN as u32)
        .ok_or(CodecError::DataTooLarge)?;

    debug!(
        channels,
        sample_rate = buffer.sample_rate(),
        data_len,
        dither = spec.dither,
        "writing WAV header"
    );

    let header = header_bytes(channels_u16, buffer.sample_rate(), bit_depth, data_len)?;
    let mut out = Vec::with_capacity(HEADER_LEN + data_len as usize);
    out.extend_from_slice(&header);

    let scale = bit_depth.scale();
    let mut dither = match (spec.dither, bit_depth) {
        (true, BitDepth::Pcm16 | BitDepth::Pcm24) => Some(match spec.dither_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }),
        _ => None,
    };
    // One LSB of the positive scale
    let lsb = 1.0 / scale.1;

    for i in 0..buffer.frame_count() {
        for channel in buffer.channels() {
            let mut sample = channel[i];
            if let Some(rng) = dither.as_mut() {
                // Triangular noise in (-1, 1) LSB
                let tpdf: f32 = rng.gen::<f32>() - rng.gen::<f32>();
                sample += tpdf * lsb;
            }
            match bit_depth {
                BitDepth::Pcm16 => {
                    out.extend_from_slice(&(quantize(sample, scale) as i16).to_le_bytes())
                }
                BitDepth::Pcm24 => {
                    out.extend_from_slice(&quantize(sample, scale).to_le_bytes()[..3])
                }
                BitDepth::Float32 => out.extend_from_slice(&sample.to_le_bytes()),
            }
        }
    }

    Ok(out)
}

/// Encode and write to `path`
pub fn write_wav(path: &Path, buffer: &SampleBuffer, spec: &WavSpec) -> Result<(), CodecError> {
    let bytes = encode_wav(buffer, spec)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, bytes)?;
    Ok(())
}
