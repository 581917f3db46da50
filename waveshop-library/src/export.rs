//! Export configuration and the exporter front end
//!
//! WAV goes through the built-in PCM encoder. Compressed formats and tag
//! writing are delegated to collaborators registered on the [`Exporter`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use waveshop_audio::SampleBuffer;

use crate::codec::{self, BitDepth, CodecError, WavSpec};

/// Errors that can occur during export
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("invalid export configuration: {0}")]
    InvalidConfig(String),
    #[error("no encoder registered for {0}")]
    NoEncoder(ExportFormat),
    #[error("encoder failed: {0}")]
    Encoder(String),
    #[error("tagging failed: {0}")]
    Tagging(String),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Container / codec to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Wav,
    Mp3,
    Ogg,
    Flac,
    Aac,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Mp3 => "mp3",
            ExportFormat::Ogg => "ogg",
            ExportFormat::Flac => "flac",
            ExportFormat::Aac => "m4a",
        }
    }

    /// Whether the format is handled by the built-in encoder
    pub fn is_builtin(self) -> bool {
        self == ExportFormat::Wav
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Wav => "WAV",
            ExportFormat::Mp3 => "MP3",
            ExportFormat::Ogg => "Ogg Vorbis",
            ExportFormat::Flac => "FLAC",
            ExportFormat::Aac => "AAC",
        };
        f.write_str(name)
    }
}

/// Lossy encoder quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    #[default]
    High,
    Ultra,
}

impl Quality {
    pub fn bitrate_kbps(self) -> u32 {
        match self {
            Quality::Low => 96,
            Quality::Medium => 192,
            Quality::High => 256,
            Quality::Ultra => 320,
        }
    }
}

/// Descriptive tags, passed through untouched to the tagger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
    pub genre: Option<String>,
    pub comment: Option<String>,
    pub track: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_art: Option<Vec<u8>>,
}

/// Everything needed to turn a buffer into a file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    pub format: ExportFormat,
    pub quality: Quality,
    pub sample_rate: Option<u32>,
    /// 16, 24 or 32 (float); WAV only
    pub bit_depth: Option<u16>,
    pub channels: Option<u16>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub dithering: bool,
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), ExportError> {
        if let Some(bits) = self.bit_depth {
            BitDepth::try_from(bits)
                .map_err(|_| ExportError::InvalidConfig(format!("bit depth {bits} not supported")))?;
        }
        if let Some(channels) = self.channels {
            if !(1..=2).contains(&channels) {
                return Err(ExportError::InvalidConfig(format!(
                    "channel count {channels} not supported"
                )));
            }
        }
        if self.sample_rate == Some(0) {
            return Err(ExportError::InvalidConfig("sample rate must be positive".into()));
        }
        Ok(())
    }

    /// PCM encoder options derived from this config
    pub fn wav_spec(&self) -> Result<WavSpec, ExportError> {
        self.validate()?;
        let bit_depth = match self.bit_depth {
            Some(bits) => BitDepth::try_from(bits)?,
            None => BitDepth::default(),
        };
        Ok(WavSpec {
            bit_depth,
            channels: self.channels,
            sample_rate: self.sample_rate,
            dither: self.dithering,
            dither_seed: None,
        })
    }
}

/// Compressed-format encoder
pub trait LossyEncoder: Send + Sync {
    fn encode(
        &self,
        buffer: &SampleBuffer,
        format: ExportFormat,
        bitrate_kbps: u32,
    ) -> Result<Vec<u8>, ExportError>;
}

/// Writes tags into an encoded file
pub trait MetadataTagger: Send + Sync {
    fn tag(
        &self,
        bytes: Vec<u8>,
        format: ExportFormat,
        metadata: &Metadata,
    ) -> Result<Vec<u8>, ExportError>;
}

/// Turns buffers into file bytes
#[derive(Default)]
pub struct Exporter {
    encoder: Option<Box<dyn LossyEncoder>>,
    tagger: Option<Box<dyn MetadataTagger>>,
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoder(mut self, encoder: Box<dyn LossyEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn with_tagger(mut self, tagger: Box<dyn MetadataTagger>) -> Self {
        self.tagger = Some(tagger);
        self
    }

    /// Encode `buffer` according to `config`
    pub fn export(&self, buffer: &SampleBuffer, config: &ExportConfig) -> Result<Vec<u8>, ExportError> {
        config.validate()?;

        let bytes = if config.format.is_builtin() {
            codec::encode_wav(buffer, &config.wav_spec()?)?
        } else {
            let encoder = self
                .encoder
                .as_ref()
                .ok_or(ExportError::NoEncoder(config.format))?;
            let conformed = codec::conform(buffer, config.channels, config.sample_rate)?;
            encoder.encode(&conformed, config.format, config.quality.bitrate_kbps())?
        };

        let bytes = match (&config.metadata, &self.tagger) {
            (Some(metadata), Some(tagger)) => tagger.tag(bytes, config.format, metadata)?,
            (Some(_), None) => {
                debug!(format = %config.format, "no tagger registered, metadata dropped");
                bytes
            }
            (None, _) => bytes,
        };

        info!(format = %config.format, bytes = bytes.len(), "export complete");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Records what it was asked to encode
    struct FakeEncoder {
        calls: Arc<Mutex<Vec<(ExportFormat, u32, usize, u32)>>>,
    }

    impl LossyEncoder for FakeEncoder {
        fn encode(
            &self,
            buffer: &SampleBuffer,
            format: ExportFormat,
            bitrate_kbps: u32,
        ) -> Result<Vec<u8>, ExportError> {
            self.calls.lock().unwrap().push((
                format,
                bitrate_kbps,
                buffer.num_channels(),
                buffer.sample_rate(),
            ));
            Ok(b"ENCODED".to_vec())
        }
    }

    struct SuffixTagger;

    impl MetadataTagger for SuffixTagger {
        fn tag(
            &self,
            mut bytes: Vec<u8>,
            _format: ExportFormat,
            metadata: &Metadata,
        ) -> Result<Vec<u8>, ExportError> {
            bytes.extend_from_slice(metadata.title.as_deref().unwrap_or("").as_bytes());
            Ok(bytes)
        }
    }

    fn buffer() -> SampleBuffer {
        SampleBuffer::new(vec![vec![0.1; 100], vec![-0.1; 100]], 44100).unwrap()
    }

    #[test]
    fn test_bitrates() {
        assert_eq!(Quality::Low.bitrate_kbps(), 96);
        assert_eq!(Quality::Medium.bitrate_kbps(), 192);
        assert_eq!(Quality::High.bitrate_kbps(), 256);
        assert_eq!(Quality::Ultra.bitrate_kbps(), 320);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ExportConfig::default();
        assert!(config.validate().is_ok());

        config.bit_depth = Some(20);
        assert!(matches!(config.validate(), Err(ExportError::InvalidConfig(_))));

        config.bit_depth = Some(24);
        config.channels = Some(3);
        assert!(config.validate().is_err());

        config.channels = Some(1);
        config.sample_rate = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wav_export_uses_pcm_encoder() {
        let config = ExportConfig {
            bit_depth: Some(24),
            channels: Some(1),
            ..ExportConfig::default()
        };
        let bytes = Exporter::new().export(&buffer(), &config).unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(bytes.len(), 44 + 100 * 3);
    }

    #[test]
    fn test_lossy_without_encoder() {
        let config = ExportConfig {
            format: ExportFormat::Mp3,
            ..ExportConfig::default()
        };
        assert!(matches!(
            Exporter::new().export(&buffer(), &config),
            Err(ExportError::NoEncoder(ExportFormat::Mp3))
        ));
    }

    #[test]
    fn test_lossy_delegation_and_tagging() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let exporter = Exporter::new()
            .with_encoder(Box::new(FakeEncoder {
                calls: Arc::clone(&calls),
            }))
            .with_tagger(Box::new(SuffixTagger));

        let config = ExportConfig {
            format: ExportFormat::Ogg,
            quality: Quality::Ultra,
            sample_rate: Some(22050),
            channels: Some(1),
            metadata: Some(Metadata {
                title: Some("Take 3".into()),
                ..Metadata::default()
            }),
            ..ExportConfig::default()
        };
        let bytes = exporter.export(&buffer(), &config).unwrap();

        assert_eq!(bytes, b"ENCODEDTake 3");
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &[(ExportFormat::Ogg, 320, 1, 22050)]
        );
    }

    #[test]
    fn test_config_json_shape() {
        let config = ExportConfig {
            format: ExportFormat::Flac,
            quality: Quality::Medium,
            ..ExportConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"format\":\"flac\""));
        assert!(json.contains("\"quality\":\"medium\""));
        let back: ExportConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
