//! Audio file loading and decoding

use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer as DecodeBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::{MetadataOptions, StandardTagKey};
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, warn};
use waveshop_audio::{AudioError, SampleBuffer};

/// Errors that can occur while decoding a file
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),
}

/// Tags read from the container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

/// A decoded file
#[derive(Debug, Clone)]
pub struct LoadedAudio {
    pub buffer: SampleBuffer,
    pub metadata: TrackMetadata,
}

/// Decoder adapter using Symphonia
#[derive(Debug, Default, Clone, Copy)]
pub struct MediaLoader;

impl MediaLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load and decode an audio file
    pub fn load(&self, path: &Path) -> Result<LoadedAudio, LoadError> {
        let file = std::fs::File::open(path)?;
        let extension = path.extension().and_then(|e| e.to_str());
        let mut loaded = self.decode_source(Box::new(file), extension)?;

        if loaded.metadata.title.is_none() {
            loaded.metadata.title = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string);
        }
        debug!(
            path = %path.display(),
            frames = loaded.buffer.frame_count(),
            channels = loaded.buffer.num_channels(),
            sample_rate = loaded.buffer.sample_rate(),
            "decoded file"
        );
        Ok(loaded)
    }

    /// Decode an in-memory file; `extension` is a format hint such as "wav"
    pub fn decode_bytes(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<LoadedAudio, LoadError> {
        self.decode_source(Box::new(Cursor::new(bytes)), extension)
    }

    fn decode_source(
        &self,
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
    ) -> Result<LoadedAudio, LoadError> {
        let mss = MediaSourceStream::new(source, Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoadError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut sample_rate = codec_params.sample_rate.unwrap_or(44100);
        let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let metadata = extract_metadata(&mut format);

        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(LoadError::Decode(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(error = e, "skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(LoadError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            sample_rate = spec.rate;
            channels = spec.channels.count();

            let mut sample_buf = DecodeBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        let buffer = SampleBuffer::from_interleaved(&samples, channels, sample_rate)?;
        Ok(LoadedAudio { buffer, metadata })
    }
}

fn extract_metadata(format: &mut Box<dyn FormatReader>) -> TrackMetadata {
    let mut metadata = TrackMetadata::default();

    if let Some(meta) = format.metadata().current() {
        for tag in meta.tags() {
            match tag.std_key {
                Some(StandardTagKey::TrackTitle) => metadata.title = Some(tag.value.to_string()),
                Some(StandardTagKey::Artist) => metadata.artist = Some(tag.value.to_string()),
                Some(StandardTagKey::Album) => metadata.album = Some(tag.value.to_string()),
                _ => {}
            }
        }
    }

    metadata
}
