//! File side of Waveshop - encoding, decoding, export, presets, and batches

mod batch;
mod codec;
mod export;
mod loader;
mod presets;

pub use batch::{BatchEvent, BatchJob, BatchQueue, BatchSummary, JobId, JobStatus};
pub use codec::{
    conform, encode_wav, header_bytes, write_wav, BitDepth, CodecError, WavSpec, HEADER_LEN,
};
pub use export::{
    ExportConfig, ExportError, ExportFormat, Exporter, LossyEncoder, Metadata, MetadataTagger,
    Quality,
};
pub use loader::{LoadError, LoadedAudio, MediaLoader, TrackMetadata};
pub use presets::{FileStore, KeyValueStore, MemoryStore, PresetError, PresetList, PRESETS_KEY};
