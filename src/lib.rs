//! Retro-styled software audio engine: a BRR codec, envelope-shaped sampler
//! voices backed by a pitch-shift frequency pyramid, and a bytecode ZSEQ
//! sequence interpreter that drives them.
//!
//! The host process loop, audio device I/O, and the resource-manager cache
//! are out of scope; this crate treats them as the opaque [`sink::Sink`]
//! trait, plain byte buffers, and the [`resource::Loader`]/[`resource::ResourceTable`]
//! pair respectively.

pub mod brr;
pub mod config;
pub mod format;
pub mod instrument;
pub mod queue;
pub mod resource;
pub mod sample;
pub mod sequence;
pub mod sink;
pub mod status;
pub mod voice;

pub use config::EngineConfig;
pub use format::{ChannelLayout, Format, SampleFormat};
pub use sample::{AdsrSamples, AdsrSeconds, LoopBounds, LoopDescriptor, LoopMode, SamplePayload, SamplePayloadOptions};
pub use sink::{RecordingSink, Sink};
pub use status::{ErrorKind, Status, StatusOr};
pub use voice::{Parameters, Phase, SamplerVoice};
