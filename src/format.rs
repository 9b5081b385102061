//! Format descriptor: sample type, channel layout, and sampling rate for a
//! PCM buffer, plus the stringification rules callers use for diagnostics.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SampleFormat::Int8 => "INT8",
            SampleFormat::Int16 => "INT16",
            SampleFormat::Int32 => "INT32",
            SampleFormat::Int64 => "INT64",
            SampleFormat::Float32 => "FLOAT32",
            SampleFormat::Float64 => "FLOAT64",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn channel_count(self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelLayout::Mono => "MONO",
            ChannelLayout::Stereo => "STEREO",
        };
        f.write_str(s)
    }
}

/// A complete PCM format descriptor. Equality is field-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format {
    pub sample_format: SampleFormat,
    pub layout: ChannelLayout,
    pub sampling_rate: u32,
}

impl Format {
    pub const fn new(sample_format: SampleFormat, layout: ChannelLayout, sampling_rate: u32) -> Self {
        Format {
            sample_format,
            layout,
            sampling_rate,
        }
    }

    pub const fn mono_i16(sampling_rate: u32) -> Self {
        Format::new(SampleFormat::Int16, ChannelLayout::Mono, sampling_rate)
    }

    pub const fn stereo_i16(sampling_rate: u32) -> Self {
        Format::new(SampleFormat::Int16, ChannelLayout::Stereo, sampling_rate)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}, {}, {}}}", self.sample_format, self.layout, self.sampling_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_token_rules() {
        let fmt = Format::mono_i16(32000);
        assert_eq!(fmt.to_string(), "{INT16, MONO, 32000}");
    }

    #[test]
    fn equality_is_field_wise() {
        assert_eq!(Format::mono_i16(32000), Format::mono_i16(32000));
        assert_ne!(Format::mono_i16(32000), Format::mono_i16(44100));
    }
}
