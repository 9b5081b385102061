//! Sample payload: an immutable frequency pyramid of mono PCM. Construction
//! options may attach a default loop and default envelope, validated and
//! converted to sample units once up front and carried on the payload for
//! voices to fall back on when armed with neither.

use crate::format::Format;
use crate::status::Status;

pub const PYRAMID_LEVELS: usize = 4;

/// Quarters `source` in frequency by averaging 4-sample groups with
/// round-half-away-from-zero. A trailing partial group is averaged over its
/// actual length.
fn quarter_frequency(source: &[i16]) -> Vec<i16> {
    source
        .chunks(4)
        .map(|group| {
            let sum: i64 = group.iter().map(|&s| s as i64).sum();
            let n = group.len() as i64;
            let scaled = sum as f64 / n as f64;
            round_half_away_from_zero(scaled) as i16
        })
        .collect()
}

fn round_half_away_from_zero(x: f64) -> f64 {
    if x >= 0.0 {
        (x + 0.5).floor()
    } else {
        (x - 0.5).ceil()
    }
}

/// Builds the (up to) 4-layer pyramid: layer 0 is `source` itself, each
/// following layer quarters the previous one in length.
pub fn build_pyramid(source: Vec<i16>, levels: usize) -> Vec<Vec<i16>> {
    let mut pyramid = Vec::with_capacity(levels);
    let mut current = source;
    pyramid.push(current.clone());
    for _ in 1..levels {
        current = quarter_frequency(&current);
        pyramid.push(current.clone());
    }
    pyramid
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    OneShot,
    Loop,
}

/// Inclusive-start, exclusive-end loop region in source-sample units at a
/// given pyramid layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopBounds {
    pub begin: f64,
    pub length: f64,
}

#[derive(Debug, Clone)]
pub struct LoopDescriptor {
    pub mode: LoopMode,
    pub bounds: LoopBounds,
}

impl LoopDescriptor {
    pub fn one_shot() -> Self {
        LoopDescriptor {
            mode: LoopMode::OneShot,
            bounds: LoopBounds {
                begin: 0.0,
                length: 0.0,
            },
        }
    }

    pub fn validate(&self, layer0_len: usize) -> Result<(), Status> {
        if self.bounds.begin < 0.0 {
            return Err(Status::invalid_argument("loop begin must be non-negative"));
        }
        if self.bounds.begin + self.bounds.length > layer0_len as f64 {
            return Err(Status::invalid_argument("loop region exceeds sample length"));
        }
        Ok(())
    }

    /// Expands this loop descriptor into per-pyramid-level bounds by
    /// repeated ×0.25 scaling, one entry per level.
    pub fn expand_levels(&self, levels: usize) -> Vec<LoopBounds> {
        let mut out = Vec::with_capacity(levels);
        let mut bounds = self.bounds;
        out.push(bounds);
        for _ in 1..levels {
            bounds = LoopBounds {
                begin: bounds.begin * 0.25,
                length: bounds.length * 0.25,
            };
            out.push(bounds);
        }
        out
    }
}

/// ADSR envelope expressed in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdsrSeconds {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Default for AdsrSeconds {
    fn default() -> Self {
        AdsrSeconds {
            attack: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.0,
        }
    }
}

impl AdsrSeconds {
    pub fn to_samples(self, sampling_rate: u32) -> AdsrSamples {
        let rate = sampling_rate as f64;
        AdsrSamples {
            attack: (self.attack * rate).round() as u32,
            decay: (self.decay * rate).round() as u32,
            sustain: self.sustain,
            release: (self.release * rate).round() as u32,
        }
    }
}

/// ADSR envelope expressed in samples, the form the sampler voice actually
/// advances against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdsrSamples {
    pub attack: u32,
    pub decay: u32,
    pub sustain: f64,
    pub release: u32,
}

impl Default for AdsrSamples {
    fn default() -> Self {
        AdsrSeconds::default().to_samples(1)
    }
}

/// Immutable container for a pyramided mono sample plus its matching loop
/// levels. Readers share it freely; construction is the only place the
/// pyramid is built.
#[derive(Debug, Clone)]
pub struct SamplePayload {
    pyramid: Vec<Vec<i16>>,
    format: Format,
    byte_usage: usize,
    default_loop: Option<LoopDescriptor>,
    default_envelope: Option<AdsrSamples>,
}

/// Construction-time options: whether to build the full pyramid, and the
/// loop/envelope that travel with the payload by default.
pub struct SamplePayloadOptions {
    pub build_pyramid: bool,
    pub loop_desc: Option<LoopDescriptor>,
    pub envelope: Option<AdsrSeconds>,
}

impl Default for SamplePayloadOptions {
    fn default() -> Self {
        SamplePayloadOptions {
            build_pyramid: true,
            loop_desc: None,
            envelope: None,
        }
    }
}

impl SamplePayload {
    pub fn create(source: Vec<i16>, sampling_rate: u32, options: SamplePayloadOptions) -> Result<Self, Status> {
        if source.is_empty() {
            return Err(Status::invalid_argument("sample source must not be empty"));
        }
        if let Some(desc) = &options.loop_desc {
            desc.validate(source.len())?;
        }
        let levels = if options.build_pyramid { PYRAMID_LEVELS } else { 1 };
        let pyramid = build_pyramid(source, levels);
        let byte_usage = pyramid.iter().map(|layer| layer.len() * std::mem::size_of::<i16>()).sum();
        log::debug!(
            "built sample payload: {} level(s), layer0 len {}, {} bytes",
            pyramid.len(),
            pyramid[0].len(),
            byte_usage
        );
        Ok(SamplePayload {
            pyramid,
            format: Format::mono_i16(sampling_rate),
            byte_usage,
            default_loop: options.loop_desc,
            default_envelope: options.envelope.map(|seconds| seconds.to_samples(sampling_rate)),
        })
    }

    pub fn layer(&self, index: usize) -> &[i16] {
        &self.pyramid[index]
    }

    pub fn levels(&self) -> usize {
        self.pyramid.len()
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn sampling_rate(&self) -> u32 {
        self.format.sampling_rate
    }

    pub fn byte_usage(&self) -> usize {
        self.byte_usage
    }

    pub fn layer0_len(&self) -> usize {
        self.pyramid[0].len()
    }

    pub fn default_loop(&self) -> Option<&LoopDescriptor> {
        self.default_loop.as_ref()
    }

    pub fn default_envelope(&self) -> Option<AdsrSamples> {
        self.default_envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pyramid_layer_lengths_quarter_with_ceil() {
        let source: Vec<i16> = (0..10).map(|i| i * 100).collect();
        let pyramid = build_pyramid(source, PYRAMID_LEVELS);
        assert_eq!(pyramid[0].len(), 10);
        assert_eq!(pyramid[1].len(), 3);
        assert_eq!(pyramid[2].len(), 1);
        assert_eq!(pyramid[3].len(), 1);
    }

    #[test]
    fn round_half_away_from_zero_matches_spec() {
        assert_eq!(round_half_away_from_zero(2.5), 3.0);
        assert_eq!(round_half_away_from_zero(-2.5), -3.0);
        assert_eq!(round_half_away_from_zero(2.4), 2.0);
    }

    #[test]
    fn loop_levels_scale_by_quarter() {
        let loop_desc = LoopDescriptor {
            mode: LoopMode::Loop,
            bounds: LoopBounds { begin: 16.0, length: 32.0 },
        };
        let levels = loop_desc.expand_levels(3);
        assert_eq!(levels[0], LoopBounds { begin: 16.0, length: 32.0 });
        assert_eq!(levels[1], LoopBounds { begin: 4.0, length: 8.0 });
        assert_eq!(levels[2], LoopBounds { begin: 1.0, length: 2.0 });
    }

    #[test]
    fn loop_validate_rejects_out_of_range() {
        let loop_desc = LoopDescriptor {
            mode: LoopMode::Loop,
            bounds: LoopBounds { begin: 8.0, length: 8.0 },
        };
        assert!(loop_desc.validate(10).is_err());
        assert!(loop_desc.validate(16).is_ok());
    }

    #[test]
    fn adsr_seconds_to_samples_rounds() {
        let seconds = AdsrSeconds {
            attack: 0.01,
            decay: 0.02,
            sustain: 0.5,
            release: 0.1,
        };
        let samples = seconds.to_samples(32000);
        assert_eq!(samples.attack, 320);
        assert_eq!(samples.decay, 640);
        assert_eq!(samples.release, 3200);
        assert_eq!(samples.sustain, 0.5);
    }

    #[test]
    fn create_rejects_empty_source() {
        let result = SamplePayload::create(vec![], 32000, SamplePayloadOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn create_rejects_out_of_range_default_loop() {
        let options = SamplePayloadOptions {
            loop_desc: Some(LoopDescriptor {
                mode: LoopMode::Loop,
                bounds: LoopBounds { begin: 8.0, length: 8.0 },
            }),
            ..Default::default()
        };
        let result = SamplePayload::create(vec![0; 10], 32000, options);
        assert!(result.is_err());
    }

    #[test]
    fn create_carries_default_loop_and_envelope() {
        let options = SamplePayloadOptions {
            loop_desc: Some(LoopDescriptor {
                mode: LoopMode::Loop,
                bounds: LoopBounds { begin: 2.0, length: 4.0 },
            }),
            envelope: Some(AdsrSeconds {
                attack: 0.0,
                decay: 0.0,
                sustain: 1.0,
                release: 0.01,
            }),
            ..Default::default()
        };
        let payload = SamplePayload::create(vec![0; 16], 32000, options).unwrap();
        assert_eq!(payload.default_loop().unwrap().bounds, LoopBounds { begin: 2.0, length: 4.0 });
        assert_eq!(payload.default_envelope().unwrap().release, 320);
    }
}
