//! Sampler voice: the stateful DSP unit that turns an armed sample, loop,
//! and envelope into a stream of stereo int16 frames.
//!
//! The resampling core is a window-area integrator: each output frame is the
//! mean of the piecewise-linear source curve over `[position, position +
//! rate)`, rather than a point sample or a fixed-tap filter. Pitch shifts
//! beyond what one pyramid layer can represent select a lower-frequency
//! layer; shifts beyond the whole pyramid's coverage fail safe to silence.

use std::f64::consts::TAU;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::sample::{AdsrSamples, AdsrSeconds, LoopBounds, LoopDescriptor, LoopMode, SamplePayload, PYRAMID_LEVELS};
use crate::status::Status;

const DEFAULT_PORTAMENTO: f64 = 0.02;
const RATE_SMOOTH_UNSET: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Paused,
    Playing,
}

/// Externally-tunable playback parameters. Conceptually "owned by the
/// caller"; in practice the voice keeps its own copy set via
/// [`SamplerVoice::arm_parameters`] and the per-field setters, which is what
/// lets invalid writes be rejected without disturbing in-flight playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameters {
    pub pan: f32,
    pub pitch_shift_semitones: f32,
    pub volume: f32,
    pub vibrato_range_semitones: f32,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            pan: 0.0,
            pitch_shift_semitones: 0.0,
            volume: 1.0,
            vibrato_range_semitones: 0.0,
        }
    }
}

impl Parameters {
    fn validate(&self) -> Result<(), Status> {
        if !self.pitch_shift_semitones.is_finite() {
            return Err(Status::invalid_argument("pitch_shift_semitones must be finite"));
        }
        if !self.vibrato_range_semitones.is_finite() {
            return Err(Status::invalid_argument("vibrato_range_semitones must be finite"));
        }
        // the typo `pan < 1.0 || pan > 1.0` in the original always rejects
        // non-unit pans; the intended bound is +/-1.0.
        if self.pan < -1.0 || self.pan > 1.0 {
            return Err(Status::invalid_argument("pan must be within [-1.0, 1.0]"));
        }
        if self.volume < 0.0 || self.volume > 1.0 {
            return Err(Status::invalid_argument("volume must be within [0.0, 1.0]"));
        }
        Ok(())
    }
}

fn sample_at(layer: &[i16], idx: i64) -> f64 {
    if idx < 0 || idx as usize >= layer.len() {
        0.0
    } else {
        layer[idx as usize] as f64
    }
}

/// Integrates the piecewise-linear curve over `[start, start + width)`,
/// treating indices outside `layer` as 0.
fn integrate_window_slice(layer: &[i16], start: f64, width: f64) -> f64 {
    if width <= 0.0 {
        return 0.0;
    }
    let end = start + width;
    let mut area = 0.0;
    let mut i = start.floor() as i64;
    while (i as f64) < end {
        let seg_start = start.max(i as f64);
        let seg_end = ((i + 1) as f64).min(end);
        let seg_width = seg_end - seg_start;
        if seg_width > 0.0 {
            let s0 = sample_at(layer, i);
            let s1 = sample_at(layer, i + 1);
            let t0 = seg_start - i as f64;
            let t1 = seg_end - i as f64;
            let v0 = s0 + (s1 - s0) * t0;
            let v1 = s0 + (s1 - s0) * t1;
            area += 0.5 * (v0 + v1) * seg_width;
        }
        i += 1;
    }
    area
}

/// Computes the window mean at one pyramid layer, folding the window into
/// the loop region when looping.
fn windowed_mean(layer: &[i16], loop_bounds: Option<LoopBounds>, pos: f64, rate: f64) -> f64 {
    let area = match loop_bounds {
        None => integrate_window_slice(layer, pos, rate),
        Some(lb) if lb.length <= 0.0 => integrate_window_slice(layer, pos, rate),
        Some(lb) => {
            let loop_begin = lb.begin;
            let loop_end = lb.begin + lb.length;
            let mut start = pos;
            if start > loop_begin {
                start = ((start - loop_begin) % lb.length) + loop_begin;
            }
            if rate >= lb.length {
                integrate_window_slice(layer, loop_begin, lb.length)
            } else if start + rate > loop_end {
                let first_width = loop_end - start;
                let overflow = rate - first_width;
                integrate_window_slice(layer, start, first_width) + integrate_window_slice(layer, loop_begin, overflow)
            } else {
                integrate_window_slice(layer, start, rate)
            }
        }
    };
    area / rate
}

/// A single-threaded, cooperatively-owned playback unit. Callers must
/// externally serialize access to one voice; the API itself is `&mut self`
/// throughout and gives no interior synchronization.
pub struct SamplerVoice {
    phase: Phase,
    sampling_rate: u32,
    osc_cycles_per_sample: f64,

    portamento: f64,

    sample: Option<Arc<SamplePayload>>,
    parameters_armed: bool,
    params: Parameters,

    loop_desc: Option<Arc<LoopDescriptor>>,
    converted_loop_levels: Vec<LoopBounds>,
    default_loop_levels: Vec<LoopBounds>,
    resolved_loop_mode: LoopMode,

    envelope_desc: Option<Arc<AdsrSeconds>>,
    converted_envelope: AdsrSamples,
    default_envelope: AdsrSamples,

    position: f64,
    elapsed: u32,
    released_at: u32,
    releasing: bool,
    release_from: f64,

    playback_pitch_shift: f32,
    playback_volume: f32,
    rate_smooth: f64,

    status: Status,
}

impl SamplerVoice {
    pub fn new(sampling_rate: u32, osc_cycles_per_sample: f64) -> Self {
        Self::with_portamento(sampling_rate, osc_cycles_per_sample, DEFAULT_PORTAMENTO)
    }

    /// Constructs a voice from an [`EngineConfig`], threading its
    /// `portamento` constant through instead of the hardcoded default.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_portamento(config.sampling_rate, config.osc_cycles_per_sample, config.portamento)
    }

    pub fn with_portamento(sampling_rate: u32, osc_cycles_per_sample: f64, portamento: f64) -> Self {
        let default_envelope = AdsrSeconds::default().to_samples(sampling_rate);
        let default_loop_levels = LoopDescriptor::one_shot().expand_levels(PYRAMID_LEVELS);
        SamplerVoice {
            phase: Phase::Stopped,
            sampling_rate,
            osc_cycles_per_sample,
            portamento,
            sample: None,
            parameters_armed: false,
            params: Parameters::default(),
            loop_desc: None,
            converted_loop_levels: default_loop_levels.clone(),
            default_loop_levels,
            resolved_loop_mode: LoopMode::OneShot,
            envelope_desc: None,
            converted_envelope: default_envelope,
            default_envelope,
            position: 0.0,
            elapsed: 0,
            released_at: 0,
            releasing: false,
            release_from: 0.0,
            playback_pitch_shift: 0.0,
            playback_volume: 1.0,
            rate_smooth: RATE_SMOOTH_UNSET,
            status: Status::ok(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> Status {
        self.status.clone()
    }

    fn require_stopped(&self, op: &str) -> Result<(), Status> {
        if self.phase != Phase::Stopped {
            return Err(Status::failed_precondition(format!("{op} requires the voice to be stopped")));
        }
        Ok(())
    }

    pub fn arm_sample(&mut self, sample: Option<Arc<SamplePayload>>) -> Result<(), Status> {
        self.require_stopped("arm_sample")?;
        if let Some(sample) = &sample {
            let expected = crate::format::Format::mono_i16(self.sampling_rate);
            if sample.format() != expected {
                return Err(Status::invalid_argument(format!(
                    "sample format {} does not match voice format {}",
                    sample.format(),
                    expected
                )));
            }
        }
        self.sample = sample;
        Ok(())
    }

    pub fn arm_parameters(&mut self, params: Parameters) -> Result<(), Status> {
        self.require_stopped("arm_parameters")?;
        params.validate()?;
        self.params = params;
        self.parameters_armed = true;
        Ok(())
    }

    /// Arms an explicit loop, or falls back to the armed sample's own default
    /// loop (if any) when `None` is passed. An explicit loop is validated
    /// against the armed sample's layer-0 length before being accepted.
    pub fn arm_loop(&mut self, loop_desc: Option<Arc<LoopDescriptor>>) -> Result<(), Status> {
        self.require_stopped("arm_loop")?;
        let levels = self.sample.as_ref().map(|s| s.levels()).unwrap_or(PYRAMID_LEVELS);
        let resolved: Option<LoopDescriptor> = match &loop_desc {
            Some(desc) => {
                if let Some(sample) = &self.sample {
                    desc.validate(sample.layer0_len())?;
                }
                Some((**desc).clone())
            }
            None => self.sample.as_ref().and_then(|s| s.default_loop().cloned()),
        };
        self.converted_loop_levels = match &resolved {
            Some(desc) => desc.expand_levels(levels),
            None => self.default_loop_levels.clone(),
        };
        self.resolved_loop_mode = resolved.as_ref().map(|d| d.mode).unwrap_or(LoopMode::OneShot);
        self.loop_desc = loop_desc;
        Ok(())
    }

    /// Arms an explicit envelope, or falls back to the armed sample's own
    /// default envelope (if any) when `None` is passed.
    pub fn arm_envelope(&mut self, envelope: Option<Arc<AdsrSeconds>>) -> Result<(), Status> {
        self.require_stopped("arm_envelope")?;
        self.converted_envelope = match &envelope {
            Some(seconds) => seconds.to_samples(self.sampling_rate),
            None => self
                .sample
                .as_ref()
                .and_then(|s| s.default_envelope())
                .unwrap_or(self.default_envelope),
        };
        self.envelope_desc = envelope;
        Ok(())
    }

    fn set_param<F: FnOnce(&mut Parameters)>(&mut self, mutate: F) {
        let mut candidate = self.params;
        mutate(&mut candidate);
        match candidate.validate() {
            Ok(()) => {
                self.params = candidate;
                self.status = Status::ok();
            }
            Err(status) => {
                self.status = status;
            }
        }
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.set_param(|p| p.pan = pan);
    }

    pub fn set_pitch_shift(&mut self, semitones: f32) {
        self.set_param(|p| p.pitch_shift_semitones = semitones);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.set_param(|p| p.volume = volume);
    }

    pub fn set_vibrato_range(&mut self, semitones: f32) {
        self.set_param(|p| p.vibrato_range_semitones = semitones);
    }

    /// Starts (or resumes) playback. Callable from `Stopped` or `Paused`;
    /// only the `Stopped` path captures new pitch/volume and resets the
    /// cursor — resuming from `Paused` continues exactly where playback left
    /// off. Requires `arm_parameters` and `arm_sample(Some(_))` to have
    /// already run.
    pub fn play(&mut self, semitones: f32, volume: f32) -> Result<(), Status> {
        if self.phase == Phase::Playing {
            return Err(Status::failed_precondition("play() requires the voice not already be playing"));
        }
        if !self.parameters_armed {
            return Err(Status::failed_precondition("play() requires arm_parameters to have run"));
        }
        if self.sample.is_none() {
            return Err(Status::failed_precondition("play() requires a sample to be armed"));
        }
        if self.phase == Phase::Stopped {
            self.playback_pitch_shift = semitones;
            self.playback_volume = volume;
            self.position = 0.0;
            self.elapsed = 0;
            self.released_at = 0;
            self.releasing = false;
            self.release_from = 0.0;
            self.rate_smooth = RATE_SMOOTH_UNSET;
        }
        self.phase = Phase::Playing;
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.phase == Phase::Playing {
            self.phase = Phase::Paused;
            log::trace!("voice paused at elapsed={}", self.elapsed);
        }
    }

    pub fn release(&mut self) {
        if self.phase == Phase::Playing && !self.releasing {
            self.releasing = true;
            self.released_at = self.elapsed;
            log::trace!("voice released at elapsed={}", self.elapsed);
        }
    }

    pub fn stop(&mut self) {
        self.phase = Phase::Stopped;
        self.position = 0.0;
        self.elapsed = 0;
        self.released_at = 0;
        self.releasing = false;
        self.release_from = 0.0;
    }

    fn envelope_value(&mut self) -> (f64, bool) {
        let env = self.converted_envelope;
        if self.releasing {
            if env.release == 0 {
                return (0.0, false);
            }
            let rate_of_release = env.sustain / env.release as f64;
            let elapsed_diff = self.elapsed.saturating_sub(self.released_at) as f64;
            let v = self.release_from - elapsed_diff * rate_of_release;
            return if v <= 0.0 { (0.0, false) } else { (v, true) };
        }
        let v = if self.elapsed < env.attack {
            if env.attack > 0 {
                self.elapsed as f64 / env.attack as f64
            } else {
                1.0
            }
        } else if self.elapsed - env.attack < env.decay {
            if env.decay > 0 {
                1.0 - ((self.elapsed - env.attack) as f64 / env.decay as f64) * (1.0 - env.sustain)
            } else {
                env.sustain
            }
        } else {
            env.sustain
        };
        self.release_from = v;
        (v, true)
    }

    fn oscillator(&self, sample_clock: u64) -> f64 {
        (sample_clock as f64 * self.osc_cycles_per_sample * TAU).sin()
    }

    /// Runs the envelope, advances the playback cursor by the current
    /// smoothed rate, and applies the envelope/one-shot end-of-sample stop
    /// checks. Shared by both the in-coverage and above-coverage branches of
    /// [`Self::provide`] so the cursor and phase transitions stay identical
    /// whether or not a frame's pitch exceeds what the pyramid can render.
    fn apply_envelope_and_advance(&mut self, layer0_len: usize) -> f64 {
        let (envelope_v, alive) = self.envelope_value();
        self.position += self.rate_smooth;
        self.elapsed += 1;

        if !alive {
            self.phase = Phase::Stopped;
            log::trace!("voice envelope reached zero, stopping");
        } else if self.resolved_loop_mode != LoopMode::Loop && self.position >= layer0_len as f64 {
            self.phase = Phase::Stopped;
            log::trace!("voice ran off the end of a one-shot sample, stopping");
        }
        envelope_v
    }

    /// Fills `dest` with `dest.len()` stereo frames. `sample_clock` is the
    /// host-maintained running sample counter the vibrato oscillator reads;
    /// it is expected to advance by one per frame across calls.
    pub fn provide(&mut self, dest: &mut [(i16, i16)], sample_clock: u64) -> Status {
        if self.phase != Phase::Playing {
            dest.fill((0, 0));
            return Status::ok();
        }
        let sample = match &self.sample {
            Some(s) => Arc::clone(s),
            None => {
                dest.fill((0, 0));
                return Status::ok();
            }
        };
        let levels = sample.levels();
        let pan_r = ((self.params.pan + 1.0) / 2.0) as f64;

        for (i, frame) in dest.iter_mut().enumerate() {
            if self.phase != Phase::Playing {
                *frame = (0, 0);
                continue;
            }

            let clock = sample_clock.wrapping_add(i as u64);
            let final_offset = self.playback_pitch_shift as f64
                + self.params.pitch_shift_semitones as f64
                + self.oscillator(clock) * self.params.vibrato_range_semitones as f64;

            let playback_rate = 2f64.powf(final_offset / 12.0);
            if self.rate_smooth == RATE_SMOOTH_UNSET {
                self.rate_smooth = playback_rate;
            } else {
                self.rate_smooth += (playback_rate - self.rate_smooth) * (1.0 - self.portamento);
            }

            // Above pyramid coverage, the original still smooths the rate,
            // advances the cursor, and runs the envelope/one-shot stop; only
            // the emitted sample itself fails safe to silence.
            let scaled = if final_offset < (levels * 24) as f64 {
                let k = ((self.rate_smooth.max(f64::MIN_POSITIVE).log2()) / 2.0)
                    .floor()
                    .clamp(0.0, (levels - 1) as f64) as usize;
                let scale = 4f64.powi(k as i32);
                let pos_k = self.position / scale;
                let rate_k = self.rate_smooth / scale;

                let loop_bounds = if self.resolved_loop_mode == LoopMode::Loop {
                    Some(self.converted_loop_levels[k])
                } else {
                    None
                };

                let window_mean = windowed_mean(sample.layer(k), loop_bounds, pos_k, rate_k.max(1e-9));
                let envelope_v = self.apply_envelope_and_advance(sample.layer0_len());
                round_half_away_from_zero(window_mean * envelope_v)
            } else {
                self.apply_envelope_and_advance(sample.layer0_len());
                0.0
            };

            let final_amp = (scaled * (self.playback_volume as f64 * self.params.volume as f64))
                .clamp(i16::MIN as f64, i16::MAX as f64);
            let left = final_amp * (1.0 - pan_r);
            let right = final_amp * pan_r;
            *frame = (left.round() as i16, right.round() as i16);
        }

        Status::ok()
    }
}

fn round_half_away_from_zero(x: f64) -> f64 {
    if x >= 0.0 {
        (x + 0.5).floor()
    } else {
        (x - 0.5).ceil()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{SamplePayload, SamplePayloadOptions};

    fn one_shot_sample(data: Vec<i16>) -> Arc<SamplePayload> {
        Arc::new(SamplePayload::create(data, 32000, SamplePayloadOptions::default()).unwrap())
    }

    #[test]
    fn silence_when_stopped() {
        let mut voice = SamplerVoice::new(32000, 4.0 / 32000.0);
        voice.arm_sample(Some(one_shot_sample(vec![1000; 8]))).unwrap();
        let mut dest = [(1, 1); 4];
        voice.provide(&mut dest, 0);
        assert_eq!(dest, [(0, 0); 4]);
    }

    #[test]
    fn pure_tone_one_shot_goes_silent_past_source_length() {
        let mut voice = SamplerVoice::new(32000, 0.0);
        voice.arm_sample(Some(one_shot_sample(vec![0, 16384, 0, -16384]))).unwrap();
        voice.arm_parameters(Parameters::default()).unwrap();
        voice.arm_loop(None).unwrap();
        voice.arm_envelope(None).unwrap();
        voice.play(0.0, 1.0).unwrap();

        let mut dest = [(0i16, 0i16); 8];
        voice.provide(&mut dest, 0);
        assert_eq!(voice.phase(), Phase::Stopped);
        for frame in &dest[4..] {
            assert_eq!(*frame, (0, 0));
        }
    }

    #[test]
    fn loop_wrap_never_reads_past_sample_end() {
        let data: Vec<i16> = (0..8).map(|i| i * 4096).collect();
        let mut voice = SamplerVoice::new(32000, 0.0);
        voice.arm_sample(Some(one_shot_sample(data))).unwrap();
        voice.arm_parameters(Parameters::default()).unwrap();
        voice
            .arm_loop(Some(Arc::new(LoopDescriptor {
                mode: LoopMode::Loop,
                bounds: LoopBounds { begin: 2.0, length: 4.0 },
            })))
            .unwrap();
        voice.arm_envelope(None).unwrap();
        voice.play(0.0, 1.0).unwrap();

        let mut dest = [(0i16, 0i16); 12];
        let status = voice.provide(&mut dest, 0);
        assert!(status.is_ok());
        assert_eq!(voice.phase(), Phase::Playing);
    }

    #[test]
    fn release_then_silence() {
        let mut voice = SamplerVoice::new(32000, 0.0);
        voice.arm_sample(Some(one_shot_sample(vec![10000; 64]))).unwrap();
        voice.arm_parameters(Parameters::default()).unwrap();
        voice.arm_loop(None).unwrap();
        voice
            .arm_envelope(Some(Arc::new(AdsrSeconds {
                attack: 0.0,
                decay: 0.0,
                sustain: 1.0,
                release: 0.0001, // 3.2 samples at 32000Hz
            })))
            .unwrap();
        voice.play(0.0, 1.0).unwrap();
        voice.release();
        let mut dest = [(0i16, 0i16); 16];
        voice.provide(&mut dest, 0);
        assert_eq!(voice.phase(), Phase::Stopped);
    }

    #[test]
    fn invalid_pan_is_recoverable_not_fatal() {
        let mut voice = SamplerVoice::new(32000, 0.0);
        voice.arm_parameters(Parameters::default()).unwrap();
        voice.set_pan(5.0);
        assert!(voice.status().is_err());
        assert_eq!(voice.status().kind(), Some(crate::status::ErrorKind::InvalidArgument));
        // prior valid state is retained
        assert_eq!(voice.params.pan, 0.0);
    }

    #[test]
    fn from_config_threads_portamento_through() {
        let config = crate::config::EngineConfig {
            sampling_rate: 44100,
            osc_cycles_per_sample: 6.0 / 44100.0,
            portamento: 0.5,
        };
        let voice = SamplerVoice::from_config(&config);
        assert_eq!(voice.sampling_rate, 44100);
        assert_eq!(voice.portamento, 0.5);
    }

    #[test]
    fn play_while_not_armed_is_precondition_failure() {
        let mut voice = SamplerVoice::new(32000, 0.0);
        let err = voice.play(0.0, 1.0).unwrap_err();
        assert_eq!(err.kind(), Some(crate::status::ErrorKind::FailedPrecondition));
    }

    #[test]
    fn arm_loop_rejects_out_of_range_loop() {
        let mut voice = SamplerVoice::new(32000, 0.0);
        voice.arm_sample(Some(one_shot_sample(vec![1000; 8]))).unwrap();
        let err = voice
            .arm_loop(Some(Arc::new(LoopDescriptor {
                mode: LoopMode::Loop,
                bounds: LoopBounds { begin: 4.0, length: 8.0 },
            })))
            .unwrap_err();
        assert_eq!(err.kind(), Some(crate::status::ErrorKind::InvalidArgument));
    }

    #[test]
    fn arm_loop_none_falls_back_to_sample_default() {
        let sample = Arc::new(
            SamplePayload::create(
                vec![1000; 16],
                32000,
                SamplePayloadOptions {
                    loop_desc: Some(LoopDescriptor {
                        mode: LoopMode::Loop,
                        bounds: LoopBounds { begin: 0.0, length: 8.0 },
                    }),
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        let mut voice = SamplerVoice::new(32000, 0.0);
        voice.arm_sample(Some(sample)).unwrap();
        voice.arm_loop(None).unwrap();
        assert_eq!(voice.resolved_loop_mode, LoopMode::Loop);
    }

    #[test]
    fn pitched_above_coverage_one_shot_still_advances_and_stops() {
        let mut voice = SamplerVoice::new(32000, 0.0);
        voice.arm_sample(Some(one_shot_sample(vec![1000; 4]))).unwrap();
        voice
            .arm_parameters(Parameters {
                pitch_shift_semitones: (PYRAMID_LEVELS as f32) * 24.0 + 10.0,
                ..Parameters::default()
            })
            .unwrap();
        voice.arm_loop(None).unwrap();
        voice.arm_envelope(None).unwrap();
        voice.play(0.0, 1.0).unwrap();

        let mut dest = [(0i16, 0i16); 8];
        voice.provide(&mut dest, 0);
        assert_eq!(dest, [(0, 0); 8]);
        assert_eq!(voice.phase(), Phase::Stopped);
        assert!(voice.position > 0.0);
    }

    #[test]
    fn paused_resume_preserves_cursor_without_recapture() {
        let mut voice = SamplerVoice::new(32000, 0.0);
        voice.arm_sample(Some(one_shot_sample(vec![1000; 64]))).unwrap();
        voice.arm_parameters(Parameters::default()).unwrap();
        voice.arm_loop(None).unwrap();
        voice.arm_envelope(None).unwrap();
        voice.play(0.0, 1.0).unwrap();
        let mut dest = [(0i16, 0i16); 4];
        voice.provide(&mut dest, 0);
        let elapsed_before = voice.elapsed;
        voice.pause();
        assert_eq!(voice.phase(), Phase::Paused);
        voice.play(5.0, 0.5).unwrap();
        assert_eq!(voice.elapsed, elapsed_before);
        assert_eq!(voice.playback_pitch_shift, 0.0);
    }
}
