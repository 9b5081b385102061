//! Parameter playlist: per-channel parameter changes. Each event code's
//! high bit means "no duration follows"; when clear, a trailing varint
//! duration is read after the value.

use std::sync::Arc;

use crate::sequence::{advance_generic, read_varint, KindStep, PlaylistCore};
use crate::status::Status;

const CODE_VOLUME: u8 = 0x41;
const CODE_PAN: u8 = 0x42;
const CODE_SET_PITCH_SHIFT: u8 = 0x45;
const CODE_ADD_PITCH_SHIFT: u8 = 0x46;
const CODE_VIBRATO_RANGE: u8 = 0x54;
const CODE_INSTRUMENT: u8 = 0x69;

const NO_DURATION_BIT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterEvent {
    Rest(u16),
    Volume { value: f64, duration: u16 },
    Pan { value: f64, duration: u16 },
    SetPitchShift { value_64ths: i16, duration: u16 },
    AddPitchShift { delta: i8, duration: u16 },
    VibratoRange { value_16ths: u8, duration: u16 },
    Instrument { index: u8, duration: u16 },
}

pub struct ParameterPlaylist {
    core: PlaylistCore,
    accumulated_pitch_shift: i32,
}

impl ParameterPlaylist {
    pub fn new(bytes: Arc<[u8]>, base: usize, pattern_table: usize) -> Self {
        ParameterPlaylist {
            core: PlaylistCore::new(bytes, base, pattern_table),
            accumulated_pitch_shift: 0,
        }
    }

    /// Opens a parameter playlist at `playlist_offset`, reading its leading
    /// pattern-table varint.
    pub fn open(bytes: Arc<[u8]>, playlist_offset: usize) -> Result<Self, Status> {
        Ok(ParameterPlaylist {
            core: PlaylistCore::open(bytes, playlist_offset)?,
            accumulated_pitch_shift: 0,
        })
    }

    pub fn completed(&self) -> bool {
        self.core.completed()
    }

    pub fn advance(&mut self, mut emit: impl FnMut(ParameterEvent)) -> Result<bool, Status> {
        let accumulated = &mut self.accumulated_pitch_shift;
        advance_generic(
            &mut self.core,
            read_parameter_pattern_event,
            |dur| emit(ParameterEvent::Rest(dur)),
            |event| {
                if let ParameterEvent::AddPitchShift { delta, .. } = &event {
                    *accumulated += *delta as i32;
                }
                emit(event)
            },
        )
    }

    pub fn accumulated_pitch_shift(&self) -> i32 {
        self.accumulated_pitch_shift
    }
}

fn read_duration(bytes: &[u8], pos: usize, has_duration: bool) -> Result<(u16, usize), Status> {
    if has_duration {
        read_varint(bytes, pos)
    } else {
        Ok((0, pos))
    }
}

fn read_parameter_pattern_event(bytes: &[u8], pos: usize) -> Result<(KindStep<ParameterEvent>, usize), Status> {
    let byte = *bytes.get(pos).ok_or_else(|| Status::format_mismatch("parameter pattern truncated"))?;
    let has_duration = byte & NO_DURATION_BIT == 0;
    let code = byte | NO_DURATION_BIT; // normalize so code comparisons ignore the duration bit
    let mut cursor = pos + 1;

    macro_rules! u8_operand {
        () => {{
            let v = *bytes
                .get(cursor)
                .ok_or_else(|| Status::format_mismatch("parameter operand truncated"))?;
            cursor += 1;
            v
        }};
    }
    macro_rules! i8_operand {
        () => {
            u8_operand!() as i8
        };
    }
    macro_rules! i16_operand {
        () => {{
            let lo = u8_operand!();
            let hi = u8_operand!();
            i16::from_le_bytes([lo, hi])
        }};
    }

    let event = match code {
        c if c == CODE_VOLUME | NO_DURATION_BIT => {
            let raw = u8_operand!();
            let (duration, next) = read_duration(bytes, cursor, has_duration)?;
            cursor = next;
            ParameterEvent::Volume {
                value: raw as f64 / 255.0,
                duration,
            }
        }
        c if c == CODE_PAN | NO_DURATION_BIT => {
            let raw = i8_operand!();
            let (duration, next) = read_duration(bytes, cursor, has_duration)?;
            cursor = next;
            ParameterEvent::Pan {
                value: raw as f64 / 128.0,
                duration,
            }
        }
        c if c == CODE_SET_PITCH_SHIFT | NO_DURATION_BIT => {
            let raw = i16_operand!();
            let (duration, next) = read_duration(bytes, cursor, has_duration)?;
            cursor = next;
            ParameterEvent::SetPitchShift {
                value_64ths: raw,
                duration,
            }
        }
        c if c == CODE_ADD_PITCH_SHIFT | NO_DURATION_BIT => {
            let raw = i8_operand!();
            let (duration, next) = read_duration(bytes, cursor, has_duration)?;
            cursor = next;
            ParameterEvent::AddPitchShift { delta: raw, duration }
        }
        c if c == CODE_VIBRATO_RANGE | NO_DURATION_BIT => {
            let raw = u8_operand!();
            let (duration, next) = read_duration(bytes, cursor, has_duration)?;
            cursor = next;
            ParameterEvent::VibratoRange {
                value_16ths: raw,
                duration,
            }
        }
        c if c == CODE_INSTRUMENT | NO_DURATION_BIT => {
            let raw = u8_operand!();
            let (duration, next) = read_duration(bytes, cursor, has_duration)?;
            cursor = next;
            ParameterEvent::Instrument { index: raw, duration }
        }
        _ => return Ok((KindStep::Unrecognized, pos)),
    };

    Ok((KindStep::Event(event), cursor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_with_no_duration_bit_skips_varint() {
        let mut combined = Vec::new();
        combined.extend_from_slice(&[3u8, 0u8]);
        combined.extend_from_slice(&[0x00]);
        combined.extend_from_slice(&[CODE_VOLUME | NO_DURATION_BIT, 0xFF, 0xFF]);
        let bytes: Arc<[u8]> = Arc::from(combined.into_boxed_slice());
        let mut playlist = ParameterPlaylist::new(bytes, 2, 0);

        let mut events = Vec::new();
        playlist.advance(|e| events.push(e)).unwrap();
        assert_eq!(
            events,
            vec![ParameterEvent::Volume {
                value: 1.0,
                duration: 0
            }]
        );
    }

    #[test]
    fn volume_with_duration_reads_trailing_varint() {
        let mut combined = Vec::new();
        combined.extend_from_slice(&[3u8, 0u8]);
        combined.extend_from_slice(&[0x00]);
        combined.extend_from_slice(&[CODE_VOLUME, 0xFF, 0x05]);
        let bytes: Arc<[u8]> = Arc::from(combined.into_boxed_slice());
        let mut playlist = ParameterPlaylist::new(bytes, 2, 0);

        let mut events = Vec::new();
        playlist.advance(|e| events.push(e)).unwrap();
        assert_eq!(
            events,
            vec![ParameterEvent::Volume {
                value: 1.0,
                duration: 5
            }]
        );
    }
}
