//! Master playlist: global tempo and master volume/pan events, sharing the
//! parameter playlist's high-bit "no duration" convention.

use std::sync::Arc;

use crate::sequence::{advance_generic, read_varint, KindStep, PlaylistCore};
use crate::status::Status;

const CODE_MASTER_VOLUME: u8 = 0x41;
const CODE_MASTER_PAN: u8 = 0x42;
const CODE_MASTER_PITCH: u8 = 0x45;
const CODE_TEMPO: u8 = 0x21;

const NO_DURATION_BIT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MasterEvent {
    Rest(u16),
    MasterVolume { value: f64, duration: u16 },
    MasterPan { value: f64, duration: u16 },
    MasterPitch { value_64ths: i16, duration: u16 },
    Tempo { bpm: u8 },
}

pub struct MasterPlaylist {
    core: PlaylistCore,
}

impl MasterPlaylist {
    pub fn new(bytes: Arc<[u8]>, base: usize, pattern_table: usize) -> Self {
        MasterPlaylist {
            core: PlaylistCore::new(bytes, base, pattern_table),
        }
    }

    /// Opens a master playlist at `playlist_offset`, reading its leading
    /// pattern-table varint.
    pub fn open(bytes: Arc<[u8]>, playlist_offset: usize) -> Result<Self, Status> {
        Ok(MasterPlaylist {
            core: PlaylistCore::open(bytes, playlist_offset)?,
        })
    }

    pub fn completed(&self) -> bool {
        self.core.completed()
    }

    pub fn advance(&mut self, mut emit: impl FnMut(MasterEvent)) -> Result<bool, Status> {
        advance_generic(
            &mut self.core,
            read_master_pattern_event,
            |dur| emit(MasterEvent::Rest(dur)),
            |event| emit(event),
        )
    }
}

fn read_duration(bytes: &[u8], pos: usize, has_duration: bool) -> Result<(u16, usize), Status> {
    if has_duration {
        read_varint(bytes, pos)
    } else {
        Ok((0, pos))
    }
}

fn read_master_pattern_event(bytes: &[u8], pos: usize) -> Result<(KindStep<MasterEvent>, usize), Status> {
    let byte = *bytes.get(pos).ok_or_else(|| Status::format_mismatch("master pattern truncated"))?;

    if byte == CODE_TEMPO {
        let bpm = *bytes
            .get(pos + 1)
            .ok_or_else(|| Status::format_mismatch("TEMPO missing operand"))?;
        return Ok((KindStep::Event(MasterEvent::Tempo { bpm }), pos + 2));
    }

    let has_duration = byte & NO_DURATION_BIT == 0;
    let code = byte | NO_DURATION_BIT;
    let mut cursor = pos + 1;

    let read_u8 = |bytes: &[u8], cursor: &mut usize| -> Result<u8, Status> {
        let v = *bytes.get(*cursor).ok_or_else(|| Status::format_mismatch("master operand truncated"))?;
        *cursor += 1;
        Ok(v)
    };
    let read_i8 = |bytes: &[u8], cursor: &mut usize| -> Result<i8, Status> { Ok(read_u8(bytes, cursor)? as i8) };
    let read_i16 = |bytes: &[u8], cursor: &mut usize| -> Result<i16, Status> {
        let lo = read_u8(bytes, cursor)?;
        let hi = read_u8(bytes, cursor)?;
        Ok(i16::from_le_bytes([lo, hi]))
    };

    let event = if code == CODE_MASTER_VOLUME | NO_DURATION_BIT {
        let raw = read_u8(bytes, &mut cursor)?;
        let (duration, next) = read_duration(bytes, cursor, has_duration)?;
        cursor = next;
        MasterEvent::MasterVolume {
            value: raw as f64 / 255.0,
            duration,
        }
    } else if code == CODE_MASTER_PAN | NO_DURATION_BIT {
        let raw = read_i8(bytes, &mut cursor)?;
        let (duration, next) = read_duration(bytes, cursor, has_duration)?;
        cursor = next;
        MasterEvent::MasterPan {
            value: raw as f64 / 128.0,
            duration,
        }
    } else if code == CODE_MASTER_PITCH | NO_DURATION_BIT {
        let raw = read_i16(bytes, &mut cursor)?;
        let (duration, next) = read_duration(bytes, cursor, has_duration)?;
        cursor = next;
        MasterEvent::MasterPitch {
            value_64ths: raw,
            duration,
        }
    } else {
        return Ok((KindStep::Unrecognized, pos));
    };

    Ok((KindStep::Event(event), cursor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_event_has_no_duration_convention() {
        let mut combined = Vec::new();
        combined.extend_from_slice(&[3u8, 0u8]);
        combined.extend_from_slice(&[0x00]);
        combined.extend_from_slice(&[CODE_TEMPO, 120]);
        let bytes: Arc<[u8]> = Arc::from(combined.into_boxed_slice());
        let mut playlist = MasterPlaylist::new(bytes, 2, 0);

        let mut events = Vec::new();
        playlist.advance(|e| events.push(e)).unwrap();
        assert_eq!(events, vec![MasterEvent::Tempo { bpm: 120 }]);
    }

    #[test]
    fn master_pan_scales_by_128() {
        let mut combined = Vec::new();
        combined.extend_from_slice(&[3u8, 0u8]);
        combined.extend_from_slice(&[0x00]);
        combined.extend_from_slice(&[CODE_MASTER_PAN | NO_DURATION_BIT, (-64i8) as u8]);
        let bytes: Arc<[u8]> = Arc::from(combined.into_boxed_slice());
        let mut playlist = MasterPlaylist::new(bytes, 2, 0);

        let mut events = Vec::new();
        playlist.advance(|e| events.push(e)).unwrap();
        assert_eq!(
            events,
            vec![MasterEvent::MasterPan {
                value: -0.5,
                duration: 0
            }]
        );
    }
}
