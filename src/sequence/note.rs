//! Note playlist: articulates notes with a velocity/hold/total operand
//! shape selected by a 3-bit mode packed into the event byte's high bits.

use std::sync::Arc;

use crate::sequence::{advance_generic, read_varint, KindStep, PlaylistCore};
use crate::status::Status;

const SET_NOTE_RANGE: u8 = 0xE1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEvent {
    Rest(u16),
    Articulate { note: i16, velocity: f64, hold: u16, total: u16 },
}

pub struct NotePlaylist {
    core: PlaylistCore,
    note_range: i16,
}

impl NotePlaylist {
    pub fn new(bytes: Arc<[u8]>, base: usize, pattern_table: usize) -> Self {
        NotePlaylist {
            core: PlaylistCore::new(bytes, base, pattern_table),
            note_range: 0,
        }
    }

    /// Opens a note playlist at `playlist_offset`, reading its leading
    /// pattern-table varint.
    pub fn open(bytes: Arc<[u8]>, playlist_offset: usize) -> Result<Self, Status> {
        Ok(NotePlaylist {
            core: PlaylistCore::open(bytes, playlist_offset)?,
            note_range: 0,
        })
    }

    pub fn completed(&self) -> bool {
        self.core.completed()
    }

    pub fn advance(&mut self, mut emit: impl FnMut(NoteEvent)) -> Result<bool, Status> {
        let note_range = &mut self.note_range;
        advance_generic(
            &mut self.core,
            |bytes, pos| read_note_pattern_event(bytes, pos, &mut *note_range),
            |dur| emit(NoteEvent::Rest(dur)),
            |event| emit(event),
        )
    }
}

fn read_note_pattern_event(bytes: &[u8], pos: usize, note_range: &mut i16) -> Result<(KindStep<NoteEvent>, usize), Status> {
    let byte = *bytes.get(pos).ok_or_else(|| Status::format_mismatch("note pattern truncated"))?;

    if byte == SET_NOTE_RANGE {
        let operand = *bytes
            .get(pos + 1)
            .ok_or_else(|| Status::format_mismatch("SET_NOTE_RANGE missing operand"))?;
        *note_range = (operand as i8 as i16) << 5;
        return Ok((KindStep::Consumed, pos + 2));
    }

    let note_code = (byte & 0x1F) as i16;
    let mode = (byte >> 5) & 0x07;
    let mut cursor = pos + 1;

    let read_u8 = |bytes: &[u8], cursor: &mut usize| -> Result<u8, Status> {
        let v = *bytes.get(*cursor).ok_or_else(|| Status::format_mismatch("articulation operand truncated"))?;
        *cursor += 1;
        Ok(v)
    };
    let read_varint_operand = |bytes: &[u8], cursor: &mut usize| -> Result<u16, Status> {
        let (v, next) = read_varint(bytes, *cursor)?;
        *cursor = next;
        Ok(v)
    };

    let (velocity, total, hold) = match mode {
        0 => {
            let velocity_raw = read_u8(bytes, &mut cursor)?;
            let total = read_varint_operand(bytes, &mut cursor)?;
            let hold_raw = read_u8(bytes, &mut cursor)?;
            let hold = ((hold_raw as u32 * total as u32) / 255) as u16;
            (velocity_raw as f64 / 255.0, total, hold)
        }
        1 => {
            let velocity_raw = read_u8(bytes, &mut cursor)?;
            let total = read_varint_operand(bytes, &mut cursor)?;
            (velocity_raw as f64 / 255.0, total, total)
        }
        2 => {
            let velocity_raw = read_u8(bytes, &mut cursor)?;
            (velocity_raw as f64 / 255.0, 0, 0)
        }
        3 => {
            let total = read_varint_operand(bytes, &mut cursor)?;
            let hold_raw = read_u8(bytes, &mut cursor)?;
            let hold = ((hold_raw as u32 * total as u32) / 255) as u16;
            (1.0, total, hold)
        }
        4 => {
            let total = read_varint_operand(bytes, &mut cursor)?;
            (1.0, total, total)
        }
        5 => (1.0, 0, 0),
        _ => return Ok((KindStep::Unrecognized, pos)),
    };

    Ok((
        KindStep::Event(NoteEvent::Articulate {
            note: *note_range + note_code,
            velocity,
            hold,
            total,
        }),
        cursor,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_5_articulation_has_no_operands() {
        // pattern: articulate note 3, mode 5 (byte = 0b101_00011 = 0xA3), then STOP inside playlist.
        let mut combined = Vec::new();
        combined.extend_from_slice(&[3u8, 0u8]); // pattern table: pattern at offset 3
        combined.extend_from_slice(&[0x00]); // playlist: pattern ref 0
        combined.extend_from_slice(&[0xA3, 0xFF]); // pattern: articulate mode5, return
        let bytes: Arc<[u8]> = Arc::from(combined.into_boxed_slice());
        let mut playlist = NotePlaylist::new(bytes, 2, 0);

        let mut events = Vec::new();
        let done = playlist.advance(|e| events.push(e)).unwrap();
        assert!(!done);
        assert_eq!(
            events,
            vec![NoteEvent::Articulate {
                note: 3,
                velocity: 1.0,
                hold: 0,
                total: 0
            }]
        );
    }

    #[test]
    fn set_note_range_shifts_subsequent_articulations() {
        let mut combined = Vec::new();
        combined.extend_from_slice(&[3u8, 0u8]);
        combined.extend_from_slice(&[0x00]);
        // SET_NOTE_RANGE(1) then articulate note 0 mode 5 (0xA0)
        combined.extend_from_slice(&[SET_NOTE_RANGE, 0x01, 0xA0, 0xFF]);
        let bytes: Arc<[u8]> = Arc::from(combined.into_boxed_slice());
        let mut playlist = NotePlaylist::new(bytes, 2, 0);

        let mut events = Vec::new();
        playlist.advance(|e| events.push(e)).unwrap();
        assert_eq!(
            events,
            vec![NoteEvent::Articulate {
                note: 32,
                velocity: 1.0,
                hold: 0,
                total: 0
            }]
        );
    }
}
