//! Instrument payload: an ordered, pitch-keyed table of splits, each
//! pointing at a sample resource with optional loop/envelope overrides.
//!
//! Deserialized from the `TLGR`/`INST` binary container described in the
//! external interfaces; parsing uses a manual byte cursor rather than a
//! derive-based binary codec, matching this codebase's existing container
//! readers.

use crate::sample::{AdsrSeconds, LoopBounds, LoopDescriptor, LoopMode};
use crate::status::Status;

const MAGIC_TLGR: [u8; 4] = *b"TLGR";
const MAGIC_INST: [u8; 4] = *b"INST";

const MODE_HAS_LOOP: u8 = 1 << 0;
const MODE_HAS_ENVELOPE: u8 = 1 << 1;

#[derive(Debug, Clone)]
pub struct Split {
    pub sample_id: u64,
    pub base_offset: i16,
    pub loop_override: Option<LoopDescriptor>,
    pub envelope_override: Option<AdsrSeconds>,
}

#[derive(Debug, Clone)]
pub struct InstrumentPayload {
    splits: Vec<Split>,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    fn require(&self, n: usize) -> Result<(), Status> {
        if self.pos + n > self.bytes.len() {
            return Err(Status::format_mismatch("instrument container truncated"));
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, Status> {
        self.require(1)?;
        let v = self.bytes[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn read_i16(&mut self) -> Result<i16, Status> {
        self.require(2)?;
        let v = i16::from_le_bytes([self.bytes[self.pos], self.bytes[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    fn read_u16(&mut self) -> Result<u16, Status> {
        self.require(2)?;
        let v = u16::from_le_bytes([self.bytes[self.pos], self.bytes[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    fn read_u32(&mut self) -> Result<u32, Status> {
        self.require(4)?;
        let v = u32::from_le_bytes(self.bytes[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    fn read_u64(&mut self) -> Result<u64, Status> {
        self.require(8)?;
        let v = u64::from_le_bytes(self.bytes[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    fn read_tag(&mut self) -> Result<[u8; 4], Status> {
        self.require(4)?;
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&self.bytes[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(tag)
    }
}

impl InstrumentPayload {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Status> {
        let mut cursor = Cursor::new(bytes);
        let tlgr = cursor.read_tag()?;
        if tlgr != MAGIC_TLGR {
            return Err(Status::format_mismatch("missing TLGR magic"));
        }
        let inst = cursor.read_tag()?;
        if inst != MAGIC_INST {
            return Err(Status::format_mismatch("missing INST magic"));
        }
        let n_splits = cursor.read_u8()?;
        if n_splits == 0 {
            return Err(Status::format_mismatch("instrument must have at least one split"));
        }

        let mut splits = Vec::with_capacity(n_splits as usize);
        let mut last_offset: Option<i16> = None;
        for _ in 0..n_splits {
            let sample_id = cursor.read_u64()?;
            let base_offset = cursor.read_i16()?;
            if let Some(prev) = last_offset {
                if base_offset <= prev {
                    return Err(Status::format_mismatch("instrument splits must be strictly ascending by base_offset"));
                }
            }
            last_offset = Some(base_offset);

            let mode = cursor.read_u8()?;
            let loop_override = if mode & MODE_HAS_LOOP != 0 {
                let begin = cursor.read_u32()?;
                let end = cursor.read_u32()?;
                if end < begin {
                    return Err(Status::format_mismatch("loop end precedes loop begin"));
                }
                Some(LoopDescriptor {
                    mode: LoopMode::Loop,
                    bounds: LoopBounds {
                        begin: begin as f64,
                        length: (end - begin) as f64,
                    },
                })
            } else {
                None
            };
            let envelope_override = if mode & MODE_HAS_ENVELOPE != 0 {
                let attack_ms = cursor.read_u16()?;
                let decay_ms = cursor.read_u16()?;
                let sustain_255 = cursor.read_u8()?;
                let release_ms = cursor.read_u16()?;
                Some(AdsrSeconds {
                    attack: attack_ms as f64 / 1000.0,
                    decay: decay_ms as f64 / 1000.0,
                    sustain: sustain_255 as f64 / 255.0,
                    release: release_ms as f64 / 1000.0,
                })
            } else {
                None
            };

            splits.push(Split {
                sample_id,
                base_offset,
                loop_override,
                envelope_override,
            });
        }

        log::debug!("parsed instrument with {} split(s)", splits.len());
        Ok(InstrumentPayload { splits })
    }

    pub fn splits(&self) -> &[Split] {
        &self.splits
    }

    /// Returns the split whose `base_offset` is the greatest value `<=
    /// semitones`, falling back to the lowest split if `semitones` is below
    /// every split's offset.
    pub fn characteristics(&self, semitones: i16) -> &Split {
        let mut chosen = &self.splits[0];
        for split in &self.splits {
            if split.base_offset <= semitones {
                chosen = split;
            } else {
                break;
            }
        }
        chosen
    }
}
