//! BRR (Bit Rate Reduction) codec: a 4-bit adaptive-differential scheme that
//! packs 16 mono i16 samples into 9 bytes (1 filter byte + 8 data bytes). A
//! trailing partial block (fewer than 16 samples) shrinks its data to
//! `samples/2` rounded up to the next whole byte instead of padding out to a
//! full block.
//!
//! The block encoder is greedy: it tries all 64 filter bytes per block and
//! keeps whichever minimizes total absolute error, carrying predictor state
//! across blocks rather than resetting it each block. This is deliberately
//! not globally optimal — the "dirty" sound of a straightforward per-sample
//! greedy search is part of the engine's retro character.

use crate::status::Status;

pub const SAMPLES_PER_BLOCK: usize = 16;
pub const BYTES_PER_BLOCK: usize = 9;

/// Q16.16 predictor coefficients selected by the filter byte's bits 4-5.
const LP_CONSTANTS: [(i64, i64); 4] = [(0, 0), (61440, 0), (124928, 61440), (117760, 53248)];

fn clamp_nibble(c: i64) -> i64 {
    c.clamp(-8, 7)
}

/// Predicts and quantizes one sample, returning the signed 4-bit code.
/// `prev1`/`prev2` are the two most recently *decompressed* outputs.
fn compress_sample(source: i16, prev1: i16, prev2: i16, exp_shift: u32, lp_mode: usize) -> i64 {
    let (k1, k2) = LP_CONSTANTS[lp_mode];
    let s0 = (source as i64) << 16;
    let predicted = s0 - k1 * prev1 as i64 + k2 * prev2 as i64;
    clamp_nibble(predicted >> (exp_shift + 16))
}

/// Reconstructs one sample from its quantized code.
fn decompress_sample(code: i64, prev1: i16, prev2: i16, exp_shift: u32, lp_mode: usize) -> i16 {
    let (k1, k2) = LP_CONSTANTS[lp_mode];
    let reconstructed = (code << (exp_shift + 16)) + k1 * prev1 as i64 - k2 * prev2 as i64;
    (reconstructed >> 16).clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

/// Runs the full compress/decompress pass for one candidate filter over one
/// block, returning the codes, the decompressed samples, the summed absolute
/// error against `block`, and the two decompressed outputs to carry forward
/// as `prev1`/`prev2` into the next block. `block` may be shorter than
/// [`SAMPLES_PER_BLOCK`] for a trailing partial block; the error sum and
/// predictor state only ever cover the real samples passed in, never a
/// padded-out block.
fn try_filter(block: &[i16], prev1: i16, prev2: i16, exp_shift: u32, lp_mode: usize) -> (Vec<i64>, Vec<i16>, i64, i16, i16) {
    let mut codes = Vec::with_capacity(block.len());
    let mut decoded = Vec::with_capacity(block.len());
    let mut d1 = prev1;
    let mut d2 = prev2;
    let mut error = 0i64;
    for &s in block {
        let code = compress_sample(s, d1, d2, exp_shift, lp_mode);
        let recon = decompress_sample(code, d1, d2, exp_shift, lp_mode);
        error += (s as i64 - recon as i64).abs();
        codes.push(code);
        decoded.push(recon);
        d2 = d1;
        d1 = recon;
    }
    (codes, decoded, error, d1, d2)
}

/// Picks the filter byte minimizing total absolute error for one block.
/// Ties go to the first-tried filter (`exp_shift` ascending, `lp_mode`
/// ascending within each `exp_shift`).
fn best_filter_for_block(block: &[i16], prev1: i16, prev2: i16) -> (u32, usize, Vec<i64>, i16, i16) {
    let mut best: Option<(i64, u32, usize, Vec<i64>, i16, i16)> = None;
    for exp_shift in 0..16u32 {
        for lp_mode in 0..4usize {
            let (codes, _decoded, error, d1, d2) = try_filter(block, prev1, prev2, exp_shift, lp_mode);
            let better = match &best {
                None => true,
                Some((best_error, ..)) => error < *best_error,
            };
            if better {
                best = Some((error, exp_shift, lp_mode, codes, d1, d2));
            }
        }
    }
    let (_, exp_shift, lp_mode, codes, d1, d2) = best.expect("search space is non-empty");
    (exp_shift, lp_mode, codes, d1, d2)
}

/// Packs `codes` (1-16 of them) into `ceil(codes.len() / 2)` bytes, nibble 0
/// in the low nibble of byte 0. A block whose sample count is odd leaves the
/// final byte's high nibble zeroed; the decoder still reads it back as one
/// more (silent-leaning) sample, which callers trim against the declared
/// sample count.
fn pack_codes(codes: &[i64]) -> Vec<u8> {
    let byte_count = codes.len().div_ceil(2);
    let mut out = vec![0u8; byte_count];
    for (i, &code) in codes.iter().enumerate() {
        let nibble = (code & 0x0F) as u8;
        let byte_index = i / 2;
        if i % 2 == 0 {
            out[byte_index] = (out[byte_index] & 0xF0) | nibble;
        } else {
            out[byte_index] = (out[byte_index] & 0x0F) | (nibble << 4);
        }
    }
    out
}

fn sign_extend_nibble(n: u8) -> i64 {
    let n = n & 0x0F;
    if n & 0x08 != 0 {
        (n as i64) - 16
    } else {
        n as i64
    }
}

/// Encodes arbitrary-length mono PCM into BRR blocks. Every block but
/// possibly the last holds exactly [`SAMPLES_PER_BLOCK`] samples; a trailing
/// partial block is encoded over only its real samples — the greedy filter
/// search never sees a padded-out sample — and its data is `samples/2`
/// rounded up to the next whole byte rather than always the full 8.
pub fn encode(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity((samples.len() / SAMPLES_PER_BLOCK + 1) * BYTES_PER_BLOCK);
    let mut prev1: i16 = 0;
    let mut prev2: i16 = 0;
    for chunk in samples.chunks(SAMPLES_PER_BLOCK) {
        let (exp_shift, lp_mode, codes, d1, d2) = best_filter_for_block(chunk, prev1, prev2);
        let filter_byte = (exp_shift as u8) | ((lp_mode as u8) << 4);
        out.push(filter_byte);
        out.extend_from_slice(&pack_codes(&codes));
        prev1 = d1;
        prev2 = d2;
    }
    out
}

/// Decodes a BRR block stream back into mono PCM. Reads blocks sequentially:
/// a filter byte followed by as many data bytes as remain, up to
/// [`BYTES_PER_BLOCK`] `- 1`. Every non-final block in a stream produced by
/// [`encode`] has exactly that many data bytes, so this only ever falls
/// short on the true trailing partial block. A lone filter byte with no
/// data following it is a format error.
pub fn decode(block_bytes: &[u8]) -> Result<Vec<i16>, Status> {
    let mut out = Vec::with_capacity(block_bytes.len() / BYTES_PER_BLOCK * SAMPLES_PER_BLOCK);
    let mut prev1: i16 = 0;
    let mut prev2: i16 = 0;
    let mut pos = 0;
    while pos < block_bytes.len() {
        let filter_byte = block_bytes[pos];
        pos += 1;
        let exp_shift = (filter_byte & 0x0F) as u32;
        let lp_mode = ((filter_byte >> 4) & 0x03) as usize;

        let data_len = (block_bytes.len() - pos).min(BYTES_PER_BLOCK - 1);
        if data_len == 0 {
            return Err(Status::format_mismatch("BRR block has a filter byte but no data bytes"));
        }
        for &byte in &block_bytes[pos..pos + data_len] {
            for nibble in [byte & 0x0F, byte >> 4] {
                let code = sign_extend_nibble(nibble);
                let sample = decompress_sample(code, prev1, prev2, exp_shift, lp_mode);
                out.push(sample);
                prev2 = prev1;
                prev1 = sample;
            }
        }
        pos += data_len;
    }
    Ok(out)
}

/// BRR container framing: `"TLGR" "BRR " u16 rate u8 mode u32 sample_count
/// u32 brr_byte_count` followed by the block stream.
pub mod file {
    use super::*;

    const MAGIC_TLGR: [u8; 4] = *b"TLGR";
    const MAGIC_BRR: [u8; 4] = *b"BRR ";

    /// Bit 0 of `mode` hints that the decoded samples should be pyramided
    /// for resynthesis; this crate leaves that decision to the sample
    /// payload constructor and only threads the flag through.
    pub const MODE_PYRAMID_HINT: u8 = 1 << 0;

    pub fn encode_file(samples: &[i16], sampling_rate: u16, mode: u8) -> Vec<u8> {
        let blocks = encode(samples);
        let mut out = Vec::with_capacity(4 + 4 + 2 + 1 + 4 + 4 + blocks.len());
        out.extend_from_slice(&MAGIC_TLGR);
        out.extend_from_slice(&MAGIC_BRR);
        out.extend_from_slice(&sampling_rate.to_le_bytes());
        out.push(mode);
        out.extend_from_slice(&(samples.len() as u32).to_le_bytes());
        out.extend_from_slice(&(blocks.len() as u32).to_le_bytes());
        out.extend_from_slice(&blocks);
        out
    }

    pub struct DecodedFile {
        pub sampling_rate: u16,
        pub mode: u8,
        pub samples: Vec<i16>,
    }

    pub fn decode_file(bytes: &[u8]) -> Result<DecodedFile, Status> {
        if bytes.len() < 19 {
            return Err(Status::format_mismatch("BRR file shorter than its header"));
        }
        if bytes[0..4] != MAGIC_TLGR {
            return Err(Status::format_mismatch("missing TLGR magic"));
        }
        if bytes[4..8] != MAGIC_BRR {
            return Err(Status::format_mismatch("missing BRR magic"));
        }
        let sampling_rate = u16::from_le_bytes([bytes[8], bytes[9]]);
        let mode = bytes[10];
        let sample_count = u32::from_le_bytes(bytes[11..15].try_into().unwrap()) as usize;
        let brr_byte_count = u32::from_le_bytes(bytes[15..19].try_into().unwrap()) as usize;
        let blocks_start = 19;
        let blocks_end = blocks_start + brr_byte_count;
        if bytes.len() < blocks_end {
            return Err(Status::format_mismatch("BRR file truncated before declared block count"));
        }
        let mut samples = decode(&bytes[blocks_start..blocks_end])?;
        if samples.len() > sample_count {
            samples.truncate(sample_count);
        } else if samples.len() < sample_count {
            log::warn!(
                "BRR file declares {sample_count} samples but only decoded {}; truncation window was never reached",
                samples.len()
            );
        }
        Ok(DecodedFile {
            sampling_rate,
            mode,
            samples,
        })
    }
}
