//! Steim-1 and Steim-2 decompression of miniSEED 2 payloads.
//!
//! A payload is a run of 64 byte frames of sixteen 32-bit words. Word 0 of
//! each frame holds sixteen 2-bit nibbles describing how the other words pack
//! first differences. Words 1 and 2 of the first frame are the forward (X0)
//! and reverse (Xn) integration constants.

use anyhow::anyhow;

const FRAME_SIZE: usize = 16;
const FRAME_BYTES: usize = FRAME_SIZE * 4;
/// Steim-2 packs at most seven differences per word.
const DIFF_SIZE: usize = 7 * FRAME_SIZE;

#[inline(always)]
fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

fn words(payload: &[u8], big_endian: bool) -> Vec<u32> {
    payload
        .chunks_exact(4)
        .map(|chunk| {
            let mut bytes = [0; 4];
            bytes.copy_from_slice(chunk);
            if big_endian {
                u32::from_be_bytes(bytes)
            } else {
                u32::from_le_bytes(bytes)
            }
        })
        .collect()
}

/// Unpacks one data word by its nibble. Returns the number of differences
/// written to `diff`.
type WordDecoder = fn(nibble: u32, word: u32, diff: &mut [i32]) -> anyhow::Result<usize>;

fn steim1_word(nibble: u32, word: u32, diff: &mut [i32]) -> anyhow::Result<usize> {
    match nibble {
        0 => Ok(0),
        1 => {
            for (i, d) in diff.iter_mut().take(4).enumerate() {
                *d = sign_extend((word >> (24 - 8 * i)) & 0xFF, 8);
            }
            Ok(4)
        }
        2 => {
            for (i, d) in diff.iter_mut().take(2).enumerate() {
                *d = sign_extend((word >> (16 - 16 * i)) & 0xFFFF, 16);
            }
            Ok(2)
        }
        _ => {
            diff[0] = word as i32;
            Ok(1)
        }
    }
}

fn steim2_word(nibble: u32, word: u32, diff: &mut [i32]) -> anyhow::Result<usize> {
    let dnib = (word >> 30) & 0x03;
    // (count, bits) per packing
    let (count, bits) = match (nibble, dnib) {
        (0, _) => return Ok(0),
        (1, _) => (4, 8),
        (2, 1) => (1, 30),
        (2, 2) => (2, 15),
        (2, 3) => (3, 10),
        (3, 0) => (5, 6),
        (3, 1) => (6, 5),
        (3, 2) => (7, 4),
        (n, d) => return Err(anyhow!("impossible Steim-2 nibble {:02b} dnib {:02b}", n, d)),
    };
    let mask = (1u32 << bits) - 1;
    let top = count * bits;
    for (i, d) in diff.iter_mut().take(count as usize).enumerate() {
        let shift = top - bits * (i as u32 + 1);
        *d = sign_extend((word >> shift) & mask, bits);
    }
    Ok(count as usize)
}

fn decode_frames(
    payload: &[u8],
    sample_count: usize,
    big_endian: bool,
    sid: &str,
    name: &str,
    word_decoder: WordDecoder,
) -> anyhow::Result<Vec<i32>> {
    let input = words(payload, big_endian);
    if input.is_empty() {
        return Err(anyhow!("{}: empty {} payload", sid, name));
    }
    let max_frames = payload.len() / FRAME_BYTES;
    let mut output: Vec<i32> = Vec::with_capacity(sample_count);
    if max_frames == 0 || sample_count == 0 {
        return Ok(output);
    }
    log::trace!("{}: decoding {} {} frames", sid, max_frames, name);

    let mut diff = [0i32; DIFF_SIZE];
    let mut xn = 0i32;

    for frame_idx in 0..max_frames {
        if output.len() >= sample_count {
            break;
        }
        let frame = &input[frame_idx * FRAME_SIZE..(frame_idx + 1) * FRAME_SIZE];
        let start_word = if frame_idx == 0 {
            output.push(frame[1] as i32);
            xn = frame[2] as i32;
            log::trace!("Frame {}: X0={}  Xn={}", frame_idx, frame[1] as i32, xn);
            3
        } else {
            1
        };

        let mut diff_idx = 0;
        for widx in start_word..FRAME_SIZE {
            let nibble = (frame[0] >> (30 - 2 * widx)) & 0x03;
            diff_idx += word_decoder(nibble, frame[widx], &mut diff[diff_idx..])
                .map_err(|e| anyhow!("{}: frame {} word {}: {}", sid, frame_idx, widx, e))?;
        }

        // the first difference of the first frame is relative to the previous record
        let skip = if frame_idx == 0 { 1 } else { 0 };
        for d in diff.iter().take(diff_idx).skip(skip) {
            if output.len() >= sample_count {
                break;
            }
            let last = output[output.len() - 1];
            output.push(last.wrapping_add(*d));
        }
    }

    if output.len() != sample_count {
        log::warn!(
            "{}: number of samples decompressed doesn't match number in header: {} != {}",
            sid,
            output.len(),
            sample_count
        );
        return Err(anyhow!(
            "{}: decompressed {} samples, header says {}",
            sid,
            output.len(),
            sample_count
        ));
    }
    if output[output.len() - 1] != xn {
        log::warn!(
            "{}: data integrity check for {} failed, last sample={}, Xn={}",
            sid,
            name,
            output[output.len() - 1],
            xn
        );
    }
    Ok(output)
}

pub fn decode_steim1(payload: &[u8], sample_count: usize, big_endian: bool, sid: &str) -> anyhow::Result<Vec<i32>> {
    decode_frames(payload, sample_count, big_endian, sid, "Steim-1", steim1_word)
}

pub fn decode_steim2(payload: &[u8], sample_count: usize, big_endian: bool, sid: &str) -> anyhow::Result<Vec<i32>> {
    decode_frames(payload, sample_count, big_endian, sid, "Steim-2", steim2_word)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Builds a one-frame payload from explicit nibbles and words.
    pub(crate) fn frame(nibbles: &[u32], data: &[u32], x0: i32, xn: i32) -> Vec<u8> {
        let mut w = [0u32; FRAME_SIZE];
        w[1] = x0 as u32;
        w[2] = xn as u32;
        let mut control = 0u32;
        for (i, (&nib, &word)) in nibbles.iter().zip(data).enumerate() {
            let widx = 3 + i;
            control |= nib << (30 - 2 * widx);
            w[widx] = word;
        }
        w[0] = control;
        w.iter().flat_map(|x| x.to_be_bytes()).collect()
    }

    #[test]
    fn steim1_bytes_and_halfwords() {
        // diffs: [x, 1, -1, 2] (first ignored), then [-300, 300]
        let bytes_word = u32::from_be_bytes([0, 1, 0xFF, 2]);
        let half_word = ((-300i16 as u16 as u32) << 16) | 300u32;
        let payload = frame(&[1, 2], &[bytes_word, half_word], 10, 12);
        let out = decode_steim1(&payload, 6, true, "test").unwrap();
        assert_eq!(out, vec![10, 11, 10, 12, -288, 12]);
    }

    #[test]
    fn steim2_packings() {
        // 10,01: one 30-bit difference
        let w30 = (0b01 << 30) | ((-5i32 as u32) & 0x3FFF_FFFF);
        // 11,10: seven 4-bit differences of 1
        let mut w4 = 0b10u32 << 30;
        for i in 0..7 {
            w4 |= 1 << (24 - 4 * i);
        }
        let payload = frame(&[2, 3], &[w30, w4], 100, 107);
        let out = decode_steim2(&payload, 8, true, "test").unwrap();
        // the 30-bit difference is the ignored first one
        assert_eq!(out, vec![100, 101, 102, 103, 104, 105, 106, 107]);
    }

    #[test]
    fn steim2_impossible_dnib() {
        let payload = frame(&[2], &[0], 0, 0);
        assert!(decode_steim2(&payload, 2, true, "test").is_err());
    }

    #[test]
    fn count_mismatch_is_error() {
        let payload = frame(&[1], &[0x01010101], 0, 4);
        assert!(decode_steim1(&payload, 10, true, "test").is_err());
        assert_eq!(decode_steim1(&payload, 4, true, "test").unwrap(), vec![0, 1, 2, 3]);
    }
}
