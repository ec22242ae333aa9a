//! Length-prefixed framing of engine input and output.
//!
//! A batch is a concatenation of frames
//! `[u32 size][u32 call_index][body]`, where `size = body.len() + 4`
//! and both integers are little-endian. A frame whose size is zero ends
//! the stream; anything after it is ignored.

use thiserror::Error;

use crate::types::CallIndex;

const U32_LEN: usize = 4;

/// One decoded frame, borrowing its body from the batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame<'a> {
    pub call_index: CallIndex,
    pub body: &'a [u8],
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("truncated frame header at offset {offset}")]
    TruncatedHeader { offset: usize },
    #[error("frame at offset {offset} declares size {size} smaller than its index")]
    UndersizedFrame { offset: usize, size: u32 },
    #[error("frame at offset {offset} declares {size} bytes but only {available} remain")]
    TruncatedBody {
        offset: usize,
        size: u32,
        available: usize,
    },
    #[error("frame body of {0} bytes does not fit a u32 size")]
    Oversized(usize),
}

/// Appends one frame to `out`.
pub fn push_frame(out: &mut Vec<u8>, call_index: CallIndex, body: &[u8]) -> Result<(), FrameError> {
    let size = body
        .len()
        .checked_add(U32_LEN)
        .and_then(|s| u32::try_from(s).ok())
        .ok_or(FrameError::Oversized(body.len()))?;
    out.reserve(2 * U32_LEN + body.len());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&call_index.to_le_bytes());
    out.extend_from_slice(body);
    Ok(())
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; U32_LEN] = buf.get(offset..offset + U32_LEN)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Splits a batch into frames, stopping at the end or at a zero size.
pub fn decode_frames(buf: &[u8]) -> Result<Vec<Frame<'_>>, FrameError> {
    let mut frames = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let size = read_u32(buf, offset).ok_or(FrameError::TruncatedHeader { offset })?;
        if size == 0 {
            break;
        }
        if (size as usize) < U32_LEN {
            return Err(FrameError::UndersizedFrame { offset, size });
        }

        let start = offset + U32_LEN;
        let available = buf.len() - start;
        if size as usize > available {
            return Err(FrameError::TruncatedBody {
                offset,
                size,
                available,
            });
        }

        let call_index = read_u32(buf, start).ok_or(FrameError::TruncatedHeader { offset })?;
        let end = start + size as usize;
        frames.push(Frame {
            call_index,
            body: &buf[start + U32_LEN..end],
        });
        offset = end;
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(frames: &[(CallIndex, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (idx, body) in frames {
            push_frame(&mut out, *idx, body).unwrap();
        }
        out
    }

    #[test]
    fn frame_layout_is_size_index_body() {
        let out = batch(&[(7, &[0xAA, 0xBB][..])]);
        assert_eq!(out, vec![6, 0, 0, 0, 7, 0, 0, 0, 0xAA, 0xBB]);
    }

    #[test]
    fn frames_decode_in_order_including_empty_bodies() {
        let out = batch(&[(1, &b"first"[..]), (2, &b""[..]), (3, &b"third"[..])]);
        let frames = decode_frames(&out).unwrap();
        assert_eq!(
            frames,
            vec![
                Frame { call_index: 1, body: &b"first"[..] },
                Frame { call_index: 2, body: &b""[..] },
                Frame { call_index: 3, body: &b"third"[..] },
            ]
        );
    }

    #[test]
    fn zero_size_stops_parsing_at_its_offset() {
        let mut out = batch(&[(1, &b"kept"[..])]);
        let k = out.len();
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&batch(&[(2, &b"ignored"[..])]));

        let frames = decode_frames(&out).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].call_index, 1);
        assert_eq!(decode_frames(&out[..k]).unwrap(), frames);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let out = batch(&[(1, &b"body"[..])]);
        assert!(matches!(
            decode_frames(&out[..out.len() - 1]),
            Err(FrameError::TruncatedBody { .. })
        ));
        assert!(matches!(
            decode_frames(&out[..2]),
            Err(FrameError::TruncatedHeader { offset: 0 })
        ));
        assert!(matches!(
            decode_frames(&[2, 0, 0, 0, 9, 9]),
            Err(FrameError::UndersizedFrame { size: 2, .. })
        ));
    }

    #[test]
    fn empty_batch_has_no_frames() {
        assert!(decode_frames(&[]).unwrap().is_empty());
    }
}
