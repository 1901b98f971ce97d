//! Length-prefixed framing for the control channel.
//!
//! A frame is a 4-byte big-endian body length followed by that many bytes of
//! UTF-8 JSON. The decoder works on a caller-owned [`BytesMut`] so the same
//! buffer can be handed to raw upload accounting between frames.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::FramingError;
use crate::protocol_constants::{FRAME_HEADER_LEN, MAX_FRAME_LEN};

/// Serializes `message` as JSON and prepends the length header.
pub fn encode_frame<T: Serialize + ?Sized>(message: &T) -> Result<Bytes, serde_json::Error> {
    let body = serde_json::to_vec(message)?;
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Incremental decoder for length-prefixed frames.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    max_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(MAX_FRAME_LEN)
    }
}

impl FrameDecoder {
    /// Creates a decoder that rejects bodies longer than `max_len` bytes.
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    /// Takes one complete frame body off the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed; `buf` is left untouched
    /// in that case. A zero or oversized length is unrecoverable.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        if buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&buf[..FRAME_HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;

        if len == 0 {
            return Err(FramingError::EmptyFrame);
        }
        if len > self.max_len {
            return Err(FramingError::Oversized {
                len,
                max: self.max_len,
            });
        }

        let total = FRAME_HEADER_LEN + len;
        if buf.len() < total {
            buf.reserve(total - buf.len());
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_LEN);
        Ok(Some(buf.split_to(len).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encoded_frame_has_big_endian_length() {
        let frame = encode_frame(&json!({"func": "query"})).unwrap();
        let body = br#"{"func":"query"}"#;
        assert_eq!(&frame[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&frame[4..], body);
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let decoder = FrameDecoder::default();
        let frame = encode_frame(&json!({"func": "query"})).unwrap();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame[..2]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2);

        buf.extend_from_slice(&frame[2..frame.len() - 1]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&frame[frame.len() - 1..]);
        let body = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&body[..], br#"{"func":"query"}"#);
        assert!(buf.is_empty());
    }

    #[test]
    fn back_to_back_frames_decode_separately() {
        let decoder = FrameDecoder::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_frame(&json!({"a": 1})).unwrap());
        buf.extend_from_slice(&encode_frame(&json!({"b": 2})).unwrap());

        assert_eq!(&decoder.decode(&mut buf).unwrap().unwrap()[..], br#"{"a":1}"#);
        assert_eq!(&decoder.decode(&mut buf).unwrap().unwrap()[..], br#"{"b":2}"#);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn zero_length_frame_is_rejected() {
        let decoder = FrameDecoder::default();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 0][..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(FramingError::EmptyFrame)
        ));
    }

    #[test]
    fn oversized_frame_is_rejected_before_body_arrives() {
        let decoder = FrameDecoder::new(16);
        let mut buf = BytesMut::new();
        buf.put_u32(17);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(FramingError::Oversized { len: 17, max: 16 })
        ));
    }
}
