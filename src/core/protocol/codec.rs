// src/core/protocol/codec.rs

//! Implements the framing codecs for the two listener protocols.
//!
//! Both protocols are newline-delimited with a bounded frame length; a frame
//! that grows past the bound is a protocol violation surfaced as a decode
//! error, which closes the connection.

use crate::core::ConsoleError;
use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Scans for the next newline-terminated chunk within `max_len` bytes.
/// Returns the chunk without its delimiter and without a trailing `\r`.
fn split_frame(
    src: &mut BytesMut,
    max_len: usize,
    overflow: ConsoleError,
) -> Result<Option<BytesMut>, ConsoleError> {
    match src.iter().position(|b| *b == b'\n') {
        Some(pos) => {
            if pos > max_len {
                return Err(overflow);
            }
            let mut frame = src.split_to(pos + 1);
            frame.truncate(pos);
            if frame.last() == Some(&b'\r') {
                frame.truncate(frame.len() - 1);
            }
            Ok(Some(frame))
        }
        None if src.len() > max_len => Err(overflow),
        None => Ok(None),
    }
}

/// Codec for the line-oriented console protocol.
///
/// The decoder yields UTF-8 lines; the encoder writes strings verbatim so the
/// adapter controls line endings itself (the prompt is deliberately not
/// newline-terminated).
#[derive(Debug)]
pub struct LineCodec {
    max_line_len: usize,
}

impl LineCodec {
    pub fn new(max_line_len: usize) -> Self {
        Self { max_line_len }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ConsoleError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match split_frame(src, self.max_line_len, ConsoleError::LineTooLong)? {
            Some(frame) => Ok(Some(String::from_utf8(frame.to_vec())?)),
            None => Ok(None),
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ConsoleError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}

/// Codec for the message-oriented protocol: one frame per newline-delimited
/// chunk, yielded as raw bytes.
///
/// The decoder stays byte-oriented so that binary frames are accepted at the
/// transport layer; interpretation (or deliberate non-interpretation) is the
/// adapter's concern. The encoder appends the delimiter itself.
#[derive(Debug)]
pub struct MessageFrameCodec {
    max_frame_len: usize,
}

impl MessageFrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

impl Decoder for MessageFrameCodec {
    type Item = Bytes;
    type Error = ConsoleError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match split_frame(src, self.max_frame_len, ConsoleError::FrameTooLong)? {
            Some(frame) => Ok(Some(frame.freeze())),
            None => Ok(None),
        }
    }
}

impl Encoder<String> for MessageFrameCodec {
    type Error = ConsoleError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
