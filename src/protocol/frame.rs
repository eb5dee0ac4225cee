//! Frame struct with encode/decode.
//!
//! Represents a complete protocol frame: header fields, the optional fields
//! that follow the header, and the payload. Uses `bytes::Bytes` for
//! zero-copy payload sharing.
//!
//! ```text
//! header (4 bytes)
//! [sequence: i32]              if flags announce a sequence
//! [error code: u32]            ERROR_INFORMATION, opt-in (see below)
//! [event id: u32]              if flags & EVENT_ID
//! [id len: u32][id: UTF-8]     if the event carries the id slot
//! payload len: u32
//! payload
//! ```
//!
//! By default an ERROR_INFORMATION frame is laid out like any other frame:
//! its JSON body carries the error. Some deployments put a u32 error code
//! before the event id; decode those with
//! [`DecodeOptions::error_code_slot`].
//!
//! # Example
//!
//! ```
//! use dialog_client::protocol::{Frame, MessageType, Serialization};
//!
//! let frame = Frame::new(MessageType::FullClientRequest, Serialization::Json)
//!     .with_event(300)
//!     .with_session_id("3f2a")
//!     .with_payload(&br#"{"content":"hi"}"#[..]);
//!
//! let bytes = frame.encode().unwrap();
//! let decoded = Frame::decode(&bytes).unwrap();
//! assert_eq!(decoded, frame);
//! assert_eq!(decoded.session_id.as_deref(), Some("3f2a"));
//! ```

use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};

use super::event_id::{carries_id_slot, ServerEventId};
use super::wire_format::{
    flags, Compression, Header, MessageType, Serialization, MIN_FRAME_SIZE, SESSION_ID_LEN_LIMIT,
};
use crate::codec::GzipCodec;
use crate::error::{FrameError, Result};

/// Layout choices that the header alone does not announce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// ERROR_INFORMATION frames carry a u32 error code after the sequence.
    pub error_code_slot: bool,
}

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type.
    pub message_type: MessageType,
    /// Flags nibble (see [`flags`]).
    pub flags: u8,
    /// Payload serialization.
    pub serialization: Serialization,
    /// Payload compression.
    pub compression: Compression,
    /// Sequence number, present iff the flags announce one.
    pub sequence: Option<i32>,
    /// Error code of an ERROR_INFORMATION frame, when the layout has one.
    pub error_code: Option<u32>,
    /// Event id, present iff the EVENT_ID flag is set.
    pub event_id: Option<u32>,
    /// Session id (connect id on server connection events).
    pub session_id: Option<String>,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame with no optional fields and an empty payload.
    pub fn new(message_type: MessageType, serialization: Serialization) -> Self {
        Self {
            message_type,
            flags: flags::NO_SEQUENCE,
            serialization,
            compression: Compression::None,
            sequence: None,
            error_code: None,
            event_id: None,
            session_id: None,
            payload: Bytes::new(),
        }
    }

    /// Set the event id and the EVENT_ID flag.
    pub fn with_event(mut self, event_id: u32) -> Self {
        self.flags |= flags::EVENT_ID;
        self.event_id = Some(event_id);
        self
    }

    /// Set the session id slot.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the sequence number; the sign selects the sequence flag.
    pub fn with_sequence(mut self, sequence: i32) -> Self {
        self.flags &= !flags::SEQUENCE_MASK;
        self.flags |= if sequence < 0 {
            flags::NEGATIVE_SEQUENCE
        } else {
            flags::POSITIVE_SEQUENCE
        };
        self.sequence = Some(sequence);
        self
    }

    /// Set the error code (ERROR_INFORMATION frames only). The encoded frame
    /// then needs [`DecodeOptions::error_code_slot`] to be read back.
    pub fn with_error_code(mut self, code: u32) -> Self {
        self.error_code = Some(code);
        self
    }

    /// Set the compression method. The payload must already be compressed.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the payload.
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Header for this frame.
    pub fn header(&self) -> Header {
        Header::new(
            self.message_type,
            self.flags,
            self.serialization,
            self.compression,
        )
    }

    /// Server event named by the event id, if it is a known one.
    #[inline]
    pub fn server_event(&self) -> Option<ServerEventId> {
        self.event_id.and_then(ServerEventId::from_u32)
    }

    /// Check if this is an ERROR_INFORMATION frame.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.message_type == MessageType::ErrorInformation
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Payload with compression removed.
    pub fn decompressed_payload(&self) -> Result<Bytes> {
        match self.compression {
            Compression::None => Ok(self.payload.clone()),
            Compression::Gzip => Ok(Bytes::from(GzipCodec::decompress(&self.payload)?)),
        }
    }

    /// Size of the encoded frame in bytes.
    pub fn encoded_len(&self) -> usize {
        let mut len = MIN_FRAME_SIZE + self.payload.len();
        if self.sequence.is_some() {
            len += 4;
        }
        if self.error_code.is_some() {
            len += 4;
        }
        if self.event_id.is_some() {
            len += 4;
        }
        if let Some(session_id) = &self.session_id {
            len += 4 + session_id.len();
        }
        len
    }

    /// Encode the frame into a contiguous buffer.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Inconsistent`] when optional fields disagree with
    /// the flags or message type, and [`FrameError::SessionIdTooLong`] when
    /// the session id would be rejected by a decoder.
    pub fn encode(&self) -> std::result::Result<Bytes, FrameError> {
        self.check_consistency()?;

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(&self.header().encode());

        if let Some(sequence) = self.sequence {
            buf.put_i32(sequence);
        }
        if let Some(code) = self.error_code {
            buf.put_u32(code);
        }
        if let Some(event_id) = self.event_id {
            buf.put_u32(event_id);
        }
        if let Some(session_id) = &self.session_id {
            buf.put_u32(session_id.len() as u32);
            buf.put_slice(session_id.as_bytes());
        }
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);

        Ok(buf.freeze())
    }

    fn check_consistency(&self) -> std::result::Result<(), FrameError> {
        if flags::has_flag(self.flags, flags::EVENT_ID) != self.event_id.is_some() {
            return Err(FrameError::Inconsistent("EVENT_ID flag and event id disagree"));
        }
        if flags::has_sequence(self.flags) != self.sequence.is_some() {
            return Err(FrameError::Inconsistent("sequence flag and sequence disagree"));
        }
        if self.error_code.is_some() && !self.is_error() {
            return Err(FrameError::Inconsistent(
                "error code requires an ERROR_INFORMATION frame",
            ));
        }
        let wants_slot = self.event_id.is_some_and(carries_id_slot);
        if wants_slot != self.session_id.is_some() {
            return Err(FrameError::Inconsistent("session id does not match event id"));
        }
        if let Some(session_id) = &self.session_id {
            if session_id.len() >= SESSION_ID_LEN_LIMIT as usize {
                return Err(FrameError::SessionIdTooLong(
                    u32::try_from(session_id.len()).unwrap_or(u32::MAX),
                ));
            }
        }
        if u32::try_from(self.payload.len()).is_err() {
            return Err(FrameError::Inconsistent("payload longer than u32::MAX"));
        }
        Ok(())
    }

    /// Decode a frame from a complete message, copying the payload.
    ///
    /// Optional fields are read according to the flags found in the
    /// header. The buffer must hold exactly one frame.
    pub fn decode(buf: &[u8]) -> std::result::Result<Frame, FrameError> {
        Self::decode_with(buf, DecodeOptions::default())
    }

    /// [`decode`](Self::decode) with explicit layout options.
    pub fn decode_with(
        buf: &[u8],
        options: DecodeOptions,
    ) -> std::result::Result<Frame, FrameError> {
        let (mut frame, range) = parse(buf, options)?;
        frame.payload = Bytes::copy_from_slice(&buf[range]);
        Ok(frame)
    }

    /// Decode a frame, sharing the payload with `buf` (zero-copy).
    pub fn decode_bytes(buf: &Bytes) -> std::result::Result<Frame, FrameError> {
        Self::decode_bytes_with(buf, DecodeOptions::default())
    }

    /// [`decode_bytes`](Self::decode_bytes) with explicit layout options.
    pub fn decode_bytes_with(
        buf: &Bytes,
        options: DecodeOptions,
    ) -> std::result::Result<Frame, FrameError> {
        let (mut frame, range) = parse(buf, options)?;
        frame.payload = buf.slice(range);
        Ok(frame)
    }
}

/// Bounds-checked big-endian cursor.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, field: &'static str, n: usize) -> std::result::Result<&'a [u8], FrameError> {
        if self.remaining() < n {
            return Err(FrameError::Truncated {
                field,
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self, field: &'static str) -> std::result::Result<u32, FrameError> {
        let b = self.take(field, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self, field: &'static str) -> std::result::Result<i32, FrameError> {
        let b = self.take(field, 4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Parse everything but the payload, returning the payload's byte range.
fn parse(
    buf: &[u8],
    options: DecodeOptions,
) -> std::result::Result<(Frame, Range<usize>), FrameError> {
    if buf.len() < MIN_FRAME_SIZE {
        return Err(FrameError::Truncated {
            field: "frame",
            needed: MIN_FRAME_SIZE,
            available: buf.len(),
        });
    }

    let header = Header::decode(buf)?;
    let mut reader = Reader::new(buf);
    reader.take("header", header.byte_len())?;

    let sequence = if header.has_sequence() {
        Some(reader.i32("sequence")?)
    } else {
        None
    };

    let error_code = if options.error_code_slot
        && header.message_type == MessageType::ErrorInformation
    {
        Some(reader.u32("error code")?)
    } else {
        None
    };

    let event_id = if header.has_event() {
        Some(reader.u32("event id")?)
    } else {
        None
    };

    let session_id = match event_id {
        Some(id) if carries_id_slot(id) => {
            let len = reader.u32("session id length")?;
            if len >= SESSION_ID_LEN_LIMIT {
                return Err(FrameError::SessionIdTooLong(len));
            }
            let raw = reader.take("session id", len as usize)?;
            let id = std::str::from_utf8(raw).map_err(|_| FrameError::InvalidSessionId)?;
            Some(id.to_owned())
        }
        _ => None,
    };

    let payload_len = reader.u32("payload length")? as usize;
    let start = reader.pos;
    reader.take("payload", payload_len)?;

    if reader.remaining() > 0 {
        return Err(FrameError::TrailingBytes(reader.remaining()));
    }

    let frame = Frame {
        message_type: header.message_type,
        flags: header.flags,
        serialization: header.serialization,
        compression: header.compression,
        sequence,
        error_code,
        event_id,
        session_id,
        payload: Bytes::new(),
    };
    Ok((frame, start..start + payload_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_frame() -> Frame {
        Frame::new(MessageType::FullClientRequest, Serialization::Json)
            .with_event(500)
            .with_session_id("session-1")
            .with_payload(&br#"{"start":true,"content":"hi","end":true}"#[..])
    }

    #[test]
    fn test_roundtrip_representative_shapes() {
        let frames = vec![
            chat_frame(),
            // client connection event: no id slot
            Frame::new(MessageType::FullClientRequest, Serialization::Json)
                .with_event(1)
                .with_payload(&b"{}"[..]),
            // audio upstream
            Frame::new(MessageType::AudioOnlyRequest, Serialization::Raw)
                .with_event(200)
                .with_session_id("s")
                .with_payload(vec![0u8, 1, 2, 3, 255]),
            // server connection event: id slot carries the connect id
            Frame::new(MessageType::FullServerResponse, Serialization::Json)
                .with_event(50)
                .with_session_id("connect-7"),
            // sequenced gzip frame
            Frame::new(MessageType::FullServerResponse, Serialization::Json)
                .with_sequence(-3)
                .with_event(451)
                .with_session_id("s")
                .with_compression(Compression::Gzip)
                .with_payload(&b"\x1f\x8b"[..]),
            // error frame without event
            Frame::new(MessageType::ErrorInformation, Serialization::Json)
                .with_payload(&br#"{"error":"quota exceeded"}"#[..]),
            // no event id at all
            Frame::new(MessageType::FullClientRequest, Serialization::Raw),
        ];

        for frame in frames {
            let bytes = frame.encode().unwrap();
            assert_eq!(bytes.len(), frame.encoded_len());
            assert_eq!(Frame::decode(&bytes).unwrap(), frame);
            assert_eq!(Frame::decode_bytes(&bytes).unwrap(), frame);
        }
    }

    #[test]
    fn test_error_frame_reads_body_after_header() {
        let body = br#"{"error":"quota exceeded"}"#;
        let mut bytes = vec![0x11, 0xF0, 0x10, 0x00];
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(body);

        let frame = Frame::decode(&bytes).unwrap();
        assert!(frame.is_error());
        assert_eq!(frame.error_code, None);
        assert_eq!(frame.event_id, None);
        assert_eq!(&frame.payload[..], body);

        // the same bytes are too short once a code word is expected
        let options = DecodeOptions {
            error_code_slot: true,
        };
        assert!(Frame::decode_with(&bytes, options).is_err());
    }

    #[test]
    fn test_error_code_slot() {
        let frame = Frame::new(MessageType::ErrorInformation, Serialization::Json)
            .with_error_code(45_000_001)
            .with_payload(&br#"{"error":"quota exceeded"}"#[..]);
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), frame.encoded_len());
        assert_eq!(&bytes[4..8], &45_000_001u32.to_be_bytes());

        let options = DecodeOptions {
            error_code_slot: true,
        };
        assert_eq!(Frame::decode_with(&bytes, options).unwrap(), frame);
        assert_eq!(Frame::decode_bytes_with(&bytes, options).unwrap(), frame);

        // the slot only applies to error frames
        let chat = chat_frame();
        assert_eq!(Frame::decode_with(&chat.encode().unwrap(), options).unwrap(), chat);
    }

    #[test]
    fn test_byte_layout() {
        let frame = Frame::new(MessageType::FullClientRequest, Serialization::Json)
            .with_event(300)
            .with_session_id("ab")
            .with_payload(&b"{}"[..]);
        let bytes = frame.encode().unwrap();

        assert_eq!(
            &bytes[..],
            &[
                0x11, 0x14, 0x10, 0x00, // header
                0x00, 0x00, 0x01, 0x2C, // event 300
                0x00, 0x00, 0x00, 0x02, b'a', b'b', // session id
                0x00, 0x00, 0x00, 0x02, b'{', b'}', // payload
            ]
        );
    }

    #[test]
    fn test_six_byte_buffer_is_rejected() {
        let err = Frame::decode(&[0x11, 0x94, 0x10, 0x00, 0x00, 0x00]).unwrap_err();
        assert_eq!(
            err,
            FrameError::Truncated {
                field: "frame",
                needed: 8,
                available: 6
            }
        );
    }

    #[test]
    fn test_payload_length_exceeding_buffer() {
        let mut bytes = chat_frame().encode().unwrap().to_vec();
        bytes.truncate(bytes.len() - 5);
        let err = Frame::decode(&bytes).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { field: "payload", .. }));
    }

    #[test]
    fn test_huge_declared_payload_length() {
        let bytes = [0x11, 0x10, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let err = Frame::decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                field: "payload",
                needed: 0xFFFF_FFFF,
                available: 1
            }
        ));
    }

    #[test]
    fn test_session_id_length_bound() {
        let mut bytes = vec![0x11, 0x94, 0x10, 0x00];
        bytes.extend_from_slice(&451u32.to_be_bytes());
        bytes.extend_from_slice(&1000u32.to_be_bytes());
        bytes.extend_from_slice(&[b'x'; 16]);
        assert_eq!(
            Frame::decode(&bytes).unwrap_err(),
            FrameError::SessionIdTooLong(1000)
        );

        // a negative length on the wire reads as a huge unsigned value
        let mut bytes = vec![0x11, 0x94, 0x10, 0x00];
        bytes.extend_from_slice(&451u32.to_be_bytes());
        bytes.extend_from_slice(&(-1i32).to_be_bytes());
        assert_eq!(
            Frame::decode(&bytes).unwrap_err(),
            FrameError::SessionIdTooLong(u32::MAX)
        );
    }

    #[test]
    fn test_session_id_longer_than_buffer() {
        let mut bytes = vec![0x11, 0x94, 0x10, 0x00];
        bytes.extend_from_slice(&150u32.to_be_bytes());
        bytes.extend_from_slice(&40u32.to_be_bytes());
        bytes.extend_from_slice(b"short");
        let err = Frame::decode(&bytes).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { field: "session id", .. }));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = chat_frame().encode().unwrap().to_vec();
        bytes.extend_from_slice(b"junk");
        assert_eq!(Frame::decode(&bytes).unwrap_err(), FrameError::TrailingBytes(4));
    }

    #[test]
    fn test_invalid_utf8_session_id() {
        let mut bytes = vec![0x11, 0x94, 0x10, 0x00];
        bytes.extend_from_slice(&150u32.to_be_bytes());
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&[0xC3, 0x28]);
        bytes.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(Frame::decode(&bytes).unwrap_err(), FrameError::InvalidSessionId);
    }

    #[test]
    fn test_header_extension_is_skipped() {
        let mut bytes = vec![0x12, 0x90, 0x10, 0x00, 0xDE, 0xAD, 0xBE, 0xEF];
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(b"{}");
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.message_type, MessageType::FullServerResponse);
        assert_eq!(&frame.payload[..], b"{}");
    }

    #[test]
    fn test_encode_rejects_inconsistent_frames() {
        let missing_slot = Frame::new(MessageType::FullClientRequest, Serialization::Json).with_event(100);
        assert!(matches!(missing_slot.encode(), Err(FrameError::Inconsistent(_))));

        let extra_slot = Frame::new(MessageType::FullClientRequest, Serialization::Json)
            .with_event(1)
            .with_session_id("nope");
        assert!(matches!(extra_slot.encode(), Err(FrameError::Inconsistent(_))));

        let mut flag_only = chat_frame();
        flag_only.event_id = None;
        assert!(matches!(flag_only.encode(), Err(FrameError::Inconsistent(_))));

        let stray_code = chat_frame().with_error_code(1);
        assert!(matches!(stray_code.encode(), Err(FrameError::Inconsistent(_))));

        let long_id = Frame::new(MessageType::FullClientRequest, Serialization::Json)
            .with_event(100)
            .with_session_id("x".repeat(1000));
        assert_eq!(long_id.encode(), Err(FrameError::SessionIdTooLong(1000)));
    }

    #[test]
    fn test_decompressed_payload() {
        let body = br#"{"content":"hello"}"#;
        let frame = Frame::new(MessageType::FullServerResponse, Serialization::Json)
            .with_event(550)
            .with_session_id("s")
            .with_compression(Compression::Gzip)
            .with_payload(GzipCodec::compress(body).unwrap());
        assert_eq!(&frame.decompressed_payload().unwrap()[..], body);

        let plain = chat_frame();
        assert_eq!(plain.decompressed_payload().unwrap(), plain.payload);
    }

    #[test]
    fn test_server_event_lookup() {
        let frame = Frame::new(MessageType::FullServerResponse, Serialization::Json)
            .with_event(559)
            .with_session_id("s");
        assert_eq!(frame.server_event(), Some(ServerEventId::ChatEnded));
        assert_eq!(chat_frame().server_event(), None);
    }
}
