//! Wire format encoding and decoding.
//!
//! Implements the 4-byte header that starts every frame:
//! ```text
//! ┌─────────┬─────────────┬──────────────┬───────┬───────────────┬─────────────┬──────────┐
//! │ Version │ Header size │ Message type │ Flags │ Serialization │ Compression │ Reserved │
//! │ 4 bits  │ 4 bits      │ 4 bits       │4 bits │ 4 bits        │ 4 bits      │ 1 byte   │
//! └─────────┴─────────────┴──────────────┴───────┴───────────────┴─────────────┴──────────┘
//! ```
//!
//! The header is followed by optional fields selected by the flags and the
//! message type (see [`Frame`](super::Frame)). All multi-byte integers are
//! Big Endian.

use crate::error::FrameError;

/// Header size in bytes (fixed, one 4-byte word).
pub const HEADER_SIZE: usize = 4;

/// Header size as carried in the header nibble (number of 4-byte words).
pub const HEADER_SIZE_WORDS: u8 = 0b0001;

/// Supported protocol version.
pub const PROTOCOL_VERSION: u8 = 0b0001;

/// Smallest possible frame: header plus the payload length field.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + 4;

/// Session id lengths at or above this value are rejected by the decoder.
pub const SESSION_ID_LEN_LIMIT: u32 = 1000;

/// Flag constants for the protocol (low nibble of byte 1).
pub mod flags {
    /// No sequence number follows the header.
    pub const NO_SEQUENCE: u8 = 0b0000;
    /// A positive sequence number follows the header.
    pub const POSITIVE_SEQUENCE: u8 = 0b0001;
    /// Last packet of a stream, no sequence number.
    pub const LAST_NO_SEQUENCE: u8 = 0b0010;
    /// A negative sequence number (last packet) follows the header.
    pub const NEGATIVE_SEQUENCE: u8 = 0b0011;
    /// An event id follows the header (and sequence, when present).
    pub const EVENT_ID: u8 = 0b0100;

    /// Mask of the two sequence bits.
    pub const SEQUENCE_MASK: u8 = 0b0011;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }

    /// Check whether the flags announce a sequence number field.
    #[inline]
    pub fn has_sequence(flags: u8) -> bool {
        matches!(flags & SEQUENCE_MASK, POSITIVE_SEQUENCE | NEGATIVE_SEQUENCE)
    }
}

/// Message type nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Client control frame with a serialized body.
    FullClientRequest = 0b0001,
    /// Client audio frame with raw samples.
    AudioOnlyRequest = 0b0010,
    /// Server control frame with a serialized body.
    FullServerResponse = 0b1001,
    /// Server audio frame with raw samples.
    AudioOnlyResponse = 0b1011,
    /// Server error report.
    ErrorInformation = 0b1111,
}

impl MessageType {
    /// Nibble value on the wire.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this type carries audio samples instead of a serialized body.
    #[inline]
    pub fn is_audio(self) -> bool {
        matches!(self, MessageType::AudioOnlyRequest | MessageType::AudioOnlyResponse)
    }

    /// Whether the server sends this type.
    #[inline]
    pub fn is_server(self) -> bool {
        matches!(
            self,
            MessageType::FullServerResponse
                | MessageType::AudioOnlyResponse
                | MessageType::ErrorInformation
        )
    }
}

impl TryFrom<u8> for MessageType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0b0001 => Ok(MessageType::FullClientRequest),
            0b0010 => Ok(MessageType::AudioOnlyRequest),
            0b1001 => Ok(MessageType::FullServerResponse),
            0b1011 => Ok(MessageType::AudioOnlyResponse),
            0b1111 => Ok(MessageType::ErrorInformation),
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }
}

/// Serialization method nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Serialization {
    /// Payload is raw bytes.
    Raw = 0b0000,
    /// Payload is UTF-8 JSON.
    Json = 0b0001,
}

impl TryFrom<u8> for Serialization {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0b0000 => Ok(Serialization::Raw),
            0b0001 => Ok(Serialization::Json),
            other => Err(FrameError::UnknownSerialization(other)),
        }
    }
}

/// Compression method nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Compression {
    /// Payload is stored as-is.
    None = 0b0000,
    /// Payload is gzip-compressed.
    Gzip = 0b0001,
}

impl TryFrom<u8> for Compression {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0b0000 => Ok(Compression::None),
            0b0001 => Ok(Compression::Gzip),
            other => Err(FrameError::UnknownCompression(other)),
        }
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Message type.
    pub message_type: MessageType,
    /// Flags nibble (see [`flags`]).
    pub flags: u8,
    /// Payload serialization.
    pub serialization: Serialization,
    /// Payload compression.
    pub compression: Compression,
    /// Header length in 4-byte words (1 unless the sender adds extensions).
    pub header_words: u8,
}

impl Header {
    /// Create a new single-word header.
    pub fn new(
        message_type: MessageType,
        flags: u8,
        serialization: Serialization,
        compression: Compression,
    ) -> Self {
        Self {
            message_type,
            flags,
            serialization,
            compression,
            header_words: HEADER_SIZE_WORDS,
        }
    }

    /// Header length in bytes, including extension words.
    #[inline]
    pub fn byte_len(&self) -> usize {
        usize::from(self.header_words) * 4
    }

    /// Encode header to bytes.
    ///
    /// Always emits a single-word header; extension words are never written.
    ///
    /// # Example
    ///
    /// ```
    /// use dialog_client::protocol::{flags, Compression, Header, MessageType, Serialization};
    ///
    /// let header = Header::new(
    ///     MessageType::FullClientRequest,
    ///     flags::EVENT_ID,
    ///     Serialization::Json,
    ///     Compression::None,
    /// );
    /// assert_eq!(header.encode(), [0x11, 0x14, 0x10, 0x00]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        [
            (PROTOCOL_VERSION << 4) | HEADER_SIZE_WORDS,
            (self.message_type.as_u8() << 4) | (self.flags & 0x0F),
            ((self.serialization as u8) << 4) | (self.compression as u8),
            0x00,
        ]
    }

    /// Decode header from bytes.
    ///
    /// Only the first word is interpreted; the caller skips
    /// `byte_len() - HEADER_SIZE` extension bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use dialog_client::protocol::{Header, MessageType};
    ///
    /// let header = Header::decode(&[0x11, 0x94, 0x10, 0x00]).unwrap();
    /// assert_eq!(header.message_type, MessageType::FullServerResponse);
    /// assert!(Header::decode(&[0x11, 0x94]).is_err());
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                field: "header",
                needed: HEADER_SIZE,
                available: buf.len(),
            });
        }

        let version = buf[0] >> 4;
        if version != PROTOCOL_VERSION {
            return Err(FrameError::UnsupportedVersion(version));
        }
        let header_words = buf[0] & 0x0F;
        if header_words == 0 {
            return Err(FrameError::InvalidHeaderSize(header_words));
        }

        Ok(Self {
            message_type: MessageType::try_from(buf[1] >> 4)?,
            flags: buf[1] & 0x0F,
            serialization: Serialization::try_from(buf[2] >> 4)?,
            compression: Compression::try_from(buf[2] & 0x0F)?,
            header_words,
        })
    }

    /// Check if the event id flag is set.
    #[inline]
    pub fn has_event(&self) -> bool {
        flags::has_flag(self.flags, flags::EVENT_ID)
    }

    /// Check if a sequence number follows.
    #[inline]
    pub fn has_sequence(&self) -> bool {
        flags::has_sequence(self.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(
            MessageType::AudioOnlyRequest,
            flags::EVENT_ID,
            Serialization::Raw,
            Compression::None,
        );
        let decoded = Header::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_nibble_layout() {
        let header = Header::new(
            MessageType::ErrorInformation,
            flags::NEGATIVE_SEQUENCE,
            Serialization::Json,
            Compression::Gzip,
        );
        let bytes = header.encode();

        assert_eq!(bytes[0], 0x11); // version 1, one word
        assert_eq!(bytes[1], 0xF3); // error information, negative sequence
        assert_eq!(bytes[2], 0x11); // json, gzip
        assert_eq!(bytes[3], 0x00); // reserved
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let err = Header::decode(&[0x11, 0x14, 0x10]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                field: "header",
                needed: 4,
                available: 3
            }
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_nibbles() {
        assert_eq!(
            Header::decode(&[0x21, 0x14, 0x10, 0x00]),
            Err(FrameError::UnsupportedVersion(2))
        );
        assert_eq!(
            Header::decode(&[0x10, 0x14, 0x10, 0x00]),
            Err(FrameError::InvalidHeaderSize(0))
        );
        assert_eq!(
            Header::decode(&[0x11, 0x34, 0x10, 0x00]),
            Err(FrameError::UnknownMessageType(3))
        );
        assert_eq!(
            Header::decode(&[0x11, 0x14, 0x20, 0x00]),
            Err(FrameError::UnknownSerialization(2))
        );
        assert_eq!(
            Header::decode(&[0x11, 0x14, 0x12, 0x00]),
            Err(FrameError::UnknownCompression(2))
        );
    }

    #[test]
    fn test_header_extension_words() {
        let header = Header::decode(&[0x12, 0x94, 0x10, 0x00, 0xAA, 0xBB, 0xCC, 0xDD]).unwrap();
        assert_eq!(header.header_words, 2);
        assert_eq!(header.byte_len(), 8);
    }

    #[test]
    fn test_sequence_flags() {
        assert!(!flags::has_sequence(flags::NO_SEQUENCE));
        assert!(flags::has_sequence(flags::POSITIVE_SEQUENCE));
        assert!(!flags::has_sequence(flags::LAST_NO_SEQUENCE));
        assert!(flags::has_sequence(flags::NEGATIVE_SEQUENCE));
        assert!(flags::has_sequence(flags::EVENT_ID | flags::POSITIVE_SEQUENCE));
        assert!(!flags::has_sequence(flags::EVENT_ID));
    }

    #[test]
    fn test_message_type_classes() {
        assert!(MessageType::AudioOnlyResponse.is_audio());
        assert!(MessageType::AudioOnlyRequest.is_audio());
        assert!(!MessageType::FullServerResponse.is_audio());
        assert!(MessageType::ErrorInformation.is_server());
        assert!(!MessageType::FullClientRequest.is_server());
    }
}
